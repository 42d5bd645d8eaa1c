use crate::core::enrichment::RowOutcome;
use crate::core::transaction::Transaction;
use crate::report::write_file;
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Ok,
    Unenriched,
}

/// One transaction as consumed by the web front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    pub converted_amount: Option<f64>,
    pub rate_used: Option<f64>,
    pub status: RowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl From<&RowOutcome> for TransactionRecord {
    fn from(outcome: &RowOutcome) -> Self {
        let tx = outcome.transaction();
        Self {
            date: tx.day().format("%Y-%m-%d").to_string(),
            description: tx.description.clone(),
            amount: tx.amount,
            currency: tx.currency.clone(),
            converted_amount: outcome.converted_amount(),
            rate_used: outcome.rate_used(),
            status: if outcome.is_enriched() {
                RowStatus::Ok
            } else {
                RowStatus::Unenriched
            },
            error_reason: outcome.error_reason().map(str::to_string),
        }
    }
}

/// A statement row as returned by search and spending reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    pub category: Option<String>,
    pub mcc: Option<String>,
}

impl From<&Transaction> for StatementRecord {
    fn from(tx: &Transaction) -> Self {
        Self {
            date: tx.date.format("%Y-%m-%d %H:%M:%S").to_string(),
            description: tx.description.clone(),
            amount: tx.amount,
            currency: tx.currency.clone(),
            category: tx.category.clone(),
            mcc: tx.mcc.clone(),
        }
    }
}

pub fn to_records(outcomes: &[RowOutcome]) -> Vec<TransactionRecord> {
    outcomes.iter().map(TransactionRecord::from).collect()
}

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize report")
}

/// Writes `value` as pretty JSON, creating parent directories as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_file(path, render_json(value)?.as_bytes())?;
    debug!("Wrote JSON to {}", path.display());
    Ok(())
}

/// Saves a named report as `report_{name}_{timestamp}.json` under `dir`.
///
/// Empty reports are not saved and yield `None`.
pub fn save_report<T: Serialize>(dir: &Path, name: &str, rows: &[T]) -> Result<Option<PathBuf>> {
    if rows.is_empty() {
        debug!("Report '{}' is empty, not saving", name);
        return Ok(None);
    }
    let file_name = format!("report_{}_{}.json", name, Local::now().format("%Y%m%d_%H%M%S"));
    let path = dir.join(file_name);
    write_json(&path, rows)?;
    info!("Saved report '{}' to {}", name, path.display());
    Ok(Some(path))
}
