use crate::core::{Transaction, analytics};
use crate::report::json::{StatementRecord, save_report};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::path::Path;

pub const REPORT_NAME: &str = "spending_by_category";

/// Prints the category's recent expenses and saves them under `reports_dir`.
pub fn run(
    transactions: &[Transaction],
    category: &str,
    at: NaiveDateTime,
    reports_dir: &Path,
) -> Result<Vec<StatementRecord>> {
    let records: Vec<StatementRecord> = analytics::spending_by_category(transactions, category, at)
        .into_iter()
        .map(StatementRecord::from)
        .collect();
    let body = serde_json::to_string_pretty(&records).context("Failed to serialize report")?;
    println!("{body}");
    save_report(reports_dir, REPORT_NAME, &records)?;
    Ok(records)
}
