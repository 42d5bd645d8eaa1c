use crate::core::{Transaction, analytics};
use crate::report::json::StatementRecord;
use anyhow::{Context, Result};

pub fn run(transactions: &[Transaction], query: &str) -> Result<Vec<StatementRecord>> {
    let records: Vec<StatementRecord> = analytics::search(transactions, query)
        .into_iter()
        .map(StatementRecord::from)
        .collect();
    let body = serde_json::to_string_pretty(&records).context("Failed to serialize results")?;
    println!("{body}");
    Ok(records)
}
