//! Presentation of enriched transactions.

pub mod json;
pub mod workbook;

use crate::core::enrichment::RowOutcome;
use crate::core::transaction::round2;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Converted subtotal for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: usize,
}

/// Aggregates over a batch of outcomes, in the target currency.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub target_currency: String,
    pub total_converted: f64,
    pub enriched: usize,
    pub unenriched: usize,
    pub by_category: Vec<CategoryTotal>,
}

impl Summary {
    /// Unenriched rows contribute to counts but not to totals.
    pub fn from_outcomes(outcomes: &[RowOutcome], target_currency: &str) -> Self {
        let mut by_category: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut total_converted = 0.0;
        let mut enriched = 0;

        for outcome in outcomes {
            let entry = by_category
                .entry(outcome.transaction().category_or_default().to_string())
                .or_insert((0.0, 0));
            entry.1 += 1;
            if let Some(converted) = outcome.converted_amount() {
                entry.0 += converted;
                total_converted += converted;
                enriched += 1;
            }
        }

        Self {
            target_currency: target_currency.to_string(),
            total_converted: round2(total_converted),
            enriched,
            unenriched: outcomes.len() - enriched,
            by_category: by_category
                .into_iter()
                .map(|(category, (total, count))| CategoryTotal {
                    category,
                    total: round2(total),
                    count,
                })
                .collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.enriched + self.unenriched
    }
}

/// Writes `bytes` to `path`, creating parent directories as needed.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes the JSON and workbook outputs, or neither.
///
/// Both documents are rendered before anything touches the disk; if the
/// workbook cannot be written the JSON file is removed again.
pub fn write_outputs(
    json_path: &Path,
    xlsx_path: &Path,
    outcomes: &[RowOutcome],
    summary: &Summary,
) -> Result<()> {
    let body = json::render_json(&json::to_records(outcomes))?;
    let workbook = workbook::render_workbook(outcomes, summary)?;

    write_file(json_path, body.as_bytes())?;
    if let Err(e) = write_file(xlsx_path, &workbook) {
        if let Err(cleanup) = fs::remove_file(json_path) {
            warn!("Could not remove {}: {}", json_path.display(), cleanup);
        }
        return Err(e);
    }
    debug!(
        "Wrote {} and {}",
        json_path.display(),
        xlsx_path.display()
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::enrichment::{EnrichedTransaction, RowOutcome, UnenrichedTransaction};
    use crate::core::error::QuoteUnavailable;
    use crate::core::quote::QuoteValue;
    use crate::core::transaction::Transaction;
    use chrono::NaiveDate;

    pub fn sample_outcomes() -> Vec<RowOutcome> {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        vec![
            RowOutcome::Enriched(EnrichedTransaction {
                transaction: Transaction::new(date, "Hotel Berlin", 100.0, "EUR")
                    .with_category("Travel"),
                quote: Some(QuoteValue::live(1.08)),
                rate_used: 1.08,
                converted_amount: 108.0,
            }),
            RowOutcome::Unenriched(UnenrichedTransaction {
                transaction: Transaction::new(date, "London cab", -30.0, "GBP")
                    .with_category("Travel"),
                reason: QuoteUnavailable::RateLimited("HTTP 429".into()),
            }),
            RowOutcome::Enriched(EnrichedTransaction {
                transaction: Transaction::new(date, "Groceries", -42.5, "USD"),
                quote: None,
                rate_used: 1.0,
                converted_amount: -42.5,
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::sample_outcomes;
    use super::*;

    #[test]
    fn test_summary_totals_and_categories() {
        let summary = Summary::from_outcomes(&sample_outcomes(), "USD");

        assert_eq!(summary.total_converted, 65.5);
        assert_eq!(summary.enriched, 2);
        assert_eq!(summary.unenriched, 1);
        assert_eq!(summary.rows(), 3);
        assert_eq!(
            summary.by_category,
            vec![
                CategoryTotal {
                    category: "Travel".to_string(),
                    total: 108.0,
                    count: 2
                },
                CategoryTotal {
                    category: "Uncategorized".to_string(),
                    total: -42.5,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_outputs_are_written_together() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let outcomes = sample_outcomes();
        let summary = Summary::from_outcomes(&outcomes, "USD");
        let json_path = dir.path().join("out").join("transactions.json");
        let xlsx_path = dir.path().join("out").join("transactions.xlsx");

        write_outputs(&json_path, &xlsx_path, &outcomes, &summary)?;
        assert!(json_path.exists());
        assert!(xlsx_path.exists());
        Ok(())
    }

    #[test]
    fn test_unwritable_workbook_leaves_no_json() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let outcomes = sample_outcomes();
        let summary = Summary::from_outcomes(&outcomes, "USD");
        // A regular file where the workbook's directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory")?;
        let json_path = dir.path().join("transactions.json");
        let xlsx_path = blocker.join("transactions.xlsx");

        let result = write_outputs(&json_path, &xlsx_path, &outcomes, &summary);
        assert!(result.is_err());
        assert!(!json_path.exists());
        assert!(!xlsx_path.exists());
        Ok(())
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = Summary::from_outcomes(&[], "USD");
        assert_eq!(summary.total_converted, 0.0);
        assert_eq!(summary.rows(), 0);
        assert!(summary.by_category.is_empty());
    }
}
