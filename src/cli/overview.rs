use crate::core::analytics::{self, MainPage};
use crate::core::{AppConfig, RateCache, Transaction};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;

/// Prints the overview page as JSON.
pub async fn run(
    transactions: &[Transaction],
    at: NaiveDateTime,
    config: &AppConfig,
    cache: &RateCache,
) -> Result<MainPage> {
    let page = analytics::overview(
        transactions,
        at,
        &config.target_currency(),
        &config.user_currencies,
        &config.user_stocks,
        cache,
    )
    .await;
    let body = serde_json::to_string_pretty(&page).context("Failed to serialize overview")?;
    println!("{body}");
    Ok(page)
}
