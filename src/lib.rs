pub mod cli;
pub mod core;
pub mod providers;
pub mod report;

use crate::core::config::{ApiKeys, AppConfig};
use crate::core::error::FatalError;
use crate::core::{RateCache, Transaction, analytics, statement};
use crate::providers::{ExchangeRatesClient, FinnhubClient};
use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Enrich {
        input: PathBuf,
        json_output: Option<PathBuf>,
        xlsx_output: Option<PathBuf>,
    },
    Overview {
        input: PathBuf,
        at: Option<NaiveDateTime>,
    },
    Search {
        input: PathBuf,
        query: String,
    },
    Spending {
        input: PathBuf,
        category: String,
        at: Option<NaiveDateTime>,
    },
}

impl AppCommand {
    /// Whether the command talks to the quote providers.
    pub fn needs_quotes(&self) -> bool {
        matches!(self, AppCommand::Enrich { .. } | AppCommand::Overview { .. })
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fintx starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let keys = if command.needs_quotes() {
        Some(ApiKeys::from_env()?)
    } else {
        None
    };
    execute(command, &config, keys.as_ref()).await
}

/// Runs `command` against an already loaded configuration.
pub async fn execute(command: AppCommand, config: &AppConfig, keys: Option<&ApiKeys>) -> Result<()> {
    config.validate()?;

    match command {
        AppCommand::Enrich {
            input,
            json_output,
            xlsx_output,
        } => {
            let transactions = statement::load_transactions(&input)?;
            let cache = build_cache(config, keys)?;
            let json_path = json_output.unwrap_or_else(|| config.reports_dir.join("transactions.json"));
            let xlsx_path = xlsx_output.unwrap_or_else(|| config.reports_dir.join("transactions.xlsx"));
            cli::enrich::run(
                &transactions,
                &cache,
                config.enrichment_options(),
                &json_path,
                &xlsx_path,
            )
            .await?;
        }
        AppCommand::Overview { input, at } => {
            let transactions = statement::load_transactions(&input)?;
            let cache = build_cache(config, keys)?;
            let at = reference_time(at, &transactions);
            cli::overview::run(&transactions, at, config, &cache).await?;
        }
        AppCommand::Search { input, query } => {
            let transactions = statement::load_transactions(&input)?;
            cli::search::run(&transactions, &query)?;
        }
        AppCommand::Spending {
            input,
            category,
            at,
        } => {
            let transactions = statement::load_transactions(&input)?;
            let at = reference_time(at, &transactions);
            cli::spending::run(&transactions, &category, at, &config.reports_dir)?;
        }
    }
    Ok(())
}

/// An explicit `--at` wins; otherwise the statement's latest operation, so
/// old exports are reported as of their own end date.
fn reference_time(at: Option<NaiveDateTime>, transactions: &[Transaction]) -> NaiveDateTime {
    at.or_else(|| analytics::latest_date(transactions))
        .unwrap_or_else(|| Local::now().naive_local())
}

/// One cache per run, shared by every lookup.
fn build_cache(config: &AppConfig, keys: Option<&ApiKeys>) -> Result<RateCache> {
    let keys = keys.ok_or_else(|| {
        FatalError::Configuration("API keys are required for quote lookups".to_string())
    })?;
    let retry = config.enrichment.retry_policy();

    let rates = &config.providers.exchange_rates;
    let currency_client =
        ExchangeRatesClient::new(&rates.base_url, &keys.exchange_rates, rates.timeout())?
            .with_retry_policy(retry);

    let finnhub = &config.providers.finnhub;
    let stock_client = FinnhubClient::new(&finnhub.base_url, &keys.finnhub, finnhub.timeout())?
        .with_retry_policy(retry);

    Ok(RateCache::new(Arc::new(currency_client), Arc::new(stock_client)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 12, d)
            .unwrap()
            .and_hms_opt(16, 44, 0)
            .unwrap()
    }

    #[test]
    fn test_reference_time_defaults_to_latest_operation() {
        let txs = vec![
            Transaction::new(at(31), "Late", -1.0, "RUB"),
            Transaction::new(at(2), "Early", -1.0, "RUB"),
        ];
        assert_eq!(reference_time(None, &txs), at(31));
        assert_eq!(reference_time(Some(at(10)), &txs), at(10));

        // An empty statement falls back to the clock.
        assert!(reference_time(None, &[]) > at(31));
    }
}
