//! Quote abstractions and core types

use crate::core::error::QuoteUnavailable;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifies a cacheable lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteKey {
    Currency {
        base: String,
        quote: String,
        date: NaiveDate,
    },
    Stock {
        ticker: String,
        date: NaiveDate,
    },
}

impl QuoteKey {
    pub fn currency(base: &str, quote: &str, date: NaiveDate) -> Self {
        QuoteKey::Currency {
            base: base.trim().to_uppercase(),
            quote: quote.trim().to_uppercase(),
            date,
        }
    }

    pub fn stock(ticker: &str, date: NaiveDate) -> Self {
        QuoteKey::Stock {
            ticker: ticker.trim().to_uppercase(),
            date,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            QuoteKey::Currency { date, .. } | QuoteKey::Stock { date, .. } => *date,
        }
    }
}

impl Display for QuoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteKey::Currency { base, quote, date } => write!(f, "{base}/{quote}@{date}"),
            QuoteKey::Stock { ticker, date } => write!(f, "{ticker}@{date}"),
        }
    }
}

/// Where a quote value was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Live,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteValue {
    pub value: f64,
    pub retrieved_at: DateTime<Utc>,
    pub source: QuoteSource,
}

impl QuoteValue {
    pub fn live(value: f64) -> Self {
        Self {
            value,
            retrieved_at: Utc::now(),
            source: QuoteSource::Live,
        }
    }
}

/// A single external source of quotes.
#[async_trait]
pub trait QuoteClient: Send + Sync {
    async fn resolve(&self, key: &QuoteKey) -> Result<QuoteValue, QuoteUnavailable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_normalized() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            QuoteKey::currency(" eur", "usd ", date),
            QuoteKey::currency("EUR", "USD", date)
        );
        assert_eq!(QuoteKey::stock("aapl", date).to_string(), "AAPL@2024-01-05");
        assert_eq!(
            QuoteKey::currency("eur", "usd", date).to_string(),
            "EUR/USD@2024-01-05"
        );
    }
}
