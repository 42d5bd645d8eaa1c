use super::util::{RetryPolicy, with_retry};
use crate::core::error::QuoteUnavailable;
use crate::core::quote::{QuoteClient, QuoteKey, QuoteValue};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io";

/// Trading days can be missing around weekends and holidays, so the candle
/// window reaches back this many days before the requested date.
const LOOKBACK_DAYS: u64 = 7;

/// Daily closing prices from the Finnhub stock candle API.
pub struct FinnhubClient {
    base_url: String,
    api_key: String,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct CandleResponse {
    #[serde(rename = "s")]
    status: String,
    #[serde(rename = "c", default)]
    closes: Vec<f64>,
}

/// Unix timestamps covering the lookback window up to the end of `date`.
fn candle_window(date: NaiveDate) -> (i64, i64) {
    let start = date
        .checked_sub_days(Days::new(LOOKBACK_DAYS))
        .unwrap_or(date)
        .and_hms_opt(0, 0, 0)
        .map_or(0, |dt| dt.and_utc().timestamp());
    let end = date
        .and_hms_opt(23, 59, 59)
        .map_or(0, |dt| dt.and_utc().timestamp());
    (start, end)
}

impl FinnhubClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("fintx/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_close(&self, url: &Url, ticker: &str) -> Result<f64, QuoteUnavailable> {
        debug!("Requesting price data from {}", url);

        let response = self
            .client
            .get(url.clone())
            .header("X-Finnhub-Token", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuoteUnavailable::from_status(
                status,
                &format!("{body} for symbol: {ticker}"),
            ));
        }

        let candles: CandleResponse = response.json().await.map_err(|e| {
            QuoteUnavailable::InvalidResponse(format!(
                "Failed to parse JSON response for {ticker}: {e}"
            ))
        })?;

        match candles.status.as_str() {
            "ok" => candles.closes.last().copied().ok_or_else(|| {
                QuoteUnavailable::NotFound(format!("No price data found for symbol: {ticker}"))
            }),
            "no_data" => Err(QuoteUnavailable::NotFound(format!(
                "No price data found for symbol: {ticker}"
            ))),
            other => Err(QuoteUnavailable::InvalidResponse(format!(
                "Unexpected candle status '{other}' for symbol: {ticker}"
            ))),
        }
    }
}

#[async_trait]
impl QuoteClient for FinnhubClient {
    #[instrument(name = "FinnhubPriceFetch", skip(self), fields(key = %key))]
    async fn resolve(&self, key: &QuoteKey) -> Result<QuoteValue, QuoteUnavailable> {
        let QuoteKey::Stock { ticker, date } = key else {
            return Err(QuoteUnavailable::NotFound(format!(
                "Stock price source cannot price {key}"
            )));
        };

        let (from, to) = candle_window(*date);
        let url = Url::parse_with_params(
            &format!("{}/api/v1/stock/candle", self.base_url),
            &[
                ("symbol", ticker.clone()),
                ("resolution", "D".to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ],
        )
        .map_err(|e| QuoteUnavailable::InvalidResponse(format!("Invalid URL for {key}: {e}")))?;

        let label = key.to_string();
        let price = with_retry(&self.retry, &label, || self.fetch_close(&url, ticker)).await?;
        if !price.is_finite() || price <= 0.0 {
            return Err(QuoteUnavailable::InvalidResponse(format!(
                "Non-positive price {price} for {key}"
            )));
        }
        debug!("Resolved {} = {}", key, price);
        Ok(QuoteValue::live(price))
    }
}
