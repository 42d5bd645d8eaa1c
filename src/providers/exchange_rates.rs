use super::util::{RetryPolicy, with_retry};
use crate::core::error::QuoteUnavailable;
use crate::core::quote::{QuoteClient, QuoteKey, QuoteValue};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.apilayer.com";

/// Historical exchange rates from the apilayer Exchange Rates Data API.
pub struct ExchangeRatesClient {
    base_url: String,
    api_key: String,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    success: Option<bool>,
    #[serde(default)]
    rates: HashMap<String, f64>,
    error: Option<RatesError>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RatesError {
    #[serde(rename = "type")]
    kind: Option<String>,
    info: Option<String>,
}

impl RatesError {
    fn into_unavailable(self, pair: &str) -> QuoteUnavailable {
        let kind = self.kind.unwrap_or_default();
        let detail = format!(
            "{} for {}: {}",
            kind,
            pair,
            self.info.unwrap_or_default()
        );
        match kind.as_str() {
            "invalid_access_key" | "missing_access_key" | "inactive_user" => {
                QuoteUnavailable::Unauthorized(detail)
            }
            "rate_limit_reached" | "usage_limit_reached" => QuoteUnavailable::RateLimited(detail),
            "invalid_currency_codes" | "invalid_base_currency" | "invalid_date"
            | "no_rates_available" => QuoteUnavailable::NotFound(detail),
            _ => QuoteUnavailable::InvalidResponse(detail),
        }
    }
}

impl ExchangeRatesClient {
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

    async fn fetch_rate(&self, url: &Url, base: &str, quote: &str) -> Result<f64, QuoteUnavailable> {
        let pair = format!("{base}/{quote}");
        debug!("Requesting exchange rate from {}", url);

        let response = self
            .client
            .get(url.clone())
            .header("apikey", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuoteUnavailable::from_status(
                status,
                &format!("{body} for currency pair: {pair}"),
            ));
        }

        let data: RatesResponse = response.json().await.map_err(|e| {
            QuoteUnavailable::InvalidResponse(format!(
                "Failed to parse JSON response for {pair}: {e}"
            ))
        })?;

        if data.success == Some(false) {
            return Err(match data.error {
                Some(error) => error.into_unavailable(&pair),
                None => QuoteUnavailable::InvalidResponse(format!(
                    "{} for {}",
                    data.message.unwrap_or_else(|| "Request failed".to_string()),
                    pair
                )),
            });
        }

        data.rates
            .get(quote)
            .copied()
            .ok_or_else(|| QuoteUnavailable::NotFound(format!("No rate found for currency pair: {pair}")))
    }
}

#[async_trait]
impl QuoteClient for ExchangeRatesClient {
    #[instrument(name = "ExchangeRateFetch", skip(self), fields(key = %key))]
    async fn resolve(&self, key: &QuoteKey) -> Result<QuoteValue, QuoteUnavailable> {
        let QuoteKey::Currency { base, quote, date } = key else {
            return Err(QuoteUnavailable::NotFound(format!(
                "Exchange rate source cannot price {key}"
            )));
        };

        if base == quote {
            return Ok(QuoteValue::live(1.0));
        }

        let url = Url::parse_with_params(
            &format!("{}/exchangerates_data/{}", self.base_url, date.format("%Y-%m-%d")),
            &[("base", base.as_str()), ("symbols", quote.as_str())],
        )
        .map_err(|e| QuoteUnavailable::InvalidResponse(format!("Invalid URL for {key}: {e}")))?;

        let label = key.to_string();
        let rate = with_retry(&self.retry, &label, || self.fetch_rate(&url, base, quote)).await?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(QuoteUnavailable::InvalidResponse(format!(
                "Non-positive rate {rate} for {key}"
            )));
        }
        debug!("Resolved {} = {}", key, rate);
        Ok(QuoteValue::live(rate))
    }
}
