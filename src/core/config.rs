use crate::core::enrichment::EnrichmentOptions;
use crate::core::error::FatalError;
use crate::providers::util::RetryPolicy;
use crate::providers::{exchange_rates, finnhub};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const EXCHANGE_RATE_API_KEY: &str = "EXCHANGE_RATE_API_KEY";
pub const FINNHUB_API_KEY: &str = "FINNHUB_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default = "default_exchange_rates")]
    pub exchange_rates: ProviderConfig,
    #[serde(default = "default_finnhub")]
    pub finnhub: ProviderConfig,
}

fn default_exchange_rates() -> ProviderConfig {
    ProviderConfig::with_base_url(exchange_rates::DEFAULT_BASE_URL)
}

fn default_finnhub() -> ProviderConfig {
    ProviderConfig::with_base_url(finnhub::DEFAULT_BASE_URL)
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            exchange_rates: default_exchange_rates(),
            finnhub: default_finnhub(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Zero disables the run-level deadline.
    pub run_timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            run_timeout_secs: 60,
        }
    }
}

impl EnrichmentConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Currency every converted amount is expressed in.
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Currencies shown on the overview page.
    #[serde(default)]
    pub user_currencies: Vec<String>,
    /// Tickers shown on the overview page.
    #[serde(default)]
    pub user_stocks: Vec<String>,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

fn default_currency() -> String {
    "RUB".to_string()
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            providers: ProvidersConfig::default(),
            enrichment: EnrichmentConfig::default(),
            user_currencies: vec!["USD".to_string(), "EUR".to_string()],
            user_stocks: ["AAPL", "AMZN", "GOOGL", "MSFT", "TSLA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reports_dir: default_reports_dir(),
        }
    }
}

impl AppConfig {
    /// Loads the default config file, falling back to built-in defaults when
    /// it does not exist.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "fintx", "fintx")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str).map_err(|e| {
            FatalError::Configuration(format!(
                "Failed to parse config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FatalError> {
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FatalError::Configuration(format!(
                "Invalid target currency '{}', expected a 3-letter code",
                self.currency
            )));
        }
        if self.enrichment.max_concurrency == 0 {
            return Err(FatalError::Configuration(
                "enrichment.max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn target_currency(&self) -> String {
        self.currency.trim().to_uppercase()
    }

    pub fn enrichment_options(&self) -> EnrichmentOptions {
        let mut options = EnrichmentOptions::new(&self.currency);
        options.max_concurrency = self.enrichment.max_concurrency.max(1);
        options.run_timeout = match self.enrichment.run_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        options
    }
}

/// Credentials for the quote providers.
#[derive(Clone, PartialEq)]
pub struct ApiKeys {
    pub exchange_rates: String,
    pub finnhub: String,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("exchange_rates", &"***")
            .field("finnhub", &"***")
            .finish()
    }
}

impl ApiKeys {
    pub fn new(exchange_rates: &str, finnhub: &str) -> Self {
        Self {
            exchange_rates: exchange_rates.to_string(),
            finnhub: finnhub.to_string(),
        }
    }

    /// Reads both keys from the process environment.
    pub fn from_env() -> Result<Self, FatalError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FatalError> {
        let require = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    FatalError::Configuration(format!("{name} is not set (check your .env file)"))
                })
        };
        Ok(Self {
            exchange_rates: require(EXCHANGE_RATE_API_KEY)?,
            finnhub: require(FINNHUB_API_KEY)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
currency: "usd"
providers:
  exchange_rates:
    base_url: "http://example.com/rates"
    timeout_secs: 2
  finnhub:
    base_url: "http://example.com/finnhub"
enrichment:
  max_concurrency: 8
  run_timeout_secs: 0
user_currencies: ["EUR", "GBP"]
user_stocks: ["AAPL"]
reports_dir: "out"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        config.validate().unwrap();
        assert_eq!(config.target_currency(), "USD");
        assert_eq!(config.providers.exchange_rates.base_url, "http://example.com/rates");
        assert_eq!(config.providers.exchange_rates.timeout(), Duration::from_secs(2));
        assert_eq!(config.providers.finnhub.base_url, "http://example.com/finnhub");
        assert_eq!(config.providers.finnhub.timeout_secs, 5);
        assert_eq!(config.enrichment.max_concurrency, 8);
        assert_eq!(config.enrichment.max_attempts, 3);
        assert_eq!(config.user_currencies, vec!["EUR", "GBP"]);
        assert_eq!(config.reports_dir, PathBuf::from("out"));

        let options = config.enrichment_options();
        assert_eq!(options.target_currency, "USD");
        assert_eq!(options.max_concurrency, 8);
        assert!(options.run_timeout.is_none());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: AppConfig = serde_yaml::from_str("currency: EUR").unwrap();
        assert_eq!(config.providers, ProvidersConfig::default());
        assert_eq!(config.enrichment, EnrichmentConfig::default());
        assert_eq!(
            config.providers.exchange_rates.base_url,
            "https://api.apilayer.com"
        );
        assert_eq!(config.reports_dir, PathBuf::from("reports"));
        assert_eq!(
            config.enrichment_options().run_timeout,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let mut config = AppConfig::default();
        config.currency = "dollars".to_string();
        assert!(matches!(config.validate(), Err(FatalError::Configuration(_))));

        let mut config = AppConfig::default();
        config.enrichment.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(FatalError::Configuration(_))));
    }

    #[test]
    fn test_unparseable_file_is_configuration_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "currency: [not, a, string").unwrap();

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatalError>(),
            Some(FatalError::Configuration(_))
        ));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = EnrichmentConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(8));
    }

    #[test]
    fn test_api_keys_are_required() {
        let env: HashMap<&str, &str> =
            HashMap::from([(EXCHANGE_RATE_API_KEY, "abc"), (FINNHUB_API_KEY, " def ")]);
        let keys = ApiKeys::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(keys, ApiKeys::new("abc", "def"));
        assert!(!format!("{keys:?}").contains("abc"));

        let partial: HashMap<&str, &str> = HashMap::from([(EXCHANGE_RATE_API_KEY, "abc")]);
        let err = ApiKeys::from_lookup(|name| partial.get(name).map(|v| v.to_string())).unwrap_err();
        assert!(err.to_string().contains(FINNHUB_API_KEY));

        let blank: HashMap<&str, &str> =
            HashMap::from([(EXCHANGE_RATE_API_KEY, "  "), (FINNHUB_API_KEY, "def")]);
        let err = ApiKeys::from_lookup(|name| blank.get(name).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, FatalError::Configuration(_)));
    }
}
