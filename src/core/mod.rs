//! Core business logic: statements, quotes and enrichment

pub mod analytics;
pub mod cache;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod log;
pub mod quote;
pub mod statement;
pub mod transaction;

// Re-export main types for cleaner imports
pub use cache::RateCache;
pub use config::{ApiKeys, AppConfig};
pub use enrichment::{EnrichmentEngine, EnrichmentOptions, RowOutcome};
pub use error::{FatalError, QuoteUnavailable};
pub use quote::{QuoteClient, QuoteKey, QuoteSource, QuoteValue};
pub use transaction::Transaction;
