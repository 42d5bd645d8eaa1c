//! Attaches converted amounts to transactions.
//!
//! Every transaction produces exactly one [`RowOutcome`], in input order. A
//! quote that cannot be resolved degrades only the rows that need it.
use crate::core::cache::RateCache;
use crate::core::error::QuoteUnavailable;
use crate::core::quote::{QuoteKey, QuoteValue};
use crate::core::transaction::{Transaction, round2};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    pub target_currency: String,
    /// Upper bound on rows resolving quotes at the same time.
    pub max_concurrency: usize,
    /// Deadline for the whole batch; `None` waits for every lookup.
    pub run_timeout: Option<Duration>,
}

impl EnrichmentOptions {
    pub fn new(target_currency: &str) -> Self {
        Self {
            target_currency: target_currency.trim().to_uppercase(),
            max_concurrency: 4,
            run_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedTransaction {
    pub transaction: Transaction,
    /// `None` when the row was already in the target currency.
    pub quote: Option<QuoteValue>,
    /// Multiplier applied to `amount`.
    pub rate_used: f64,
    pub converted_amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnenrichedTransaction {
    pub transaction: Transaction,
    pub reason: QuoteUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Enriched(EnrichedTransaction),
    Unenriched(UnenrichedTransaction),
}

impl RowOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            RowOutcome::Enriched(e) => &e.transaction,
            RowOutcome::Unenriched(u) => &u.transaction,
        }
    }

    pub fn is_enriched(&self) -> bool {
        matches!(self, RowOutcome::Enriched(_))
    }

    pub fn converted_amount(&self) -> Option<f64> {
        match self {
            RowOutcome::Enriched(e) => Some(e.converted_amount),
            RowOutcome::Unenriched(_) => None,
        }
    }

    pub fn rate_used(&self) -> Option<f64> {
        match self {
            RowOutcome::Enriched(e) => Some(e.rate_used),
            RowOutcome::Unenriched(_) => None,
        }
    }

    pub fn error_reason(&self) -> Option<&'static str> {
        match self {
            RowOutcome::Enriched(_) => None,
            RowOutcome::Unenriched(u) => Some(u.reason.reason()),
        }
    }
}

/// Quotes a single transaction depends on.
#[derive(Debug, Clone, PartialEq)]
enum Plan {
    Identity,
    Convert(QuoteKey),
    Stock {
        price: QuoteKey,
        fx: Option<QuoteKey>,
    },
}

pub struct EnrichmentEngine<'a> {
    cache: &'a RateCache,
    options: EnrichmentOptions,
}

impl<'a> EnrichmentEngine<'a> {
    pub fn new(cache: &'a RateCache, options: EnrichmentOptions) -> Self {
        Self { cache, options }
    }

    pub fn target_currency(&self) -> &str {
        &self.options.target_currency
    }

    /// Quote keys `transaction` needs before it can be converted.
    pub fn required_keys(&self, transaction: &Transaction) -> Vec<QuoteKey> {
        match self.plan(transaction) {
            Plan::Identity => Vec::new(),
            Plan::Convert(fx) => vec![fx],
            Plan::Stock { price, fx } => std::iter::once(price).chain(fx).collect(),
        }
    }

    /// Enriches every transaction, reporting each finished row via `on_row`.
    pub async fn enrich(
        &self,
        transactions: &[Transaction],
        on_row: &(dyn Fn() + Sync),
    ) -> Vec<RowOutcome> {
        let mut outcomes: Vec<Option<RowOutcome>> = transactions.iter().map(|_| None).collect();

        let work = async {
            let mut rows = stream::iter(transactions.iter().enumerate())
                .map(|(idx, tx)| async move { (idx, self.enrich_row(tx, true).await) })
                .buffer_unordered(self.options.max_concurrency.max(1));
            while let Some((idx, outcome)) = rows.next().await {
                outcomes[idx] = Some(outcome);
                on_row();
            }
        };

        match self.options.run_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, work).await.is_err() {
                    warn!(
                        "Quote lookups exceeded the run timeout of {:?}; continuing with resolved quotes",
                        limit
                    );
                }
            }
            None => work.await,
        }

        let mut results = Vec::with_capacity(transactions.len());
        for (tx, outcome) in transactions.iter().zip(outcomes) {
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => {
                    let settled = self.enrich_row(tx, false).await;
                    on_row();
                    settled
                }
            };
            results.push(outcome);
        }

        let enriched = results.iter().filter(|r| r.is_enriched()).count();
        info!(
            "Enriched {} of {} transactions into {}",
            enriched,
            results.len(),
            self.options.target_currency
        );
        results
    }

    fn plan(&self, tx: &Transaction) -> Plan {
        let target = &self.options.target_currency;
        let fx = (tx.currency != *target).then(|| QuoteKey::currency(&tx.currency, target, tx.day()));
        match &tx.ticker {
            Some(ticker) => Plan::Stock {
                price: QuoteKey::stock(ticker, tx.day()),
                fx,
            },
            None => fx.map_or(Plan::Identity, Plan::Convert),
        }
    }

    /// Resolves through the cache, or after the deadline only reads what has
    /// already settled.
    async fn lookup(&self, key: &QuoteKey, live: bool) -> Result<QuoteValue, QuoteUnavailable> {
        if live {
            return self.cache.get_or_fetch(key).await;
        }
        self.cache.peek(key).await.unwrap_or_else(|| {
            Err(QuoteUnavailable::TimedOut(format!(
                "No quote for {key} before the run deadline"
            )))
        })
    }

    async fn enrich_row(&self, tx: &Transaction, live: bool) -> RowOutcome {
        let result = match self.plan(tx) {
            Plan::Identity => Ok((None, 1.0)),
            Plan::Convert(fx) => self
                .lookup(&fx, live)
                .await
                .map(|quote| (Some(quote.clone()), quote.value)),
            Plan::Stock { price, fx } => match self.lookup(&price, live).await {
                Ok(price_quote) => match fx {
                    Some(fx) => self
                        .lookup(&fx, live)
                        .await
                        .map(|fx_quote| (Some(price_quote.clone()), price_quote.value * fx_quote.value)),
                    None => Ok((Some(price_quote.clone()), price_quote.value)),
                },
                Err(e) => Err(e),
            },
        };

        match result {
            Ok((quote, rate)) => RowOutcome::Enriched(EnrichedTransaction {
                transaction: tx.clone(),
                quote,
                rate_used: rate,
                converted_amount: round2(tx.amount * rate),
            }),
            Err(reason) => {
                debug!(
                    "Leaving '{}' on {} unenriched: {}",
                    tx.description,
                    tx.day(),
                    reason
                );
                RowOutcome::Unenriched(UnenrichedTransaction {
                    transaction: tx.clone(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::test_support::FakeClient;
    use crate::core::quote::QuoteSource;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn at(d: u32) -> NaiveDateTime {
        day(d).and_hms_opt(10, 0, 0).unwrap()
    }

    fn no_progress() -> impl Fn() + Sync {
        || {}
    }

    #[tokio::test]
    async fn test_converts_with_resolved_rate() {
        let currency = Arc::new(
            FakeClient::new().with(QuoteKey::currency("EUR", "USD", day(5)), Ok(1.08)),
        );
        let cache = RateCache::new(currency.clone(), Arc::new(FakeClient::new()));
        let engine = EnrichmentEngine::new(&cache, EnrichmentOptions::new("USD"));

        let txs = vec![Transaction::new(at(5), "Hotel", 100.0, "EUR")];
        let rows = engine.enrich(&txs, &no_progress()).await;

        assert_eq!(rows.len(), 1);
        let RowOutcome::Enriched(row) = &rows[0] else {
            panic!("Expected an enriched row, got {:?}", rows[0]);
        };
        assert_eq!(row.converted_amount, 108.0);
        assert_eq!(row.rate_used, 1.08);
        assert_eq!(row.quote.as_ref().unwrap().source, QuoteSource::Live);
        assert_eq!(row.transaction, txs[0]);
    }

    #[tokio::test]
    async fn test_failed_quote_leaves_row_unenriched() {
        let currency = Arc::new(FakeClient::new().with(
            QuoteKey::currency("EUR", "USD", day(5)),
            Err(QuoteUnavailable::RateLimited("quota exhausted".into())),
        ));
        let cache = RateCache::new(currency, Arc::new(FakeClient::new()));
        let engine = EnrichmentEngine::new(&cache, EnrichmentOptions::new("USD"));

        let txs = vec![
            Transaction::new(at(5), "Hotel", 100.0, "EUR"),
            Transaction::new(at(5), "Taxi", -20.0, "USD"),
        ];
        let rows = engine.enrich(&txs, &no_progress()).await;

        assert_eq!(rows.len(), 2);
        assert!(!rows[0].is_enriched());
        assert_eq!(rows[0].error_reason(), Some("rate_limited"));
        assert_eq!(rows[0].converted_amount(), None);
        assert_eq!(rows[0].transaction(), &txs[0]);
        assert!(rows[1].is_enriched());
        assert_eq!(rows[1].converted_amount(), Some(-20.0));
    }

    #[tokio::test]
    async fn test_target_currency_rows_need_no_lookup() {
        let currency = Arc::new(FakeClient::new());
        let cache = RateCache::new(currency.clone(), Arc::new(FakeClient::new()));
        let engine = EnrichmentEngine::new(&cache, EnrichmentOptions::new("rub"));

        let txs = vec![Transaction::new(at(3), "Groceries", -1520.5, "RUB")];
        assert!(engine.required_keys(&txs[0]).is_empty());

        let rows = engine.enrich(&txs, &no_progress()).await;
        let RowOutcome::Enriched(row) = &rows[0] else {
            panic!("Expected an enriched row");
        };
        assert_eq!(row.rate_used, 1.0);
        assert_eq!(row.converted_amount, -1520.5);
        assert!(row.quote.is_none());
        assert_eq!(currency.calls(), 0);
    }

    #[tokio::test]
    async fn test_stock_rows_use_price_and_exchange_rate() {
        let currency = Arc::new(
            FakeClient::new().with(QuoteKey::currency("USD", "EUR", day(5)), Ok(0.9)),
        );
        let stock = Arc::new(FakeClient::new().with(QuoteKey::stock("AAPL", day(5)), Ok(185.0)));
        let cache = RateCache::new(currency.clone(), stock.clone());
        let engine = EnrichmentEngine::new(&cache, EnrichmentOptions::new("EUR"));

        let tx = Transaction::new(at(5), "Buy Apple", 2.0, "USD").with_ticker("aapl");
        assert_eq!(
            engine.required_keys(&tx),
            vec![
                QuoteKey::stock("AAPL", day(5)),
                QuoteKey::currency("USD", "EUR", day(5))
            ]
        );

        let rows = engine.enrich(std::slice::from_ref(&tx), &no_progress()).await;
        let RowOutcome::Enriched(row) = &rows[0] else {
            panic!("Expected an enriched row");
        };
        assert!((row.rate_used - 166.5).abs() < 1e-9);
        assert_eq!(row.converted_amount, 333.0);
        assert_eq!(row.quote.as_ref().unwrap().value, 185.0);
        assert_eq!(stock.calls(), 1);
        assert_eq!(currency.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ticker_skips_exchange_lookup() {
        let currency = Arc::new(FakeClient::new());
        let stock = Arc::new(FakeClient::new());
        let cache = RateCache::new(currency.clone(), stock.clone());
        let engine = EnrichmentEngine::new(&cache, EnrichmentOptions::new("EUR"));

        let txs = vec![Transaction::new(at(5), "Buy ???", 1.0, "USD").with_ticker("NOPE")];
        let rows = engine.enrich(&txs, &no_progress()).await;

        assert_eq!(rows[0].error_reason(), Some("not_found"));
        assert_eq!(stock.calls(), 1);
        assert_eq!(currency.calls(), 0);
    }

    #[tokio::test]
    async fn test_shared_keys_are_fetched_once_and_order_is_kept() {
        let currency = Arc::new(
            FakeClient::new()
                .with(QuoteKey::currency("EUR", "USD", day(5)), Ok(1.1))
                .with(QuoteKey::currency("GBP", "USD", day(6)), Ok(1.25))
                .with_delay(Duration::from_millis(5)),
        );
        let cache = RateCache::new(currency.clone(), Arc::new(FakeClient::new()));
        let mut options = EnrichmentOptions::new("USD");
        options.max_concurrency = 3;
        let engine = EnrichmentEngine::new(&cache, options);

        let txs: Vec<Transaction> = (0..12)
            .map(|i| {
                if i % 2 == 0 {
                    Transaction::new(at(5), &format!("row {i}"), 10.0, "EUR")
                } else {
                    Transaction::new(at(6), &format!("row {i}"), 10.0, "GBP")
                }
            })
            .collect();

        let progress = AtomicUsize::new(0);
        let rows = engine
            .enrich(&txs, &|| {
                progress.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(rows.len(), txs.len());
        for (row, tx) in rows.iter().zip(&txs) {
            assert_eq!(row.transaction(), tx);
        }
        assert_eq!(rows[0].converted_amount(), Some(11.0));
        assert_eq!(rows[1].converted_amount(), Some(12.5));
        assert_eq!(currency.calls(), 2);
        assert_eq!(progress.load(Ordering::SeqCst), txs.len());

        let live = rows
            .iter()
            .filter_map(|r| match r {
                RowOutcome::Enriched(e) => e.quote.as_ref(),
                RowOutcome::Unenriched(_) => None,
            })
            .filter(|q| q.source == QuoteSource::Live)
            .count();
        assert_eq!(live, 2);
    }

    #[tokio::test]
    async fn test_run_timeout_marks_pending_rows() {
        let currency = Arc::new(
            FakeClient::new()
                .with(QuoteKey::currency("EUR", "USD", day(5)), Ok(1.08))
                .with_delay(Duration::from_millis(500)),
        );
        let cache = RateCache::new(currency, Arc::new(FakeClient::new()));
        let mut options = EnrichmentOptions::new("USD");
        options.run_timeout = Some(Duration::from_millis(20));
        let engine = EnrichmentEngine::new(&cache, options);

        let txs = vec![
            Transaction::new(at(5), "Hotel", 100.0, "EUR"),
            Transaction::new(at(5), "Taxi", -20.0, "USD"),
        ];
        let rows = engine.enrich(&txs, &no_progress()).await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].error_reason(), Some("timed_out"));
        assert!(rows[1].is_enriched());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let cache = RateCache::new(Arc::new(FakeClient::new()), Arc::new(FakeClient::new()));
        let engine = EnrichmentEngine::new(&cache, EnrichmentOptions::new("USD"));
        assert!(engine.enrich(&[], &no_progress()).await.is_empty());
    }
}
