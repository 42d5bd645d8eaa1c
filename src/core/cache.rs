use crate::core::error::QuoteUnavailable;
use crate::core::quote::{QuoteClient, QuoteKey, QuoteSource, QuoteValue};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

type Slot = Arc<OnceCell<Result<QuoteValue, QuoteUnavailable>>>;

/// Run-scoped memo of quote lookups.
///
/// Each key owns a slot that is initialized at most once, so concurrent
/// requesters of an in-flight key await the same external call. Failures are
/// memoized as well: a key that failed is not asked for again in this run.
pub struct RateCache {
    currency_client: Arc<dyn QuoteClient>,
    stock_client: Arc<dyn QuoteClient>,
    slots: Mutex<HashMap<QuoteKey, Slot>>,
}

impl RateCache {
    pub fn new(currency_client: Arc<dyn QuoteClient>, stock_client: Arc<dyn QuoteClient>) -> Self {
        Self {
            currency_client,
            stock_client,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch(&self, key: &QuoteKey) -> Result<QuoteValue, QuoteUnavailable> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut issued = false;
        let issued_flag = &mut issued;
        let result = slot
            .get_or_init(move || async move {
                *issued_flag = true;
                debug!("Cache MISS for {}", key);
                self.client_for(key).resolve(key).await
            })
            .await
            .clone();

        if issued {
            return result;
        }
        debug!("Cache HIT for {}", key);
        result.map(|value| QuoteValue {
            source: QuoteSource::Cache,
            ..value
        })
    }

    /// Returns the settled outcome for `key` without issuing a lookup.
    pub async fn peek(&self, key: &QuoteKey) -> Option<Result<QuoteValue, QuoteUnavailable>> {
        let slot = self.slots.lock().await.get(key).cloned()?;
        let settled = slot.get()?.clone();
        Some(settled.map(|value| QuoteValue {
            source: QuoteSource::Cache,
            ..value
        }))
    }

    /// Number of keys that have been requested so far.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn client_for(&self, key: &QuoteKey) -> &dyn QuoteClient {
        match key {
            QuoteKey::Currency { .. } => self.currency_client.as_ref(),
            QuoteKey::Stock { .. } => self.stock_client.as_ref(),
        }
    }
}
