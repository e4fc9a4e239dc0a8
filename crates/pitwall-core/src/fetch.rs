//! Session fetch operation
//!
//! Turns a [`SessionKey`] into a [`SessionBundle`] through the provider. The only
//! state is the provider's persistent cache: warmup and interactive requests both
//! land here and dedupe through that cache.

use crate::error::FetchError;
use crate::models::{LoadOptions, SessionBundle, SessionKey};
use crate::provider::SessionDataProvider;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Serializes concurrent fetches of the same key
///
/// The second caller waits for the first and then finds the provider cache warm,
/// instead of both going to the remote.
#[derive(Default)]
pub struct InflightCoalescer {
    inflight: DashMap<SessionKey, Arc<Mutex<()>>>,
}

impl InflightCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `key`; the entry is released when the guard drops
    pub async fn acquire(&self, key: &SessionKey) -> InflightGuard<'_> {
        let lock = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // Built before waiting so a cancelled waiter cleans up too
        let mut guard = InflightGuard {
            coalescer: self,
            key: key.clone(),
            lock: None,
        };
        guard.lock = Some(lock.lock_owned().await);
        guard
    }

    /// Drop the key's lock once nobody holds or waits on it
    fn release(&self, key: &SessionKey) {
        self.inflight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Keys with a fetch running or queued
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

/// Exclusive hold on one key, released on drop (including cancellation)
pub struct InflightGuard<'a> {
    coalescer: &'a InflightCoalescer,
    key: SessionKey,
    lock: Option<OwnedMutexGuard<()>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.lock.take();
        self.coalescer.release(&self.key);
    }
}

/// Fetch-or-load-from-cache for one session
#[derive(Clone)]
pub struct SessionFetcher {
    provider: Arc<dyn SessionDataProvider>,
    coalescer: Option<Arc<InflightCoalescer>>,
}

impl SessionFetcher {
    pub fn new(provider: Arc<dyn SessionDataProvider>) -> Self {
        Self {
            provider,
            coalescer: None,
        }
    }

    /// Coalesce concurrent fetches of one key (off by default)
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalescer = enabled.then(|| Arc::new(InflightCoalescer::new()));
        self
    }

    pub fn provider(&self) -> &Arc<dyn SessionDataProvider> {
        &self.provider
    }

    /// Resolve and load one session, populating the provider cache on a miss
    pub async fn fetch(
        &self,
        key: &SessionKey,
        options: LoadOptions,
    ) -> Result<SessionBundle, FetchError> {
        match &self.coalescer {
            Some(coalescer) => {
                let _inflight = coalescer.acquire(key).await;
                self.fetch_uncoalesced(key, options).await
            }
            None => self.fetch_uncoalesced(key, options).await,
        }
    }

    async fn fetch_uncoalesced(
        &self,
        key: &SessionKey,
        options: LoadOptions,
    ) -> Result<SessionBundle, FetchError> {
        let start = Instant::now();
        debug!(key = %key, ?options, "Fetching session");

        let mut handle = self
            .provider
            .resolve_session(key.season, &key.event, key.kind)
            .await
            .map_err(|e| FetchError::new(key.clone(), e))?;

        self.provider
            .load(&mut handle, options)
            .await
            .map_err(|e| FetchError::new(key.clone(), e))?;

        let bundle = handle
            .into_bundle()
            .map_err(|e| FetchError::new(key.clone(), e))?;

        debug!(
            key = %key,
            rows = bundle.results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Session fetched"
        );
        Ok(bundle)
    }
}
