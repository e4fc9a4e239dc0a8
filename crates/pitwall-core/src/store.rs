//! Dashboard store
//!
//! Owns the provider stack and the two paths into it: the one-shot warmup and
//! the interactive loader. Front-ends talk to this and nothing else.

use crate::cache::{CacheStats, SessionCache};
use crate::config::DashboardConfig;
use crate::error::{LoadError, ProviderError};
use crate::event::EventBus;
use crate::fetch::SessionFetcher;
use crate::interactive::{InteractiveLoader, Selection};
use crate::models::{EventInfo, LoadOptions, SessionBundle};
use crate::provider::{CachingProvider, JolpicaClient, SessionDataProvider};
use crate::standings::{season_standings, Standings};
use crate::warmup::{ProgressCallback, WarmupHandle, WarmupScheduler};
use anyhow::Result;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DashboardStore {
    config: DashboardConfig,

    /// Persistent session cache (None when disabled or unusable)
    cache: Option<Arc<SessionCache>>,

    fetcher: SessionFetcher,
    scheduler: WarmupScheduler,
    interactive: InteractiveLoader,
    events: EventBus,
}

impl DashboardStore {
    /// Build the full stack: cache, Jolpica client, caching provider
    pub fn from_config(config: DashboardConfig) -> Result<Self> {
        let cache = Self::open_cache(&config);
        let remote = JolpicaClient::new(config.fetch.base_url.clone(), config.fetch_timeout())?;
        let provider = CachingProvider::new(remote, cache.clone(), config.provider_config());

        Ok(Self::with_provider(config, Arc::new(provider), cache))
    }

    /// Build around an existing provider
    pub fn with_provider(
        config: DashboardConfig,
        provider: Arc<dyn SessionDataProvider>,
        cache: Option<Arc<SessionCache>>,
    ) -> Self {
        let events = EventBus::default_capacity();
        let fetcher =
            SessionFetcher::new(provider).with_coalescing(config.fetch.coalesce_in_flight);
        let scheduler = WarmupScheduler::new(fetcher.clone(), config.warmup_config())
            .with_events(events.clone());
        let interactive = InteractiveLoader::new(fetcher.clone()).with_events(events.clone());

        Self {
            config,
            cache,
            fetcher,
            scheduler,
            interactive,
            events,
        }
    }

    fn open_cache(config: &DashboardConfig) -> Option<Arc<SessionCache>> {
        if !config.cache.enabled {
            debug!("Session cache disabled");
            return None;
        }

        let Some(dir) = config.cache_dir() else {
            warn!("No cache directory available, running without cache");
            return None;
        };

        match SessionCache::new(&dir) {
            Ok(cache) => {
                debug!(path = %dir.display(), "Session cache enabled");
                Some(Arc::new(cache))
            }
            Err(e) => {
                warn!(error = %e, "Failed to create session cache, running without cache");
                None
            }
        }
    }

    /// Report warmup progress to `observer`
    pub fn with_progress(mut self, observer: ProgressCallback) -> Self {
        self.scheduler = self.scheduler.with_observer(observer);
        self
    }

    /// Share the warmup one-shot guard with other stores
    pub fn with_warmup_guard(mut self, started: Arc<AtomicBool>) -> Self {
        self.scheduler = self.scheduler.with_guard(started);
        self
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn fetcher(&self) -> &SessionFetcher {
        &self.fetcher
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache.as_ref().map(|c| c.path())
    }

    /// Kick off the configured warmup batch; later calls are no-ops
    pub fn on_first_load(&self) -> Option<WarmupHandle> {
        if !self.config.warmup.enabled {
            debug!("Warmup disabled");
            return None;
        }

        let handle = self.scheduler.start(self.config.warmup_keys());
        if let Some(ref handle) = handle {
            info!(total = handle.total(), "Warmup submitted");
        }
        handle
    }

    pub async fn load_session(
        &self,
        selection: &Selection,
        options: LoadOptions,
    ) -> Result<Arc<SessionBundle>, LoadError> {
        self.interactive.load_selection(selection, options).await
    }

    pub fn interactive(&self) -> &InteractiveLoader {
        &self.interactive
    }

    pub async fn standings(&self, season: i32) -> Result<Standings, ProviderError> {
        season_standings(&self.fetcher, season).await
    }

    pub async fn schedule(&self, season: i32) -> Result<Vec<EventInfo>, ProviderError> {
        self.fetcher.provider().event_schedule(season).await
    }

    /// Cache statistics, None when running without cache
    pub fn cache_stats(&self) -> Result<Option<CacheStats>> {
        self.cache.as_ref().map(|c| c.stats()).transpose()
    }

    /// Drop every cached entry; false when running without cache
    pub fn clear_cache(&self) -> Result<bool> {
        match &self.cache {
            Some(cache) => {
                cache.clear()?;
                info!(path = %cache.path().display(), "Session cache cleared");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
