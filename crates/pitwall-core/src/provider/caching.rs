//! Cache-first session provider
//!
//! Every bundle part is looked up in the persistent [`SessionCache`] first; a miss
//! goes to the remote source and the answer is written back before `load` returns.
//! Cache failures degrade to remote fetches, they never fail a load.

use super::remote::RemoteSource;
use super::{find_event, SessionDataProvider, SessionHandle};
use crate::cache::{BundlePart, SessionCache, SessionCoord};
use crate::error::ProviderError;
use crate::models::{EventId, EventInfo, LoadOptions, SessionKey, SessionKind};
use async_trait::async_trait;
use chrono::Datelike;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the caching provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Maximum age of a cached calendar for the current or a future season
    pub schedule_ttl: Duration,

    /// Seasons kept in the in-memory calendar memo
    pub schedule_memo_capacity: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            schedule_ttl: Duration::from_secs(24 * 3600),
            schedule_memo_capacity: 16,
        }
    }
}

/// Provider backed by a remote source and an optional persistent cache
pub struct CachingProvider<R> {
    remote: R,

    /// Persistent cache (None when the cache directory is unusable)
    cache: Option<Arc<SessionCache>>,

    /// In-memory calendar memo
    schedules: Cache<i32, Arc<Vec<EventInfo>>>,

    config: ProviderConfig,
}

impl<R: RemoteSource> CachingProvider<R> {
    pub fn new(remote: R, cache: Option<Arc<SessionCache>>, config: ProviderConfig) -> Self {
        let schedules = Cache::builder()
            .max_capacity(config.schedule_memo_capacity)
            .time_to_live(config.schedule_ttl)
            .build();

        Self {
            remote,
            cache,
            schedules,
            config,
        }
    }

    /// Provider without persistent cache
    pub fn uncached(remote: R) -> Self {
        Self::new(remote, None, ProviderConfig::default())
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn cache(&self) -> Option<&Arc<SessionCache>> {
        self.cache.as_ref()
    }

    /// Calendars of past seasons never change; only recent ones expire
    fn schedule_max_age(&self, season: i32) -> Option<Duration> {
        if season >= chrono::Utc::now().year() {
            Some(self.config.schedule_ttl)
        } else {
            None
        }
    }

    async fn schedule(&self, season: i32) -> Result<Arc<Vec<EventInfo>>, ProviderError> {
        if let Some(events) = self.schedules.get(&season).await {
            return Ok(events);
        }

        if let Some(cache) = &self.cache {
            match cache.get_schedule(season, self.schedule_max_age(season)) {
                Ok(Some(events)) if !events.is_empty() => {
                    let events = Arc::new(events);
                    self.schedules.insert(season, events.clone()).await;
                    return Ok(events);
                }
                Ok(_) => {}
                Err(e) => warn!(season, error = %e, "Failed to read cached schedule"),
            }
        }

        let events = self.remote.schedule(season).await?;
        debug!(season, events = events.len(), "Fetched season schedule");

        let events = Arc::new(events);
        // An empty calendar may still be published later
        if !events.is_empty() {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.put_schedule(season, &events) {
                    warn!(season, error = %e, "Failed to cache schedule");
                }
            }
            self.schedules.insert(season, events.clone()).await;
        }

        Ok(events)
    }

    /// Read one part from cache, fetching and storing it on a miss
    async fn cached_part<T, F, Fut>(
        &self,
        coord: SessionCoord,
        part: BundlePart,
        store_if: impl Fn(&T) -> bool + Send,
        fetch: F,
    ) -> Result<T, ProviderError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
    {
        if let Some(cache) = &self.cache {
            match cache.get_part::<T>(coord, part) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => warn!(
                    ?coord,
                    part = part.as_str(),
                    error = %e,
                    "Failed to read cache, fetching"
                ),
            }
        }

        let value = fetch().await?;

        if let Some(cache) = &self.cache {
            if store_if(&value) {
                if let Err(e) = cache.put_part(coord, part, &value) {
                    warn!(?coord, part = part.as_str(), error = %e, "Failed to write cache");
                }
            }
        }

        Ok(value)
    }
}

#[async_trait]
impl<R: RemoteSource> SessionDataProvider for CachingProvider<R> {
    async fn resolve_session(
        &self,
        season: i32,
        event: &EventId,
        kind: SessionKind,
    ) -> Result<SessionHandle, ProviderError> {
        let events = self.schedule(season).await?;
        if events.is_empty() {
            return Err(ProviderError::UnknownSeason { season });
        }

        let info = find_event(season, &events, event)?;
        if !info.holds(kind) {
            return Err(ProviderError::SessionNotHeld {
                season,
                event: info.name.clone(),
                kind,
            });
        }

        let key = SessionKey::new(season, event.clone(), kind);
        Ok(SessionHandle::new(key, info.clone(), kind))
    }

    async fn load(
        &self,
        handle: &mut SessionHandle,
        options: LoadOptions,
    ) -> Result<(), ProviderError> {
        let coord = handle.coord();
        let event = handle.event.clone();
        let kind = handle.kind;
        let remote = &self.remote;

        // Sessions yet to be run publish no classification; don't pin that
        let results = self
            .cached_part(coord, BundlePart::Results, |rows: &Vec<_>| !rows.is_empty(), || {
                remote.results(&event, kind)
            })
            .await?;
        handle.set_results(results);

        if options.laps {
            let laps = self
                .cached_part(coord, BundlePart::Laps, |laps: &Vec<_>| !laps.is_empty(), || {
                    remote.laps(&event, kind)
                })
                .await?;
            handle.set_laps(laps);

            let stops = self
                .cached_part(coord, BundlePart::PitStops, |_: &Vec<_>| true, || {
                    remote.pit_stops(&event, kind)
                })
                .await?;
            handle.set_pit_stops(stops);
        }

        if options.telemetry {
            let telemetry = self
                .cached_part(coord, BundlePart::Telemetry, |t: &Option<Vec<_>>| t.is_some(), || {
                    remote.telemetry(&event, kind)
                })
                .await?;
            handle.set_telemetry(telemetry);
        }

        if options.weather {
            let weather = self
                .cached_part(coord, BundlePart::Weather, |w: &Option<Vec<_>>| w.is_some(), || {
                    remote.weather(&event, kind)
                })
                .await?;
            handle.set_weather(weather);
        }

        handle.mark_loaded(options);
        debug!(key = %handle.key, ?options, "Session loaded");
        Ok(())
    }

    async fn event_schedule(&self, season: i32) -> Result<Vec<EventInfo>, ProviderError> {
        Ok(self.schedule(season).await?.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LapTiming, PitStop, ResultRow};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Default)]
    struct CountingRemote {
        schedule_calls: AtomicUsize,
        result_calls: AtomicUsize,
        lap_calls: AtomicUsize,
    }

    fn event(round: u32) -> EventInfo {
        EventInfo {
            season: 2023,
            round,
            name: format!("Round {} Grand Prix", round),
            circuit: "Circuit".to_string(),
            locality: "Town".to_string(),
            country: "Country".to_string(),
            date: None,
            sessions: vec![SessionKind::Qualifying, SessionKind::Race],
        }
    }

    fn row(driver: &str, points: f64) -> ResultRow {
        ResultRow {
            position: Some(1),
            position_text: "1".to_string(),
            driver_number: None,
            driver_id: driver.to_string(),
            abbreviation: None,
            full_name: driver.to_string(),
            team_name: "Team".to_string(),
            grid: None,
            laps: None,
            status: "Finished".to_string(),
            points,
            time_millis: None,
            time_text: None,
            q1_millis: None,
            q2_millis: None,
            q3_millis: None,
        }
    }

    #[async_trait]
    impl RemoteSource for CountingRemote {
        async fn schedule(&self, season: i32) -> Result<Vec<EventInfo>, ProviderError> {
            self.schedule_calls.fetch_add(1, Ordering::SeqCst);
            if season == 2023 {
                Ok(vec![event(1), event(2)])
            } else {
                Ok(Vec::new())
            }
        }

        async fn results(
            &self,
            event: &EventInfo,
            _kind: SessionKind,
        ) -> Result<Vec<ResultRow>, ProviderError> {
            self.result_calls.fetch_add(1, Ordering::SeqCst);
            if event.round == 2 {
                Ok(Vec::new())
            } else {
                Ok(vec![row("verstappen", 25.0)])
            }
        }

        async fn laps(
            &self,
            _event: &EventInfo,
            _kind: SessionKind,
        ) -> Result<Vec<LapTiming>, ProviderError> {
            self.lap_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![LapTiming {
                driver_id: "verstappen".to_string(),
                lap: 1,
                position: Some(1),
                time_millis: Some(95_000),
            }])
        }

        async fn pit_stops(
            &self,
            _event: &EventInfo,
            _kind: SessionKind,
        ) -> Result<Vec<PitStop>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn provider(dir: &std::path::Path) -> CachingProvider<CountingRemote> {
        let cache = Arc::new(SessionCache::new(dir).unwrap());
        CachingProvider::new(CountingRemote::default(), Some(cache), ProviderConfig::default())
    }

    #[tokio::test]
    async fn test_second_load_hits_cache() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());

        for _ in 0..2 {
            let mut handle = provider
                .resolve_session(2023, &EventId::Round(1), SessionKind::Race)
                .await
                .unwrap();
            provider
                .load(&mut handle, LoadOptions::results_only())
                .await
                .unwrap();
            assert_eq!(provider.results(&handle).unwrap().len(), 1);
        }

        assert_eq!(provider.remote().result_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.remote().schedule_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_survives_provider_restart() {
        let dir = tempdir().unwrap();

        {
            let provider = provider(dir.path());
            let mut handle = provider
                .resolve_session(2023, &EventId::Round(1), SessionKind::Race)
                .await
                .unwrap();
            provider.load(&mut handle, LoadOptions::full()).await.unwrap();
        }

        let provider = provider(dir.path());
        let mut handle = provider
            .resolve_session(2023, &EventId::Round(1), SessionKind::Race)
            .await
            .unwrap();
        provider
            .load(&mut handle, LoadOptions::results_only().with_laps(true))
            .await
            .unwrap();

        assert_eq!(provider.remote().schedule_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.remote().result_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.remote().lap_calls.load(Ordering::SeqCst), 0);
        let bundle = handle.into_bundle().unwrap();
        assert_eq!(bundle.laps.map(|l| l.len()), Some(1));
        assert_eq!(bundle.pit_stops.map(|p| p.len()), Some(0));
        // The remote publishes no telemetry
        assert!(bundle.telemetry.is_none());
    }

    #[tokio::test]
    async fn test_empty_results_not_cached() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());

        for _ in 0..2 {
            let mut handle = provider
                .resolve_session(2023, &EventId::Round(2), SessionKind::Race)
                .await
                .unwrap();
            provider
                .load(&mut handle, LoadOptions::results_only())
                .await
                .unwrap();
        }

        assert_eq!(provider.remote().result_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolution_errors() {
        let provider = CachingProvider::uncached(CountingRemote::default());

        let err = provider
            .resolve_session(1949, &EventId::Round(1), SessionKind::Race)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownSeason { season: 1949 }));

        let err = provider
            .resolve_session(2023, &EventId::Round(9), SessionKind::Race)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownEvent { .. }));

        let err = provider
            .resolve_session(2023, &EventId::Round(1), SessionKind::Sprint)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::SessionNotHeld { .. }));
        assert!(err.is_resolution());
    }

    #[tokio::test]
    async fn test_uncached_provider_always_fetches() {
        let provider = CachingProvider::uncached(CountingRemote::default());

        for _ in 0..2 {
            let mut handle = provider
                .resolve_session(2023, &EventId::Name("round 1".to_string()), SessionKind::Race)
                .await
                .unwrap();
            provider
                .load(&mut handle, LoadOptions::results_only())
                .await
                .unwrap();
        }

        assert_eq!(provider.remote().result_calls.load(Ordering::SeqCst), 2);
        // Calendar still memoized in memory
        assert_eq!(provider.remote().schedule_calls.load(Ordering::SeqCst), 1);
    }
}
