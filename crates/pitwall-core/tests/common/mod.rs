//! Shared fixtures: a scriptable remote source with call counters

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pitwall_core::cache::SessionCache;
use pitwall_core::models::{EventInfo, LapTiming, PitStop, ResultRow};
use pitwall_core::provider::{CachingProvider, ProviderConfig, RemoteSource};
use pitwall_core::{ProviderError, SessionKind};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Remote source whose behaviour per round is scripted by the test
pub struct FakeRemote {
    seasons: Vec<i32>,
    rounds: Vec<u32>,
    failing: HashSet<u32>,
    hanging: HashSet<u32>,
    panicking: HashSet<u32>,
    delay: Duration,
    pub schedule_calls: AtomicUsize,
    pub result_calls: AtomicUsize,
    per_round: Mutex<HashMap<u32, usize>>,
}

impl FakeRemote {
    /// Seasons 2023 and 2024, rounds 1..=5
    pub fn new() -> Self {
        Self {
            seasons: vec![2023, 2024],
            rounds: (1..=5).collect(),
            failing: HashSet::new(),
            hanging: HashSet::new(),
            panicking: HashSet::new(),
            delay: Duration::ZERO,
            schedule_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
            per_round: Mutex::new(HashMap::new()),
        }
    }

    /// Calendar contains only these rounds
    pub fn with_rounds(mut self, rounds: &[u32]) -> Self {
        self.rounds = rounds.to_vec();
        self
    }

    /// Results of this round fail with HTTP 503
    pub fn failing(mut self, round: u32) -> Self {
        self.failing.insert(round);
        self
    }

    /// Results of this round never arrive
    pub fn hanging(mut self, round: u32) -> Self {
        self.hanging.insert(round);
        self
    }

    pub fn panicking(mut self, round: u32) -> Self {
        self.panicking.insert(round);
        self
    }

    /// Latency added to every results call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, round: u32) -> usize {
        self.per_round.lock().get(&round).copied().unwrap_or(0)
    }
}

pub fn event(season: i32, round: u32) -> EventInfo {
    let (name, locality, country) = match round {
        1 => ("Bahrain Grand Prix".to_string(), "Sakhir", "Bahrain"),
        3 => ("Australian Grand Prix".to_string(), "Melbourne", "Australia"),
        4 => ("Azerbaijan Grand Prix".to_string(), "Baku", "Azerbaijan"),
        _ => (format!("Test Grand Prix {}", round), "Testville", "Testland"),
    };
    EventInfo {
        season,
        round,
        name,
        circuit: format!("{} Circuit", locality),
        locality: locality.to_string(),
        country: country.to_string(),
        date: None,
        sessions: vec![SessionKind::Qualifying, SessionKind::Race],
    }
}

pub fn row(code: &str, team: &str, position: u32, points: f64) -> ResultRow {
    ResultRow {
        position: Some(position),
        position_text: position.to_string(),
        driver_number: None,
        driver_id: code.to_lowercase(),
        abbreviation: Some(code.to_string()),
        full_name: code.to_string(),
        team_name: team.to_string(),
        grid: Some(position),
        laps: Some(57),
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
impl RemoteSource for FakeRemote {
    async fn schedule(&self, season: i32) -> Result<Vec<EventInfo>, ProviderError> {
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        if !self.seasons.contains(&season) {
            return Ok(Vec::new());
        }
        Ok(self.rounds.iter().map(|&r| event(season, r)).collect())
    }

    async fn results(
        &self,
        event: &EventInfo,
        _kind: SessionKind,
    ) -> Result<Vec<ResultRow>, ProviderError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        *self.per_round.lock().entry(event.round).or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.hanging.contains(&event.round) {
            return std::future::pending().await;
        }
        if self.panicking.contains(&event.round) {
            panic!("parser blew up on round {}", event.round);
        }
        if self.failing.contains(&event.round) {
            return Err(ProviderError::HttpStatus {
                url: format!("fake://{}/{}/results", event.season, event.round),
                status: 503,
            });
        }

        // Ferrari wins round 2, Red Bull the rest
        if event.round == 2 {
            Ok(vec![
                row("LEC", "Ferrari", 1, 25.0),
                row("VER", "Red Bull", 2, 18.0),
            ])
        } else {
            Ok(vec![
                row("VER", "Red Bull", 1, 25.0),
                row("LEC", "Ferrari", 2, 18.0),
            ])
        }
    }

    async fn laps(
        &self,
        _event: &EventInfo,
        _kind: SessionKind,
    ) -> Result<Vec<LapTiming>, ProviderError> {
        Ok(vec![LapTiming {
            driver_id: "ver".to_string(),
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

/// Caching provider over a shared fake remote, cached in `dir`
pub fn cached_provider(
    remote: &Arc<FakeRemote>,
    dir: &Path,
) -> (Arc<CachingProvider<Arc<FakeRemote>>>, Arc<SessionCache>) {
    let cache = Arc::new(SessionCache::new(dir).expect("cache"));
    let provider = CachingProvider::new(
        remote.clone(),
        Some(cache.clone()),
        ProviderConfig::default(),
    );
    (Arc::new(provider), cache)
}

pub fn uncached_provider(remote: &Arc<FakeRemote>) -> Arc<CachingProvider<Arc<FakeRemote>>> {
    Arc::new(CachingProvider::uncached(remote.clone()))
}
