//! Session data provider
//!
//! The narrow surface the fetch operation depends on: resolve a session, load it
//! (from cache or remote), read its classification. `CachingProvider` is the
//! implementation used by the dashboard; tests substitute their own.

pub mod caching;
pub mod jolpica;
pub mod remote;

pub use caching::{CachingProvider, ProviderConfig};
pub use jolpica::JolpicaClient;
pub use remote::RemoteSource;

use crate::cache::SessionCoord;
use crate::error::ProviderError;
use crate::models::{
    EventId, EventInfo, LapTiming, LoadOptions, PitStop, ResultRow, SessionBundle, SessionKey,
    SessionKind, TelemetrySample, WeatherSample,
};
use async_trait::async_trait;

/// A resolved session, filled in by [`SessionDataProvider::load`]
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub key: SessionKey,
    pub event: EventInfo,
    pub kind: SessionKind,
    pub(crate) results: Option<Vec<ResultRow>>,
    pub(crate) laps: Option<Vec<LapTiming>>,
    pub(crate) pit_stops: Option<Vec<PitStop>>,
    pub(crate) telemetry: Option<Vec<TelemetrySample>>,
    pub(crate) weather: Option<Vec<WeatherSample>>,
    pub(crate) loaded: Option<LoadOptions>,
}

impl SessionHandle {
    pub fn new(key: SessionKey, event: EventInfo, kind: SessionKind) -> Self {
        Self {
            key,
            event,
            kind,
            results: None,
            laps: None,
            pit_stops: None,
            telemetry: None,
            weather: None,
            loaded: None,
        }
    }

    /// Cache coordinates of this session
    pub fn coord(&self) -> SessionCoord {
        SessionCoord::new(self.event.season, self.event.round, self.kind)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Options the handle was last loaded with
    pub fn loaded_options(&self) -> Option<LoadOptions> {
        self.loaded
    }

    pub fn results(&self) -> Result<&[ResultRow], ProviderError> {
        self.results
            .as_deref()
            .ok_or(ProviderError::NotLoaded { part: "results" })
    }

    pub fn set_results(&mut self, results: Vec<ResultRow>) {
        self.results = Some(results);
    }

    pub fn set_laps(&mut self, laps: Vec<LapTiming>) {
        self.laps = Some(laps);
    }

    pub fn set_pit_stops(&mut self, pit_stops: Vec<PitStop>) {
        self.pit_stops = Some(pit_stops);
    }

    pub fn set_telemetry(&mut self, telemetry: Option<Vec<TelemetrySample>>) {
        self.telemetry = telemetry;
    }

    pub fn set_weather(&mut self, weather: Option<Vec<WeatherSample>>) {
        self.weather = weather;
    }

    pub fn mark_loaded(&mut self, options: LoadOptions) {
        self.loaded = Some(options);
    }

    /// Turn a loaded handle into the bundle handed to the display layer
    pub fn into_bundle(self) -> Result<SessionBundle, ProviderError> {
        let results = self
            .results
            .ok_or(ProviderError::NotLoaded { part: "results" })?;

        Ok(SessionBundle {
            key: self.key,
            event: self.event,
            kind: self.kind,
            results,
            laps: self.laps,
            pit_stops: self.pit_stops,
            telemetry: self.telemetry,
            weather: self.weather,
        })
    }
}

/// Source of session data with its own persistent cache
#[async_trait]
pub trait SessionDataProvider: Send + Sync {
    /// Map (season, round-or-name, kind) to a concrete session
    async fn resolve_session(
        &self,
        season: i32,
        event: &EventId,
        kind: SessionKind,
    ) -> Result<SessionHandle, ProviderError>;

    /// Populate the handle, reading the cache first and fetching on a miss
    async fn load(
        &self,
        handle: &mut SessionHandle,
        options: LoadOptions,
    ) -> Result<(), ProviderError>;

    /// Season calendar
    async fn event_schedule(&self, season: i32) -> Result<Vec<EventInfo>, ProviderError>;

    /// Classification rows, available after `load`
    fn results<'a>(&self, handle: &'a SessionHandle) -> Result<&'a [ResultRow], ProviderError> {
        handle.results()
    }
}

/// Pick the event a session key refers to
pub(crate) fn find_event<'a>(
    season: i32,
    events: &'a [EventInfo],
    event: &EventId,
) -> Result<&'a EventInfo, ProviderError> {
    let found = match event {
        EventId::Round(round) => events.iter().find(|e| e.round == *round),
        EventId::Name(name) => events
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name.trim()))
            .or_else(|| events.iter().find(|e| e.matches_name(name))),
    };

    found.ok_or_else(|| ProviderError::UnknownEvent {
        season,
        event: event.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> Vec<EventInfo> {
        let event = |round: u32, name: &str, circuit: &str, locality: &str, country: &str| {
            EventInfo {
                season: 2024,
                round,
                name: name.to_string(),
                circuit: circuit.to_string(),
                locality: locality.to_string(),
                country: country.to_string(),
                date: None,
                sessions: vec![SessionKind::Qualifying, SessionKind::Race],
            }
        };
        vec![
            event(1, "Bahrain Grand Prix", "Bahrain International Circuit", "Sakhir", "Bahrain"),
            event(
                3,
                "Australian Grand Prix",
                "Albert Park Grand Prix Circuit",
                "Melbourne",
                "Australia",
            ),
            event(17, "Azerbaijan Grand Prix", "Baku City Circuit", "Baku", "Azerbaijan"),
        ]
    }

    #[test]
    fn test_find_event_by_round_and_name() {
        let events = calendar();

        assert_eq!(find_event(2024, &events, &EventId::Round(3)).unwrap().round, 3);
        assert_eq!(
            find_event(2024, &events, &"bahrain grand prix".into()).unwrap().round,
            1
        );
        assert_eq!(find_event(2024, &events, &"Melbourne".into()).unwrap().round, 3);
        assert_eq!(find_event(2024, &events, &"Baku".into()).unwrap().round, 17);
    }

    #[test]
    fn test_find_event_unknown() {
        let events = calendar();

        let err = find_event(2024, &events, &EventId::Round(30)).unwrap_err();
        assert!(err.is_resolution());
        assert_eq!(err.to_string(), "No event R30 in the 2024 calendar");
        assert!(find_event(2024, &events, &"Atlantis".into()).is_err());
    }

    #[test]
    fn test_handle_into_bundle_requires_results() {
        let events = calendar();
        let key = SessionKey::race(2024, 1);
        let mut handle = SessionHandle::new(key, events[0].clone(), SessionKind::Race);

        assert!(!handle.is_loaded());
        assert!(handle.results().is_err());
        assert!(handle.clone().into_bundle().is_err());

        handle.set_results(Vec::new());
        handle.mark_loaded(LoadOptions::results_only());
        let bundle = handle.into_bundle().unwrap();
        assert!(bundle.results.is_empty());
        assert!(bundle.laps.is_none());
    }
}
