//! Loaded session data handed to the display layer

use super::session::{SessionKey, SessionKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One round of a season's calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub season: i32,
    pub round: u32,
    pub name: String,
    pub circuit: String,
    pub locality: String,
    pub country: String,
    pub date: Option<NaiveDate>,
    /// Session kinds held at this event
    pub sessions: Vec<SessionKind>,
}

impl EventInfo {
    pub fn holds(&self, kind: SessionKind) -> bool {
        self.sessions.contains(&kind)
    }

    /// Case-insensitive match against race name, circuit, locality or country
    pub fn matches_name(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return false;
        }
        [&self.name, &self.circuit, &self.locality, &self.country]
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
    }
}

/// One classified entry of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Classified position (None when not classified)
    pub position: Option<u32>,
    /// Position as published ("1", "R" for retired, "D" for disqualified, ...)
    pub position_text: String,
    pub driver_number: Option<u32>,
    pub driver_id: String,
    pub abbreviation: Option<String>,
    pub full_name: String,
    pub team_name: String,
    pub grid: Option<u32>,
    pub laps: Option<u32>,
    pub status: String,
    pub points: f64,
    /// Race time for the winner, absolute time for the others
    pub time_millis: Option<u64>,
    /// Published time text ("1:31:44.742", "+22.457")
    pub time_text: Option<String>,
    pub q1_millis: Option<u64>,
    pub q2_millis: Option<u64>,
    pub q3_millis: Option<u64>,
}

impl ResultRow {
    /// Three-letter code, falling back to the driver id
    pub fn driver_label(&self) -> &str {
        self.abbreviation.as_deref().unwrap_or(&self.driver_id)
    }

    /// Best qualifying time across Q1..Q3
    pub fn best_qualifying_millis(&self) -> Option<u64> {
        [self.q1_millis, self.q2_millis, self.q3_millis]
            .into_iter()
            .flatten()
            .min()
    }
}

/// Lap time of one driver on one lap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapTiming {
    pub driver_id: String,
    pub lap: u32,
    pub position: Option<u32>,
    pub time_millis: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitStop {
    pub driver_id: String,
    pub lap: u32,
    pub stop: u32,
    /// Local time of day the stop happened
    pub time_of_day: String,
    pub duration_millis: Option<u64>,
}

/// Car telemetry sample along a lap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub driver_id: String,
    pub lap: u32,
    pub distance_m: f64,
    pub speed_kph: f64,
    pub throttle_pct: f64,
    pub brake: bool,
    pub rpm: u32,
    pub gear: u8,
    pub drs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// Seconds since session start
    pub offset_secs: u32,
    pub air_temp_c: f64,
    pub track_temp_c: f64,
    pub humidity_pct: f64,
    pub rainfall: bool,
}

/// In-memory result of loading a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBundle {
    pub key: SessionKey,
    pub event: EventInfo,
    pub kind: SessionKind,
    pub results: Vec<ResultRow>,
    pub laps: Option<Vec<LapTiming>>,
    pub pit_stops: Option<Vec<PitStop>>,
    pub telemetry: Option<Vec<TelemetrySample>>,
    pub weather: Option<Vec<WeatherSample>>,
}

impl SessionBundle {
    /// Results sorted by classified position, unclassified entries last
    pub fn classification(&self) -> Vec<&ResultRow> {
        let mut rows: Vec<_> = self.results.iter().collect();
        rows.sort_by_key(|r| r.position.unwrap_or(u32::MAX));
        rows
    }

    /// Winner (or pole sitter for qualifying)
    pub fn leader(&self) -> Option<&ResultRow> {
        self.results.iter().find(|r| r.position == Some(1))
    }

    /// Pit stops of one driver, in stop order
    pub fn stops_for(&self, driver_id: &str) -> Vec<&PitStop> {
        let mut stops: Vec<_> = self
            .pit_stops
            .iter()
            .flatten()
            .filter(|p| p.driver_id == driver_id)
            .collect();
        stops.sort_by_key(|p| p.stop);
        stops
    }

    /// Fastest timed lap of a driver
    pub fn fastest_lap(&self, driver_id: &str) -> Option<&LapTiming> {
        self.laps
            .iter()
            .flatten()
            .filter(|l| l.driver_id == driver_id && l.time_millis.is_some())
            .min_by_key(|l| l.time_millis)
    }
}
