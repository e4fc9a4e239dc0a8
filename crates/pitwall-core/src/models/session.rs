//! Session identity: which event segment, and how much of it to load

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of session within a race weekend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Practice,
    Qualifying,
    Sprint,
    Race,
}

impl SessionKind {
    /// Stable identifier used in cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Practice => "practice",
            SessionKind::Qualifying => "qualifying",
            SessionKind::Sprint => "sprint",
            SessionKind::Race => "race",
        }
    }

    /// Short timing-screen code (FP, Q, S, R)
    pub fn code(&self) -> &'static str {
        match self {
            SessionKind::Practice => "FP",
            SessionKind::Qualifying => "Q",
            SessionKind::Sprint => "S",
            SessionKind::Race => "R",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionKind::Practice => "Practice",
            SessionKind::Qualifying => "Qualifying",
            SessionKind::Sprint => "Sprint",
            SessionKind::Race => "Race",
        };
        f.write_str(label)
    }
}

impl FromStr for SessionKind {
    type Err = String;

    /// Accepts full names and the short codes the timing screens use
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fp" | "fp1" | "p" | "practice" => Ok(SessionKind::Practice),
            "q" | "quali" | "qualifying" => Ok(SessionKind::Qualifying),
            "s" | "sprint" => Ok(SessionKind::Sprint),
            "r" | "race" => Ok(SessionKind::Race),
            other => Err(format!(
                "unknown session kind '{}' (expected race, qualifying, sprint or practice)",
                other
            )),
        }
    }
}

/// Event identifier: a round number or a (partial) event name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventId {
    Round(u32),
    Name(String),
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Round(round) => write!(f, "R{}", round),
            EventId::Name(name) => write!(f, "'{}'", name),
        }
    }
}

impl FromStr for EventId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("event identifier is empty".to_string());
        }
        let digits = trimmed
            .strip_prefix('R')
            .or_else(|| trimmed.strip_prefix('r'))
            .unwrap_or(trimmed);
        match digits.parse::<u32>() {
            Ok(0) => Err("round numbers start at 1".to_string()),
            Ok(round) => Ok(EventId::Round(round)),
            Err(_) => Ok(EventId::Name(trimmed.to_string())),
        }
    }
}

impl From<u32> for EventId {
    fn from(round: u32) -> Self {
        EventId::Round(round)
    }
}

impl From<&str> for EventId {
    fn from(name: &str) -> Self {
        EventId::Name(name.to_string())
    }
}

/// Identifies one real-world session; the lookup key for fetches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub season: i32,
    pub event: EventId,
    pub kind: SessionKind,
}

impl SessionKey {
    pub fn new(season: i32, event: impl Into<EventId>, kind: SessionKind) -> Self {
        Self {
            season,
            event: event.into(),
            kind,
        }
    }

    pub fn race(season: i32, round: u32) -> Self {
        Self::new(season, round, SessionKind::Race)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.season, self.event, self.kind)
    }
}

/// Which optional parts of a session to load on top of the classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadOptions {
    pub laps: bool,
    pub telemetry: bool,
    pub weather: bool,
}

impl LoadOptions {
    /// Classification only; what warmup requests
    pub fn results_only() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            laps: true,
            telemetry: true,
            weather: true,
        }
    }

    pub fn with_laps(mut self, laps: bool) -> Self {
        self.laps = laps;
        self
    }

    pub fn with_telemetry(mut self, telemetry: bool) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_weather(mut self, weather: bool) -> Self {
        self.weather = weather;
        self
    }

    /// True if a bundle loaded with `self` already contains everything `other` asks for
    pub fn covers(&self, other: &LoadOptions) -> bool {
        (self.laps || !other.laps)
            && (self.telemetry || !other.telemetry)
            && (self.weather || !other.weather)
    }
}
