//! Jolpica remote source
//!
//! Fetches calendars, classifications, lap timings and pit stops from the
//! Ergast-compatible Jolpica API.
//! Source: https://api.jolpi.ca/ergast/f1/
//!
//! All numbers arrive as JSON strings. Responses are paginated with
//! `limit`/`offset`; the API caps `limit` at 100, so lap timings of a full race
//! take a dozen requests.

use super::remote::RemoteSource;
use crate::error::ProviderError;
use crate::models::{EventInfo, LapTiming, PitStop, ResultRow, SessionKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};

/// Jolpica API base URL
pub const JOLPICA_BASE_URL: &str = "https://api.jolpi.ca/ergast/f1";

/// Largest page the API serves
const MAX_PAGE_SIZE: u32 = 100;

/// Upper bound on pages per request (circuit breaker)
const MAX_PAGES: u32 = 50;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MRData")]
    mr_data: MrData,
}

#[derive(Debug, Deserialize)]
struct MrData {
    #[serde(default)]
    offset: String,
    #[serde(default)]
    total: String,
    #[serde(rename = "RaceTable", default)]
    race_table: RaceTable,
}

#[derive(Debug, Default, Deserialize)]
struct RaceTable {
    #[serde(rename = "Races", default)]
    races: Vec<ApiRace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRace {
    season: String,
    round: String,
    race_name: String,
    #[serde(rename = "Circuit", default)]
    circuit: ApiCircuit,
    #[serde(default)]
    date: Option<String>,
    #[serde(rename = "FirstPractice", default)]
    first_practice: Option<IgnoredAny>,
    #[serde(rename = "Sprint", default)]
    sprint: Option<IgnoredAny>,
    #[serde(rename = "Results", default)]
    results: Vec<ApiResult>,
    #[serde(rename = "QualifyingResults", default)]
    qualifying_results: Vec<ApiResult>,
    #[serde(rename = "SprintResults", default)]
    sprint_results: Vec<ApiResult>,
    #[serde(rename = "Laps", default)]
    laps: Vec<ApiLap>,
    #[serde(rename = "PitStops", default)]
    pit_stops: Vec<ApiPitStop>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCircuit {
    #[serde(default)]
    circuit_name: String,
    #[serde(rename = "Location", default)]
    location: ApiLocation,
}

#[derive(Debug, Default, Deserialize)]
struct ApiLocation {
    #[serde(default)]
    locality: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResult {
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    position_text: Option<String>,
    #[serde(default)]
    points: Option<String>,
    #[serde(rename = "Driver")]
    driver: ApiDriver,
    #[serde(rename = "Constructor", default)]
    constructor: Option<ApiConstructor>,
    #[serde(default)]
    grid: Option<String>,
    #[serde(default)]
    laps: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "Time", default)]
    time: Option<ApiTime>,
    #[serde(rename = "Q1", default)]
    q1: Option<String>,
    #[serde(rename = "Q2", default)]
    q2: Option<String>,
    #[serde(rename = "Q3", default)]
    q3: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDriver {
    driver_id: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiConstructor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTime {
    #[serde(default)]
    millis: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiLap {
    number: String,
    #[serde(rename = "Timings", default)]
    timings: Vec<ApiTiming>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTiming {
    driver_id: String,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPitStop {
    driver_id: String,
    lap: String,
    stop: String,
    #[serde(default)]
    time: String,
    #[serde(default)]
    duration: Option<String>,
}

fn num<T: FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Parse a timing string ("1:31:44.742", "1:29.708", "23.872") into milliseconds
pub fn parse_lap_time(text: &str) -> Option<u64> {
    let text = text.trim().trim_start_matches('+');
    if text.is_empty() {
        return None;
    }

    let mut parts = text.rsplit(':');
    let seconds = parts.next()?;
    let (whole, frac) = match seconds.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (seconds, ""),
    };

    let whole: u64 = whole.parse().ok()?;
    let frac_millis: u64 = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().chain("000".chars()).take(3).collect();
        digits.parse().ok()?
    };

    // Malformed feeds can carry absurd values; overflow means "no time"
    let mut millis = whole.checked_mul(1_000)?.checked_add(frac_millis)?;
    let mut unit: u64 = 60_000;
    for part in parts {
        let value: u64 = part.parse().ok()?;
        millis = millis.checked_add(value.checked_mul(unit)?)?;
        unit = unit.checked_mul(60)?;
    }

    Some(millis)
}

impl ApiRace {
    fn into_event(self) -> EventInfo {
        let mut sessions = Vec::with_capacity(4);
        if self.first_practice.is_some() {
            sessions.push(SessionKind::Practice);
        }
        // Older calendars carry no qualifying timestamps, every round had one
        sessions.push(SessionKind::Qualifying);
        if self.sprint.is_some() {
            sessions.push(SessionKind::Sprint);
        }
        sessions.push(SessionKind::Race);

        EventInfo {
            season: num(Some(&self.season)).unwrap_or_default(),
            round: num(Some(&self.round)).unwrap_or_default(),
            name: self.race_name,
            circuit: self.circuit.circuit_name,
            locality: self.circuit.location.locality,
            country: self.circuit.location.country,
            date: self
                .date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            sessions,
        }
    }
}

impl ApiResult {
    fn into_row(self) -> ResultRow {
        let position: Option<u32> = num(self.position.as_deref());
        let full_name = format!("{} {}", self.driver.given_name, self.driver.family_name)
            .trim()
            .to_string();

        ResultRow {
            position_text: self
                .position_text
                .or_else(|| self.position.clone())
                .unwrap_or_else(|| "-".to_string()),
            position,
            driver_number: num(self.number.as_deref()),
            driver_id: self.driver.driver_id,
            abbreviation: self.driver.code,
            full_name,
            team_name: self
                .constructor
                .map(|c| c.name)
                .unwrap_or_else(|| "Unknown".to_string()),
            grid: num(self.grid.as_deref()),
            laps: num(self.laps.as_deref()),
            status: self.status.unwrap_or_default(),
            points: num(self.points.as_deref()).unwrap_or(0.0),
            time_millis: self
                .time
                .as_ref()
                .and_then(|t| num(t.millis.as_deref())),
            time_text: self.time.and_then(|t| t.time),
            q1_millis: self.q1.as_deref().and_then(parse_lap_time),
            q2_millis: self.q2.as_deref().and_then(parse_lap_time),
            q3_millis: self.q3.as_deref().and_then(parse_lap_time),
        }
    }
}

fn parse_page(url: &str, body: &str) -> Result<MrData, ProviderError> {
    serde_json::from_str::<Envelope>(body)
        .map(|e| e.mr_data)
        .map_err(|e| ProviderError::Parse {
            url: url.to_string(),
            message: e.to_string(),
            source: e,
        })
}

fn results_for(races: Vec<ApiRace>, kind: SessionKind) -> Vec<ResultRow> {
    races
        .into_iter()
        .flat_map(|race| match kind {
            SessionKind::Qualifying => race.qualifying_results,
            SessionKind::Sprint => race.sprint_results,
            _ => race.results,
        })
        .map(ApiResult::into_row)
        .collect()
}

fn laps_from(races: Vec<ApiRace>) -> Vec<LapTiming> {
    races
        .into_iter()
        .flat_map(|race| race.laps)
        .flat_map(|lap| {
            let number: u32 = num(Some(&lap.number)).unwrap_or_default();
            lap.timings.into_iter().map(move |t| LapTiming {
                driver_id: t.driver_id,
                lap: number,
                position: num(t.position.as_deref()),
                time_millis: t.time.as_deref().and_then(parse_lap_time),
            })
        })
        .collect()
}

fn pit_stops_from(races: Vec<ApiRace>) -> Vec<PitStop> {
    races
        .into_iter()
        .flat_map(|race| race.pit_stops)
        .map(|p| PitStop {
            lap: num(Some(&p.lap)).unwrap_or_default(),
            stop: num(Some(&p.stop)).unwrap_or_default(),
            duration_millis: p.duration.as_deref().and_then(parse_lap_time),
            time_of_day: p.time,
            driver_id: p.driver_id,
        })
        .collect()
}

/// HTTP client for the Jolpica API
pub struct JolpicaClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl JolpicaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pitwall/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: MAX_PAGE_SIZE,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(JOLPICA_BASE_URL, Duration::from_secs(30))
    }

    /// Override the page size (clamped to the API maximum)
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_page(&self, url: &str, offset: u32) -> Result<MrData, ProviderError> {
        trace!(url, offset, "GET");

        let response = self
            .http
            .get(url)
            .query(&[("limit", self.page_size), ("offset", offset)])
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ProviderError::Network {
            url: url.to_string(),
            source: e,
        })?;

        parse_page(url, &body)
    }

    /// Fetch every page of a race table
    async fn get_races(&self, path: &str) -> Result<Vec<ApiRace>, ProviderError> {
        let url = format!("{}/{}.json", self.base_url, path);
        let mut races = Vec::new();
        let mut offset = 0u32;

        for _ in 0..MAX_PAGES {
            let page = self.get_page(&url, offset).await?;
            let total: u32 = num(Some(&page.total)).unwrap_or(0);
            let page_offset: u32 = num(Some(&page.offset)).unwrap_or(offset);
            races.extend(page.race_table.races);

            offset = page_offset + self.page_size;
            if offset >= total {
                break;
            }
        }

        debug!(url = %url, races = races.len(), "Fetched race table");
        Ok(races)
    }
}

#[async_trait]
impl RemoteSource for JolpicaClient {
    async fn schedule(&self, season: i32) -> Result<Vec<EventInfo>, ProviderError> {
        let races = self.get_races(&season.to_string()).await?;
        Ok(races.into_iter().map(ApiRace::into_event).collect())
    }

    async fn results(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Vec<ResultRow>, ProviderError> {
        let endpoint = match kind {
            SessionKind::Race => "results",
            SessionKind::Qualifying => "qualifying",
            SessionKind::Sprint => "sprint",
            SessionKind::Practice => {
                debug!(
                    season = event.season,
                    round = event.round,
                    "No practice classification published"
                );
                return Ok(Vec::new());
            }
        };

        let races = self
            .get_races(&format!("{}/{}/{}", event.season, event.round, endpoint))
            .await?;
        Ok(results_for(races, kind))
    }

    async fn laps(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Vec<LapTiming>, ProviderError> {
        // Lap-by-lap timings are only published for the grand prix itself
        if kind != SessionKind::Race {
            return Ok(Vec::new());
        }
        let races = self
            .get_races(&format!("{}/{}/laps", event.season, event.round))
            .await?;
        Ok(laps_from(races))
    }

    async fn pit_stops(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Vec<PitStop>, ProviderError> {
        if kind != SessionKind::Race {
            return Ok(Vec::new());
        }
        let races = self
            .get_races(&format!("{}/{}/pitstops", event.season, event.round))
            .await?;
        Ok(pit_stops_from(races))
    }
}
