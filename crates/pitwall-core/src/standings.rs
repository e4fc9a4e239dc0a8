//! Championship standings
//!
//! Sums grand prix points per driver and per constructor over every round of a
//! season. Sprint points are not included. A round that fails to load is
//! reported as a warning and skipped.

use crate::error::{LoadError, LoadReport, ProviderError};
use crate::fetch::SessionFetcher;
use crate::models::{LoadOptions, ResultRow, SessionKey};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One line of a standings table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandingRow {
    pub position: usize,
    pub name: String,
    /// Team of the driver's most recent counted race (None for constructors)
    pub team: Option<String>,
    pub points: f64,
    pub wins: u32,
}

#[derive(Debug, Default)]
struct Tally {
    name: String,
    team: Option<String>,
    points: f64,
    wins: u32,
}

/// Running totals while races are added
#[derive(Debug, Default)]
pub struct StandingsTable {
    drivers: HashMap<String, Tally>,
    constructors: HashMap<String, Tally>,
    races: usize,
}

impl StandingsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a race classification
    pub fn add_race(&mut self, results: &[ResultRow]) {
        if results.is_empty() {
            return;
        }
        self.races += 1;

        for row in results {
            let won = u32::from(row.position == Some(1));

            let driver_key = row
                .abbreviation
                .clone()
                .unwrap_or_else(|| row.driver_id.clone());
            let driver = self.drivers.entry(driver_key.clone()).or_insert_with(|| Tally {
                name: driver_key,
                ..Default::default()
            });
            driver.points += row.points;
            driver.wins += won;
            driver.team = Some(row.team_name.clone());

            if !row.team_name.is_empty() {
                let team = self
                    .constructors
                    .entry(row.team_name.clone())
                    .or_insert_with(|| Tally {
                        name: row.team_name.clone(),
                        ..Default::default()
                    });
                team.points += row.points;
                team.wins += won;
            }
        }
    }

    /// Races with a classification
    pub fn races(&self) -> usize {
        self.races
    }

    pub fn drivers(&self) -> Vec<StandingRow> {
        ranked(self.drivers.values())
    }

    pub fn constructors(&self) -> Vec<StandingRow> {
        ranked(self.constructors.values())
    }
}

/// Order by points, then wins, then name
fn ranked<'a>(tallies: impl Iterator<Item = &'a Tally>) -> Vec<StandingRow> {
    let mut rows: Vec<&Tally> = tallies.collect();
    rows.sort_by(|a, b| {
        b.points
            .total_cmp(&a.points)
            .then_with(|| b.wins.cmp(&a.wins))
            .then_with(|| a.name.cmp(&b.name))
    });

    rows.into_iter()
        .enumerate()
        .map(|(i, t)| StandingRow {
            position: i + 1,
            name: t.name.clone(),
            team: t.team.clone(),
            points: t.points,
            wins: t.wins,
        })
        .collect()
}

/// Standings of one season
#[derive(Debug)]
pub struct Standings {
    pub season: i32,
    pub drivers: Vec<StandingRow>,
    pub constructors: Vec<StandingRow>,
    /// Rounds that contributed a classification
    pub rounds_counted: usize,
    /// Rounds that failed to load
    pub report: LoadReport,
}

/// Build the standings of `season` from the race of every scheduled round
pub async fn season_standings(
    fetcher: &SessionFetcher,
    season: i32,
) -> Result<Standings, ProviderError> {
    let schedule = fetcher.provider().event_schedule(season).await?;
    if schedule.is_empty() {
        return Err(ProviderError::UnknownSeason { season });
    }

    let mut table = StandingsTable::new();
    let mut report = LoadReport::new();

    for event in &schedule {
        let key = SessionKey::race(season, event.round);
        match fetcher.fetch(&key, LoadOptions::results_only()).await {
            Ok(bundle) => {
                report.sessions_loaded += 1;
                table.add_race(&bundle.results);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping round in standings");
                report.sessions_failed += 1;
                report.add_error(LoadError::warning(
                    key.to_string(),
                    format!("Could not load round {}: {}", event.round, e.cause),
                ));
            }
        }
    }

    debug!(
        season,
        rounds = schedule.len(),
        counted = table.races(),
        failed = report.sessions_failed,
        "Standings computed"
    );

    Ok(Standings {
        season,
        drivers: table.drivers(),
        constructors: table.constructors(),
        rounds_counted: table.races(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, team: &str, position: u32, points: f64) -> ResultRow {
        ResultRow {
            position: Some(position),
            position_text: position.to_string(),
            driver_number: None,
            driver_id: code.to_lowercase(),
            abbreviation: Some(code.to_string()),
            full_name: code.to_string(),
            team_name: team.to_string(),
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

    #[test]
    fn test_points_and_wins_accumulate() {
        let mut table = StandingsTable::new();
        table.add_race(&[
            row("VER", "Red Bull", 1, 25.0),
            row("LEC", "Ferrari", 2, 18.0),
            row("PER", "Red Bull", 3, 15.0),
        ]);
        table.add_race(&[
            row("LEC", "Ferrari", 1, 26.0),
            row("VER", "Red Bull", 2, 18.0),
            row("SAI", "Ferrari", 3, 15.0),
        ]);
        // Future round with no classification yet
        table.add_race(&[]);

        assert_eq!(table.races(), 2);

        let drivers = table.drivers();
        assert_eq!(drivers[0].name, "LEC");
        assert_eq!(drivers[0].points, 44.0);
        assert_eq!(drivers[0].wins, 1);
        assert_eq!(drivers[1].name, "VER");
        assert_eq!(drivers[1].points, 43.0);
        assert_eq!(drivers[1].team.as_deref(), Some("Red Bull"));
        assert_eq!(drivers.last().unwrap().position, 4);

        let constructors = table.constructors();
        assert_eq!(constructors[0].name, "Ferrari");
        assert_eq!(constructors[0].points, 59.0);
        assert_eq!(constructors[1].name, "Red Bull");
        assert_eq!(constructors[1].points, 58.0);
        assert_eq!(constructors[1].wins, 1);
    }

    #[test]
    fn test_ties_break_on_wins_then_name() {
        let mut table = StandingsTable::new();
        table.add_race(&[
            row("BOT", "Sauber", 1, 10.0),
            row("ALB", "Williams", 5, 10.0),
            row("ZHO", "Sauber", 6, 10.0),
        ]);

        let names: Vec<_> = table.drivers().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["BOT", "ALB", "ZHO"]);
    }

    #[test]
    fn test_driver_without_code_uses_id() {
        let mut table = StandingsTable::new();
        let mut historic = row("X", "Brabham", 1, 9.0);
        historic.abbreviation = None;
        historic.driver_id = "piquet".to_string();
        table.add_race(&[historic]);

        assert_eq!(table.drivers()[0].name, "piquet");
    }
}
