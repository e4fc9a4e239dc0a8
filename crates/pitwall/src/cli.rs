//! CLI formatting and the explore prompt grammar
//!
//! Tables are built with comfy-table; every formatter also has a JSON form.

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use pitwall_core::models::{EventInfo, SessionBundle};
use pitwall_core::{EventId, LoadOptions, SessionKind, StandingRow};

// ============================================================================
// Explore prompt
// ============================================================================

/// One line typed at the explore prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ExploreCommand {
    Load {
        season: i32,
        event: EventId,
        kind: SessionKind,
        options: LoadOptions,
    },
    Schedule(i32),
    Standings(i32),
    Help,
    Quit,
}

pub const EXPLORE_HELP: &str = "\
Commands:
  <season> <round|name> [kind] [+laps] [+telemetry] [+weather]
                            load a session, e.g. '2024 3', '2023 Monaco q +laps'
  schedule <season>         list the rounds of a season
  standings <season>        championship standings
  help                      this text
  quit                      leave";

fn parse_season(token: Option<&str>) -> Result<i32> {
    let token = token.context("missing season")?;
    token
        .parse()
        .with_context(|| format!("invalid season '{}'", token))
}

/// Parse a prompt line; Ok(None) for blank input
pub fn parse_explore_line(line: &str) -> Result<Option<ExploreCommand>> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = tokens.first().copied() else {
        return Ok(None);
    };

    match first.to_ascii_lowercase().as_str() {
        "quit" | "exit" => return Ok(Some(ExploreCommand::Quit)),
        "help" | "?" => return Ok(Some(ExploreCommand::Help)),
        "schedule" => {
            let season = parse_season(tokens.get(1).copied())?;
            return Ok(Some(ExploreCommand::Schedule(season)));
        }
        "standings" => {
            let season = parse_season(tokens.get(1).copied())?;
            return Ok(Some(ExploreCommand::Standings(season)));
        }
        _ => {}
    }

    let season = parse_season(Some(first))?;
    tokens.remove(0);

    let mut options = LoadOptions::results_only();
    tokens.retain(|t| match t.to_ascii_lowercase().as_str() {
        "+laps" => {
            options.laps = true;
            false
        }
        "+telemetry" => {
            options.telemetry = true;
            false
        }
        "+weather" => {
            options.weather = true;
            false
        }
        _ => true,
    });

    let mut kind = SessionKind::Race;
    if tokens.len() > 1 {
        if let Some(last) = tokens.last().and_then(|t| t.parse::<SessionKind>().ok()) {
            kind = last;
            tokens.pop();
        }
    }

    if tokens.is_empty() {
        bail!("missing round or event name (try 'help')");
    }
    let event: EventId = tokens.join(" ").parse().map_err(anyhow::Error::msg)?;

    Ok(Some(ExploreCommand::Load {
        season,
        event,
        kind,
        options,
    }))
}

// ============================================================================
// Formatters
// ============================================================================

fn new_table(headers: &[&str], no_color: bool) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    if no_color {
        table.set_header(headers.to_vec());
    } else {
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
    table
}

/// Classification of a loaded session
pub fn format_classification(bundle: &SessionBundle, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(bundle).unwrap_or_else(|_| "{}".to_string());
    }

    let mut lines = vec![format!(
        "{} {} - {} ({}, {})",
        bundle.event.season,
        bundle.event.name,
        bundle.kind,
        bundle.event.locality,
        bundle.event.country
    )];
    if let Some(date) = bundle.event.date {
        lines.push(format!("Date:       {}", date.format("%Y-%m-%d")));
    }

    if bundle.results.is_empty() {
        lines.push("No classification published for this session.".to_string());
        return lines.join("\n");
    }

    let qualifying = bundle.kind == SessionKind::Qualifying;
    let headers: &[&str] = if qualifying {
        &["Pos", "Driver", "Team", "Q1", "Q2", "Q3"]
    } else {
        &["Pos", "Driver", "Team", "Grid", "Laps", "Time/Status", "Pts"]
    };
    let mut table = new_table(headers, no_color);

    for row in bundle.classification() {
        let driver = match &row.abbreviation {
            Some(code) => format!("{} {}", code, row.full_name),
            None => row.full_name.clone(),
        };
        let cells = if qualifying {
            vec![
                row.position_text.clone(),
                driver,
                row.team_name.clone(),
                opt_millis(row.q1_millis),
                opt_millis(row.q2_millis),
                opt_millis(row.q3_millis),
            ]
        } else {
            vec![
                row.position_text.clone(),
                driver,
                row.team_name.clone(),
                opt_num(row.grid),
                opt_num(row.laps),
                row.time_text.clone().unwrap_or_else(|| row.status.clone()),
                format_points(row.points),
            ]
        };
        table.add_row(Row::from(cells));
    }
    lines.push(table.to_string());

    if let (Some(laps), Some(leader)) = (&bundle.laps, bundle.leader()) {
        lines.push(format!("Lap timings: {} entries", laps.len()));
        if let Some(fastest) = bundle.fastest_lap(&leader.driver_id) {
            lines.push(format!(
                "Winner's fastest lap: {} (lap {})",
                opt_millis(fastest.time_millis),
                fastest.lap
            ));
        }
    }
    if let Some(stops) = format_pit_stops(bundle, no_color) {
        lines.push(stops);
    }
    if bundle.telemetry.is_some() || bundle.weather.is_some() {
        lines.push(format!(
            "Telemetry samples: {}, weather samples: {}",
            bundle.telemetry.as_ref().map_or(0, |t| t.len()),
            bundle.weather.as_ref().map_or(0, |w| w.len())
        ));
    }

    lines.join("\n")
}

/// Per-driver pit stop summary in classification order; None without pit data
pub fn format_pit_stops(bundle: &SessionBundle, no_color: bool) -> Option<String> {
    bundle.pit_stops.as_ref()?;

    let with_laps = bundle.laps.is_some();
    let mut headers = vec!["Driver", "Stops", "Laps", "Durations", "Pit time"];
    if with_laps {
        headers.push("Fastest lap");
    }
    let mut table = new_table(&headers, no_color);

    let mut drivers = 0;
    for row in bundle.classification() {
        let stops = bundle.stops_for(&row.driver_id);
        if stops.is_empty() {
            continue;
        }
        drivers += 1;

        let laps = stops
            .iter()
            .map(|s| s.lap.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let durations = stops
            .iter()
            .map(|s| opt_millis(s.duration_millis))
            .collect::<Vec<_>>()
            .join(", ");
        // Unknown if any single stop is untimed
        let total: Option<u64> = stops.iter().map(|s| s.duration_millis).sum();

        let mut cells = vec![
            row.driver_label().to_string(),
            stops.len().to_string(),
            laps,
            durations,
            opt_millis(total),
        ];
        if with_laps {
            cells.push(match bundle.fastest_lap(&row.driver_id) {
                Some(lap) => format!("{} (lap {})", opt_millis(lap.time_millis), lap.lap),
                None => "-".to_string(),
            });
        }
        table.add_row(Row::from(cells));
    }

    if drivers == 0 {
        return Some("Pit stops: none recorded".to_string());
    }
    Some(format!("Pit stops:\n{}", table))
}

/// Season calendar
pub fn format_schedule(events: &[EventInfo], json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(events).unwrap_or_else(|_| "[]".to_string());
    }
    if events.is_empty() {
        return "No events found.".to_string();
    }

    let headers = ["Rnd", "Event", "Circuit", "Location", "Date", "Sessions"];
    let mut table = new_table(&headers, no_color);
    for event in events {
        let sessions = event
            .sessions
            .iter()
            .map(|k| k.code())
            .collect::<Vec<_>>()
            .join(" ");
        table.add_row(Row::from(vec![
            event.round.to_string(),
            event.name.clone(),
            event.circuit.clone(),
            format!("{}, {}", event.locality, event.country),
            event
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
            sessions,
        ]));
    }
    table.to_string()
}

/// Driver or constructor standings
pub fn format_standings(rows: &[StandingRow], label: &str, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
    }
    if rows.is_empty() {
        return format!("No {} standings available for this season.", label.to_lowercase());
    }

    let with_team = rows.iter().any(|r| r.team.is_some());
    let mut headers = vec!["Pos", label];
    if with_team {
        headers.push("Team");
    }
    headers.extend(["Wins", "Points"]);

    let mut table = new_table(&headers, no_color);
    for row in rows {
        let mut cells = vec![row.position.to_string(), row.name.clone()];
        if with_team {
            cells.push(row.team.clone().unwrap_or_default());
        }
        cells.push(row.wins.to_string());
        cells.push(format_points(row.points));
        table.add_row(Row::from(cells));
    }
    table.to_string()
}

// ============================================================================
// Utilities
// ============================================================================

/// Render a duration in timing-screen form: "1:31:44.742", "1:29.708", "23.872"
pub fn format_millis(millis: u64) -> String {
    let ms = millis % 1_000;
    let total_secs = millis / 1_000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3_600;

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
    } else if mins > 0 {
        format!("{}:{:02}.{:03}", mins, secs, ms)
    } else {
        format!("{}.{:03}", secs, ms)
    }
}

fn opt_millis(millis: Option<u64>) -> String {
    millis.map(format_millis).unwrap_or_else(|| "-".to_string())
}

fn opt_num(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn format_points(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{}", points as i64)
    } else {
        format!("{:.1}", points)
    }
}

pub fn format_bytes(bytes: usize) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1_024 {
        format!("{:.1} KB", bytes as f64 / 1_024.0)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
