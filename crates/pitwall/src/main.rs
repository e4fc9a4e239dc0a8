//! pitwall - Formula 1 session explorer

mod cli;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use cli::{ExploreCommand, EXPLORE_HELP};
use indicatif::{ProgressBar, ProgressStyle};
use pitwall_core::warmup::ProgressCallback;
use pitwall_core::{
    DashboardConfig, DashboardStore, EventId, LoadOptions, Selection, SessionKind,
    WarmupProgress,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pitwall",
    version,
    about = "Formula 1 session explorer",
    long_about = "Browse Formula 1 results, lap timings, pit stops and championship standings.\n\
                  \n\
                  Sessions are cached on disk; the first interactive run warms the cache\n\
                  in the background with recent races.\n\
                  \n\
                  Examples:\n\
                    pitwall session 2024 3                  # Race classification, round 3\n\
                    pitwall session 2023 Monaco --kind q    # Qualifying by event name\n\
                    pitwall session 2024 Baku --laps        # With lap timings and pit stops\n\
                    pitwall standings 2023                  # Driver and constructor standings\n\
                    pitwall schedule 2024                   # Season calendar\n\
                    pitwall warmup --season 2024            # Pre-fetch a season\n\
                    pitwall explore                         # Interactive prompt\n\
                  \n\
                  Environment Variables:\n\
                    PITWALL_CONFIG                          # Config file path\n\
                    PITWALL_CACHE_DIR                       # Override cache directory\n\
                    PITWALL_NO_COLOR                        # Disable ANSI colors\n\
                    RUST_LOG                                # Log filter (default: warn)"
)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Config file (default: <config_dir>/pitwall/config.toml)
    #[arg(long, global = true, env = "PITWALL_CONFIG")]
    config: Option<PathBuf>,

    /// Session cache directory
    #[arg(long, global = true, env = "PITWALL_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, global = true, env = "PITWALL_NO_COLOR")]
    no_color: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Mode {
    /// Pre-fetch a matrix of sessions into the cache
    Warmup {
        /// Season to warm (repeatable; default from config)
        #[arg(long = "season")]
        seasons: Vec<i32>,
        #[arg(long)]
        first_round: Option<u32>,
        #[arg(long)]
        last_round: Option<u32>,
        #[arg(long)]
        kind: Option<SessionKind>,
        /// Worker pool size
        #[arg(long, short = 'j')]
        parallel: Option<usize>,
        /// Per-session timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Show one session
    Session {
        season: i32,
        /// Round number (3, R3) or event name (Monaco, Baku)
        event: EventId,
        #[arg(long, short = 'k', default_value = "race")]
        kind: SessionKind,
        /// Include lap timings and pit stops
        #[arg(long)]
        laps: bool,
        #[arg(long)]
        telemetry: bool,
        #[arg(long)]
        weather: bool,
        #[arg(long)]
        json: bool,
    },
    /// Interactive prompt; warms the cache in the background
    Explore {
        #[arg(long)]
        no_warmup: bool,
    },
    /// Championship standings
    Standings {
        season: i32,
        #[arg(long, value_enum, default_value = "both")]
        view: StandingsView,
        #[arg(long)]
        json: bool,
    },
    /// Season calendar
    Schedule {
        season: i32,
        #[arg(long)]
        json: bool,
    },
    /// Inspect or clear the session cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StandingsView {
    Drivers,
    Constructors,
    Both,
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    Clear,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.cache.dir = Some(dir);
    }

    let no_color = cli.no_color;

    match cli.mode {
        Mode::Warmup {
            seasons,
            first_round,
            last_round,
            kind,
            parallel,
            timeout,
        } => {
            if !seasons.is_empty() {
                config.warmup.seasons = seasons;
            }
            if let Some(first) = first_round {
                config.warmup.first_round = first;
            }
            if let Some(last) = last_round {
                config.warmup.last_round = last;
            }
            if let Some(kind) = kind {
                config.warmup.kind = kind;
            }
            if let Some(parallel) = parallel {
                config.warmup.max_parallel = parallel;
            }
            if let Some(timeout) = timeout {
                config.warmup.timeout_secs = timeout;
            }
            config.validate()?;
            run_warmup(config).await?;
        }
        Mode::Session {
            season,
            event,
            kind,
            laps,
            telemetry,
            weather,
            json,
        } => {
            let options = LoadOptions::results_only()
                .with_laps(laps)
                .with_telemetry(telemetry)
                .with_weather(weather);
            run_session(config, Selection::new(season, event, kind), options, json, no_color)
                .await?;
        }
        Mode::Explore { no_warmup } => {
            if no_warmup {
                config.warmup.enabled = false;
            }
            run_explore(config, no_color).await?;
        }
        Mode::Standings { season, view, json } => {
            run_standings(config, season, view, json, no_color).await?;
        }
        Mode::Schedule { season, json } => {
            run_schedule(config, season, json, no_color).await?;
        }
        Mode::Cache { action } => {
            run_cache(config, action)?;
        }
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

async fn run_warmup(mut config: DashboardConfig) -> Result<()> {
    // Explicit request, no reason to wait
    config.warmup.start_delay_secs = 0;
    config.warmup.enabled = true;

    let total = config.warmup_keys().len() as u64;
    let bar = ProgressBar::new(total);
    let template = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message("warming session cache");

    let observer: ProgressCallback = {
        let bar = bar.clone();
        Arc::new(move |progress: WarmupProgress| {
            bar.set_position(progress.completed as u64);
            Ok(())
        })
    };

    let store = DashboardStore::from_config(config)?.with_progress(observer);
    let Some(handle) = store.on_first_load() else {
        bar.finish_and_clear();
        println!("Nothing to warm.");
        return Ok(());
    };

    let report = handle.wait().await.context("Warmup batch did not complete")?;
    bar.finish_and_clear();

    println!(
        "Warmed {}/{} sessions ({} failed)",
        report.succeeded,
        report.total,
        report.failed()
    );
    for failure in &report.failures {
        println!("  - {}", failure);
    }
    if let Some(path) = store.cache_path() {
        println!("Cache: {}", path.display());
    }

    Ok(())
}

async fn run_session(
    config: DashboardConfig,
    selection: Selection,
    options: LoadOptions,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let store = DashboardStore::from_config(config)?;

    let spinner = spinner(&format!("Loading {}...", selection.key()));
    let result = store.load_session(&selection, options).await;
    spinner.finish_and_clear();

    match result {
        Ok(bundle) => println!("{}", cli::format_classification(&bundle, json, no_color)),
        Err(e) => anyhow::bail!("{}", e),
    }
    Ok(())
}

async fn run_explore(config: DashboardConfig, no_color: bool) -> Result<()> {
    let store = DashboardStore::from_config(config)?;

    // Fire and forget; the prompt never waits on it
    let _warmup = store.on_first_load();

    println!("pitwall explore - type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"pitwall> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match cli::parse_explore_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            ExploreCommand::Quit => break,
            ExploreCommand::Help => println!("{}", EXPLORE_HELP),
            ExploreCommand::Load {
                season,
                event,
                kind,
                options,
            } => {
                let selection = Selection::new(season, event, kind);
                match store.load_session(&selection, options).await {
                    Ok(bundle) => {
                        println!("{}", cli::format_classification(&bundle, false, no_color))
                    }
                    Err(e) => println!("{}", e),
                }
            }
            ExploreCommand::Schedule(season) => match store.schedule(season).await {
                Ok(events) => println!("{}", cli::format_schedule(&events, false, no_color)),
                Err(e) => println!("{}", e),
            },
            ExploreCommand::Standings(season) => match store.standings(season).await {
                Ok(standings) => {
                    print_standings(&standings, StandingsView::Both, false, no_color)
                }
                Err(e) => println!("{}", e),
            },
        }
    }

    Ok(())
}

fn print_standings(
    standings: &pitwall_core::Standings,
    view: StandingsView,
    json: bool,
    no_color: bool,
) {
    if matches!(view, StandingsView::Drivers | StandingsView::Both) {
        if !json {
            println!("Driver Standings {}", standings.season);
        }
        println!(
            "{}",
            cli::format_standings(&standings.drivers, "Driver", json, no_color)
        );
    }
    if matches!(view, StandingsView::Constructors | StandingsView::Both) {
        if !json {
            println!("Constructor Standings {}", standings.season);
        }
        println!(
            "{}",
            cli::format_standings(&standings.constructors, "Constructor", json, no_color)
        );
    }

    if !json && standings.report.has_errors() {
        println!();
        println!("Warnings:");
        for error in standings.report.warnings() {
            println!("  - {}: {}", error.source, error.message);
        }
    }
}

async fn run_standings(
    config: DashboardConfig,
    season: i32,
    view: StandingsView,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let store = DashboardStore::from_config(config)?;

    let spinner = spinner(&format!("Loading {} standings, this may take a while...", season));
    let standings = store.standings(season).await;
    spinner.finish_and_clear();

    let standings = standings.with_context(|| format!("Failed to load {} standings", season))?;
    print_standings(&standings, view, json, no_color);
    Ok(())
}

async fn run_schedule(
    config: DashboardConfig,
    season: i32,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let store = DashboardStore::from_config(config)?;
    let events = store
        .schedule(season)
        .await
        .with_context(|| format!("Failed to load {} schedule", season))?;
    println!("{}", cli::format_schedule(&events, json, no_color));
    Ok(())
}

fn run_cache(config: DashboardConfig, action: CacheAction) -> Result<()> {
    let store = DashboardStore::from_config(config)?;

    match action {
        CacheAction::Stats => match store.cache_stats()? {
            Some(stats) => {
                if let Some(path) = store.cache_path() {
                    println!("Cache:      {}", path.display());
                }
                println!("Sessions:   {}", stats.sessions);
                println!("Parts:      {}", stats.total_parts);
                println!("Calendars:  {}", stats.seasons);
                println!("Size:       {}", cli::format_bytes(stats.total_size_bytes));
            }
            None => println!("Running without session cache."),
        },
        CacheAction::Clear => {
            if store.clear_cache()? {
                println!("Session cache cleared.");
            } else {
                println!("Running without session cache, nothing to clear.");
            }
        }
    }
    Ok(())
}
