//! Error types for pitwall-core
//!
//! Provider errors are classified as resolution or load failures; warmup wraps them
//! per task so one failing session never takes its siblings down.

use crate::models::{SessionKey, SessionKind};
use std::time::Duration;
use thiserror::Error;

/// Broad class of a failure, used for logging and user messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requested session does not exist
    Resolution,
    /// Network, parse or cache failure while loading
    Load,
    /// Warmup task exceeded its time budget
    Timeout,
    /// Progress observer failed
    Callback,
}

/// Error raised by a session data provider
#[derive(Error, Debug)]
pub enum ProviderError {
    // ===================
    // Resolution
    // ===================
    #[error("No calendar published for season {season}")]
    UnknownSeason { season: i32 },

    #[error("No event {event} in the {season} calendar")]
    UnknownEvent { season: i32, event: String },

    #[error("{event} ({season}) has no {kind} session")]
    SessionNotHeld {
        season: i32,
        event: String,
        kind: SessionKind,
    },

    // ===================
    // Load
    // ===================
    #[error("Request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to parse response from {url}: {message}")]
    Parse {
        url: String,
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session data not loaded: {part}")]
    NotLoaded { part: &'static str },
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::UnknownSeason { .. }
            | ProviderError::UnknownEvent { .. }
            | ProviderError::SessionNotHeld { .. } => ErrorKind::Resolution,
            _ => ErrorKind::Load,
        }
    }

    pub fn is_resolution(&self) -> bool {
        self.kind() == ErrorKind::Resolution
    }
}

/// A fetch of one session failed
#[derive(Error, Debug)]
#[error("Failed to fetch {key}: {cause}")]
pub struct FetchError {
    pub key: SessionKey,
    #[source]
    pub cause: ProviderError,
}

impl FetchError {
    pub fn new(key: SessionKey, cause: ProviderError) -> Self {
        Self { key, cause }
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }
}

/// Outcome of a failed warmup task
#[derive(Error, Debug)]
pub enum WarmupError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Warmup of {key} timed out after {}s", .after.as_secs_f64())]
    Timeout { key: SessionKey, after: Duration },

    #[error("Warmup of {key} panicked: {message}")]
    Panicked { key: SessionKey, message: String },
}

impl WarmupError {
    pub fn key(&self) -> &SessionKey {
        match self {
            WarmupError::Fetch(e) => &e.key,
            WarmupError::Timeout { key, .. } | WarmupError::Panicked { key, .. } => key,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WarmupError::Fetch(e) => e.kind(),
            WarmupError::Timeout { .. } => ErrorKind::Timeout,
            WarmupError::Panicked { .. } => ErrorKind::Load,
        }
    }
}

/// Severity level for report entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Non-critical, can continue with degraded functionality
    Warning,
    /// The requested item could not be loaded
    Error,
}

/// User-facing error entry
#[derive(Debug, Clone)]
pub struct LoadError {
    pub source: String,
    pub message: String,
    pub severity: ErrorSeverity,
    /// Actionable suggestion for user (optional)
    pub suggestion: Option<String>,
}

impl LoadError {
    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Warning,
            suggestion: None,
        }
    }

    /// Create user-friendly error from a failed fetch with context-aware suggestions
    pub fn from_fetch_error(error: &FetchError) -> Self {
        let source = error.key.to_string();
        let message = format!("Failed to load session: {}", error.cause);
        let suggestion = match &error.cause {
            ProviderError::UnknownSeason { season } => Some(format!(
                "Check that season {} has a published calendar",
                season
            )),
            ProviderError::UnknownEvent { season, .. } => Some(format!(
                "Run 'pitwall schedule {}' to list event names and rounds",
                season
            )),
            ProviderError::SessionNotHeld { .. } => {
                Some("Pick another session kind for this event".to_string())
            }
            ProviderError::Network { .. } => {
                Some("Check your network connection and try again".to_string())
            }
            ProviderError::HttpStatus { status: 429, .. } => {
                Some("The data source is rate limiting requests; wait a moment".to_string())
            }
            _ => None,
        };

        Self {
            source,
            message,
            severity: ErrorSeverity::Error,
            suggestion,
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Report of errors encountered while aggregating several sessions
///
/// Enables graceful degradation by tracking partial failures
/// instead of failing completely on any error.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub errors: Vec<LoadError>,
    pub sessions_loaded: usize,
    pub sessions_failed: usize,
}

impl LoadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: LoadError) {
        self.errors.push(error);
    }

    /// Returns true if there are any errors (including warnings)
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns only warnings
    pub fn warnings(&self) -> impl Iterator<Item = &LoadError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Warning)
    }
}
