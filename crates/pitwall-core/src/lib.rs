//! pitwall-core - Core library for pitwall
//!
//! Session provider, persistent cache, background warmup and the interactive
//! fetch path for Formula 1 session data.

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod fetch;
pub mod interactive;
pub mod models;
pub mod provider;
pub mod standings;
pub mod store;
pub mod warmup;

pub use config::DashboardConfig;
pub use error::{ErrorKind, FetchError, LoadError, LoadReport, ProviderError, WarmupError};
pub use event::{DashboardEvent, EventBus};
pub use fetch::SessionFetcher;
pub use interactive::{InteractiveLoader, Selection};
pub use models::{EventId, LoadOptions, SessionBundle, SessionKey, SessionKind};
pub use provider::{SessionDataProvider, SessionHandle};
pub use standings::{StandingRow, Standings};
pub use store::DashboardStore;
pub use warmup::{WarmupHandle, WarmupProgress, WarmupReport, WarmupScheduler};
