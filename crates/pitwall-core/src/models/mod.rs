//! Data models for pitwall

pub mod bundle;
pub mod session;

pub use bundle::{
    EventInfo, LapTiming, PitStop, ResultRow, SessionBundle, TelemetrySample, WeatherSample,
};
pub use session::{EventId, LoadOptions, SessionKey, SessionKind};
