//! Remote source of timing data, queried on cache misses

use crate::error::ProviderError;
use crate::models::{
    EventInfo, LapTiming, PitStop, ResultRow, SessionKind, TelemetrySample, WeatherSample,
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Calendar of a season; empty when the season is unknown
    async fn schedule(&self, season: i32) -> Result<Vec<EventInfo>, ProviderError>;

    /// Classification of a session
    async fn results(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Vec<ResultRow>, ProviderError>;

    async fn laps(&self, event: &EventInfo, kind: SessionKind)
        -> Result<Vec<LapTiming>, ProviderError>;

    async fn pit_stops(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Vec<PitStop>, ProviderError>;

    /// Car telemetry; `None` when the source does not publish it
    async fn telemetry(
        &self,
        _event: &EventInfo,
        _kind: SessionKind,
    ) -> Result<Option<Vec<TelemetrySample>>, ProviderError> {
        Ok(None)
    }

    /// Weather samples; `None` when the source does not publish them
    async fn weather(
        &self,
        _event: &EventInfo,
        _kind: SessionKind,
    ) -> Result<Option<Vec<WeatherSample>>, ProviderError> {
        Ok(None)
    }
}

#[async_trait]
impl<R: RemoteSource + ?Sized> RemoteSource for Arc<R> {
    async fn schedule(&self, season: i32) -> Result<Vec<EventInfo>, ProviderError> {
        (**self).schedule(season).await
    }

    async fn results(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Vec<ResultRow>, ProviderError> {
        (**self).results(event, kind).await
    }

    async fn laps(&self, event: &EventInfo, kind: SessionKind)
        -> Result<Vec<LapTiming>, ProviderError> {
        (**self).laps(event, kind).await
    }

    async fn pit_stops(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Vec<PitStop>, ProviderError> {
        (**self).pit_stops(event, kind).await
    }

    async fn telemetry(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Option<Vec<TelemetrySample>>, ProviderError> {
        (**self).telemetry(event, kind).await
    }

    async fn weather(
        &self,
        event: &EventInfo,
        kind: SessionKind,
    ) -> Result<Option<Vec<WeatherSample>>, ProviderError> {
        (**self).weather(event, kind).await
    }
}
