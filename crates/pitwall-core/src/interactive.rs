//! Interactive query path
//!
//! Loads the session the user picked and keeps it as the "loaded" one, so
//! repeating the same request redraws without going back to the provider.
//! Warmup runs independently; both meet only in the provider cache.

use crate::error::LoadError;
use crate::event::{DashboardEvent, EventBus};
use crate::fetch::SessionFetcher;
use crate::models::{EventId, LoadOptions, SessionBundle, SessionKey, SessionKind};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// What the user picked
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    pub season: i32,
    pub event: EventId,
    pub kind: SessionKind,
}

impl Selection {
    pub fn new(season: i32, event: impl Into<EventId>, kind: SessionKind) -> Self {
        Self {
            season,
            event: event.into(),
            kind,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.season, self.event.clone(), self.kind)
    }
}

#[derive(Debug, Clone)]
struct LoadedSession {
    selection: Selection,
    options: LoadOptions,
    bundle: Arc<SessionBundle>,
}

pub struct InteractiveLoader {
    fetcher: SessionFetcher,
    loaded: RwLock<Option<LoadedSession>>,
    events: EventBus,
}

impl InteractiveLoader {
    pub fn new(fetcher: SessionFetcher) -> Self {
        Self {
            fetcher,
            loaded: RwLock::new(None),
            events: EventBus::default_capacity(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Load a selection, reusing the loaded bundle when it already covers the request
    ///
    /// On failure the previously loaded session stays in place.
    pub async fn load_selection(
        &self,
        selection: &Selection,
        options: LoadOptions,
    ) -> Result<Arc<SessionBundle>, LoadError> {
        if let Some(bundle) = self.reusable(selection, options) {
            debug!(key = %selection.key(), "Session already loaded");
            return Ok(bundle);
        }

        let key = selection.key();
        match self.fetcher.fetch(&key, options).await {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                *self.loaded.write() = Some(LoadedSession {
                    selection: selection.clone(),
                    options,
                    bundle: bundle.clone(),
                });
                info!(key = %key, rows = bundle.results.len(), "Session loaded");
                self.events.publish(DashboardEvent::SessionLoaded(key));
                Ok(bundle)
            }
            Err(e) => {
                let error = LoadError::from_fetch_error(&e);
                info!(key = %key, error = %e, "Session load failed");
                self.events.publish(DashboardEvent::SessionLoadFailed {
                    key,
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    fn reusable(&self, selection: &Selection, options: LoadOptions) -> Option<Arc<SessionBundle>> {
        let guard = self.loaded.read();
        guard
            .as_ref()
            .filter(|l| l.selection == *selection && l.options.covers(&options))
            .map(|l| l.bundle.clone())
    }

    /// The loaded bundle, if it belongs to `selection`
    pub fn current(&self, selection: &Selection) -> Option<Arc<SessionBundle>> {
        self.loaded
            .read()
            .as_ref()
            .filter(|l| l.selection == *selection)
            .map(|l| l.bundle.clone())
    }

    pub fn is_loaded(&self, selection: &Selection) -> bool {
        self.current(selection).is_some()
    }

    /// Selection of the loaded session
    pub fn loaded_selection(&self) -> Option<Selection> {
        self.loaded.read().as_ref().map(|l| l.selection.clone())
    }

    /// Forget the loaded session
    pub fn reset(&self) {
        *self.loaded.write() = None;
    }
}
