//! Shared collaborators handed to every engine.

use std::sync::Arc;

use engage_core::{Clock, EngagementEvent, SystemClock, Timestamp};
use engage_settings::EngageSettings;
use engage_store::Store;

use crate::error::Result;
use crate::sink::{EventSink, TracingSink};

/// Store, settings, clock and event sink. Cloning shares all four.
#[derive(Clone, Debug)]
pub struct EngineContext {
    pub store: Store,
    pub settings: Arc<EngageSettings>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn EventSink>,
}

impl EngineContext {
    /// Default settings, the system clock and a [`TracingSink`].
    pub fn new(store: Store) -> Self {
        Self {
            store,
            settings: Arc::new(EngageSettings::default()),
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngageSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn emit(&self, event: &EngagementEvent) -> Result<()> {
        self.sink.emit(event)?;
        Ok(())
    }
}
