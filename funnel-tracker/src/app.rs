//! Application root
//!
//! [`FunnelApp::start`] wires one visit together in a fixed order:
//! 1. Attribution is reconciled from the entry URL and storage, before any
//!    event can be tracked
//! 2. The tracker is created against two readiness gates
//! 3. A loader task builds the collectors and resolves the gates, then the
//!    attribution snapshot is attached to the device as user properties
//!
//! Events tracked while step 3 is still running wait on the gates.

use crate::answers::AnswerStore;
use crate::attribution::{Attribution, AttributionSnapshot, AttributionStore};
use crate::collector::{
    HttpEventCollector, HttpPixelCollector, RecordingEventCollector, RecordingPixelCollector,
    SharedEventCollector, SharedPixelCollector,
};
use crate::funnel::FunnelNavigator;
use crate::page::PageContext;
use crate::params::parse_url;
use crate::readiness::{Readiness, ReadinessGate};
use crate::session::SessionIdProvider;
use crate::tracker::EventTracker;
use funnel_common::config::{RootFolderInitializer, TimingConfig, TomlConfig};
use funnel_common::{JsonFileStore, KeyValueStore, MemoryStore, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Durable and session-scoped storage for one visit
#[derive(Clone)]
pub struct FunnelStores {
    /// Survives across sessions (attribution)
    pub durable: Arc<dyn KeyValueStore>,
    /// Lives for one browsing session (session id)
    pub session: Arc<dyn KeyValueStore>,
}

impl FunnelStores {
    pub fn in_memory() -> Self {
        Self {
            durable: Arc::new(MemoryStore::new()),
            session: Arc::new(MemoryStore::new()),
        }
    }

    /// JSON files under the root folder, created if missing
    pub fn open(initializer: &RootFolderInitializer) -> Result<Self> {
        initializer.ensure_directory_exists()?;
        Ok(Self {
            durable: Arc::new(JsonFileStore::new(initializer.attribution_path())),
            session: Arc::new(JsonFileStore::new(initializer.session_path())),
        })
    }
}

/// Where the collectors come from
#[derive(Clone)]
pub enum CollectorSource {
    /// HTTP collectors built from the `collector` and `pixel` config sections
    Configured,
    /// In-memory recording collectors
    Recording(Arc<RecordingEventCollector>, Arc<RecordingPixelCollector>),
    /// Gates stay pending until opened through [`FunnelApp::gates`]
    Deferred,
}

impl CollectorSource {
    pub fn recording() -> Self {
        CollectorSource::Recording(
            Arc::new(RecordingEventCollector::new()),
            Arc::new(RecordingPixelCollector::new()),
        )
    }
}

/// Readiness gates for both collectors
#[derive(Default)]
pub struct CollectorGates {
    pub events: ReadinessGate<SharedEventCollector>,
    pub pixel: ReadinessGate<SharedPixelCollector>,
}

/// Which collectors ended up available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorStatus {
    pub events: bool,
    pub pixel: bool,
}

pub struct FunnelApp {
    attribution: Arc<Attribution>,
    answers: Arc<AnswerStore>,
    session: Arc<SessionIdProvider>,
    page: Arc<PageContext>,
    tracker: EventTracker,
    gates: Arc<CollectorGates>,
    timing: TimingConfig,
}

impl FunnelApp {
    /// Start a visit at `url`
    pub async fn start(
        config: &TomlConfig,
        stores: FunnelStores,
        source: CollectorSource,
        url: &str,
        referrer: Option<&str>,
    ) -> Result<Self> {
        let attribution = Arc::new(Attribution::new(AttributionStore::new(stores.durable)));
        attribution.initialize(&parse_url(url))?;

        let session = Arc::new(SessionIdProvider::new(stores.session));
        let page = Arc::new(PageContext::new(url, referrer));
        let gates = Arc::new(CollectorGates::default());

        let tracker = EventTracker::new(
            attribution.clone(),
            session.clone(),
            page.clone(),
            gates.events.waiter(),
            gates.pixel.waiter(),
        );

        match source {
            CollectorSource::Configured => {
                let loader_gates = gates.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    load_collectors(&config, &loader_gates);
                });
            }
            CollectorSource::Recording(events, pixel) => {
                gates.events.open(events);
                gates.pixel.open(pixel);
                info!("Using recording collectors");
            }
            CollectorSource::Deferred => {}
        }

        // Waits on the events gate; dropped if analytics never loads
        tracker.identify();

        info!(session_id = %session.session_id(), screen = %page.path(), "Funnel started");

        Ok(Self {
            attribution,
            answers: Arc::new(AnswerStore::new()),
            session,
            page,
            tracker,
            gates,
            timing: config.timing.clone(),
        })
    }

    /// Wait until both gates are resolved
    pub async fn collectors_ready(&self) -> CollectorStatus {
        let (events, pixel) = tokio::join!(
            self.gates.events.waiter().wait(),
            self.gates.pixel.waiter().wait()
        );
        CollectorStatus {
            events: matches!(events, Readiness::Ready(_)),
            pixel: matches!(pixel, Readiness::Ready(_)),
        }
    }

    /// Navigator for this visit, positioned on the entry route
    pub fn navigator(&self) -> FunnelNavigator {
        FunnelNavigator::new(
            self.tracker.clone(),
            self.answers.clone(),
            self.page.clone(),
            self.timing.clone(),
        )
    }

    pub fn snapshot(&self) -> AttributionSnapshot {
        self.attribution.snapshot()
    }

    /// Explicit reset: forget stored attribution and the visit's answers
    pub fn reset(&self) -> Result<()> {
        self.attribution.reset()?;
        self.answers.reset();
        Ok(())
    }

    pub fn attribution(&self) -> &Arc<Attribution> {
        &self.attribution
    }

    pub fn answers(&self) -> &Arc<AnswerStore> {
        &self.answers
    }

    pub fn session_id(&self) -> String {
        self.session.session_id()
    }

    pub fn page(&self) -> &Arc<PageContext> {
        &self.page
    }

    pub fn tracker(&self) -> &EventTracker {
        &self.tracker
    }

    pub fn gates(&self) -> &CollectorGates {
        &self.gates
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }
}

/// Build HTTP collectors and resolve the gates; no retry on failure
fn load_collectors(config: &TomlConfig, gates: &CollectorGates) {
    match &config.collector {
        Some(settings) => match HttpEventCollector::new(settings) {
            Ok(collector) => {
                info!(endpoint = %settings.endpoint, "Analytics collector ready");
                gates.events.open(Arc::new(collector));
            }
            Err(e) => {
                warn!("Analytics collector failed to load: {}", e);
                gates.events.fail(e.to_string());
            }
        },
        None => {
            warn!("No collector configured, analytics disabled");
            gates.events.fail("analytics disabled");
        }
    }

    match &config.pixel {
        Some(settings) => match HttpPixelCollector::new(settings) {
            Ok(pixel) => {
                info!(endpoint = %settings.endpoint, "Pixel collector ready");
                gates.pixel.open(Arc::new(pixel));
            }
            Err(e) => {
                warn!("Pixel collector failed to load: {}", e);
                gates.pixel.fail(e.to_string());
            }
        },
        None => {
            warn!("No pixel configured, pixel events disabled");
            gates.pixel.fail("pixel disabled");
        }
    }
}
