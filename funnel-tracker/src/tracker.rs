//! Event tracker
//!
//! Builds decorated analytics events and hands them to the collectors.
//!
//! Every event carries, in layering order (later layers win):
//! 1. Attribution: present UTM/click-id parameters, custom params under `custom_params`
//! 2. Caller-supplied properties
//! 3. Automatic fields: `page_url`, `referrer` (`"direct"` when none),
//!    `screen`, `timestamp` (ms since epoch), `session_id`
//!
//! Context is captured when `track` is called. Dispatch runs on its own task
//! and waits on the collector readiness gate, so events tracked before the
//! collector has loaded are delivered once it has. Nothing here returns an
//! error to the caller: failures are logged and reported through the
//! optional [`DispatchTicket`].

use crate::attribution::Attribution;
use crate::collector::{
    PixelAction, SharedEventCollector, SharedPixelCollector, TrackedEvent,
};
use crate::page::PageContext;
use crate::readiness::{GateWaiter, Readiness};
use crate::session::SessionIdProvider;
use funnel_common::time;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, warn};

/// Currency used for purchase events unless the caller names one
pub const DEFAULT_CURRENCY: &str = "USD";

/// Standard pixel event name for purchases
pub const PURCHASE_EVENT: &str = "Purchase";

/// What happened to one dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The collector accepted the event
    Delivered,
    /// The collector was reached but rejected or failed the call
    Failed,
    /// The collector never became available; the event was discarded
    Dropped,
    /// The caller stopped waiting before an outcome was known
    TimedOut,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Failed => "failed",
            DispatchOutcome::Dropped => "dropped",
            DispatchOutcome::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Handle on a dispatch in flight
///
/// Dropping it is fine: the dispatch carries on regardless.
#[derive(Debug)]
pub struct DispatchTicket {
    event: String,
    rx: oneshot::Receiver<DispatchOutcome>,
}

impl DispatchTicket {
    pub fn event_name(&self) -> &str {
        &self.event
    }

    /// Wait for the outcome, giving up after `timeout`
    pub async fn wait(self, timeout: Duration) -> DispatchOutcome {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => DispatchOutcome::Dropped,
            Err(_) => {
                debug!(event = %self.event, "Stopped waiting for dispatch");
                DispatchOutcome::TimedOut
            }
        }
    }

    /// Wait for the outcome without a deadline
    pub async fn outcome(self) -> DispatchOutcome {
        self.rx.await.unwrap_or(DispatchOutcome::Dropped)
    }

    fn resolved(event: String, outcome: DispatchOutcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { event, rx }
    }
}

/// Count of dispatches that have not reported an outcome yet
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Clone)]
pub struct EventTracker {
    attribution: Arc<Attribution>,
    session: Arc<SessionIdProvider>,
    page: Arc<PageContext>,
    events: GateWaiter<SharedEventCollector>,
    pixel: GateWaiter<SharedPixelCollector>,
    in_flight: Arc<InFlight>,
}

impl EventTracker {
    pub fn new(
        attribution: Arc<Attribution>,
        session: Arc<SessionIdProvider>,
        page: Arc<PageContext>,
        events: GateWaiter<SharedEventCollector>,
        pixel: GateWaiter<SharedPixelCollector>,
    ) -> Self {
        Self {
            attribution,
            session,
            page,
            events,
            pixel,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Number of dispatches still waiting for a collector or a response
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait for every dispatch started so far to finish
    ///
    /// Returns false if `timeout` passed first.
    pub async fn flush(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.in_flight.idle())
            .await
            .is_ok()
    }

    /// Build the decorated event for `name` as of now
    pub fn build_event(&self, name: &str, extra: Option<Map<String, Value>>) -> TrackedEvent {
        let mut properties = self.attribution.snapshot().to_properties();
        if let Some(extra) = extra {
            properties.extend(extra);
        }

        let view = self.page.view();
        properties.insert("page_url".to_string(), Value::String(view.page_url));
        properties.insert("referrer".to_string(), Value::String(view.referrer));
        properties.insert("screen".to_string(), Value::String(view.screen));
        properties.insert("timestamp".to_string(), Value::from(time::now_millis()));
        properties.insert(
            "session_id".to_string(),
            Value::String(self.session.session_id()),
        );

        TrackedEvent {
            name: name.to_string(),
            properties,
        }
    }

    /// Track an event (fire-and-forget)
    pub fn track(&self, name: &str, extra: Option<Map<String, Value>>) -> DispatchTicket {
        let event = self.build_event(name, extra);
        let waiter = self.events.clone();
        let label = event.name.clone();

        self.spawn_dispatch(label, async move {
            let collector = match waiter.wait().await {
                Readiness::Ready(collector) => collector,
                Readiness::Failed(reason) => {
                    warn!(event = %event.name, "Analytics unavailable ({}), event dropped", reason);
                    return DispatchOutcome::Dropped;
                }
            };
            match collector.track(&event).await {
                Ok(()) => {
                    debug!(event = %event.name, collector = collector.name(), "Event delivered");
                    DispatchOutcome::Delivered
                }
                Err(e) => {
                    error!(event = %event.name, "Failed to track event: {}", e);
                    DispatchOutcome::Failed
                }
            }
        })
    }

    /// Send a pixel event with action `track`
    pub fn track_pixel(&self, event_name: &str, data: Option<Map<String, Value>>) -> DispatchTicket {
        self.send_pixel(PixelAction::Track, event_name, data.unwrap_or_default())
    }

    /// Send a pixel event under a custom name
    pub fn track_pixel_custom(
        &self,
        event_name: &str,
        data: Option<Map<String, Value>>,
    ) -> DispatchTicket {
        self.send_pixel(PixelAction::TrackCustom, event_name, data.unwrap_or_default())
    }

    /// Pixel `Purchase` with `{value, currency, ...extra}`; currency defaults to USD
    pub fn track_pixel_purchase(
        &self,
        value: f64,
        currency: Option<&str>,
        extra: Option<Map<String, Value>>,
    ) -> DispatchTicket {
        let mut data = Map::new();
        data.insert("value".to_string(), Value::from(value));
        data.insert(
            "currency".to_string(),
            Value::String(currency.unwrap_or(DEFAULT_CURRENCY).to_string()),
        );
        if let Some(extra) = extra {
            data.extend(extra);
        }
        self.send_pixel(PixelAction::Track, PURCHASE_EVENT, data)
    }

    /// Attach the attribution snapshot to the current device as user properties
    ///
    /// Skipped when there is no attribution.
    pub fn identify(&self) -> DispatchTicket {
        let properties = self.attribution.snapshot().to_properties();
        if properties.is_empty() {
            return DispatchTicket::resolved("$identify".to_string(), DispatchOutcome::Delivered);
        }
        let device_id = self.session.session_id();
        let waiter = self.events.clone();

        self.spawn_dispatch("$identify".to_string(), async move {
            let collector = match waiter.wait().await {
                Readiness::Ready(collector) => collector,
                Readiness::Failed(_) => return DispatchOutcome::Dropped,
            };
            match collector.set_user_properties(&device_id, &properties).await {
                Ok(()) => {
                    debug!(count = properties.len(), "User properties set");
                    DispatchOutcome::Delivered
                }
                Err(e) => {
                    error!("Failed to set user properties: {}", e);
                    DispatchOutcome::Failed
                }
            }
        })
    }

    pub fn session_id(&self) -> String {
        self.session.session_id()
    }

    fn send_pixel(
        &self,
        action: PixelAction,
        event_name: &str,
        data: Map<String, Value>,
    ) -> DispatchTicket {
        let waiter = self.pixel.clone();
        let name = event_name.to_string();

        self.spawn_dispatch(name.clone(), async move {
            let pixel = match waiter.wait().await {
                Readiness::Ready(pixel) => pixel,
                Readiness::Failed(reason) => {
                    warn!(event = %name, "Pixel unavailable ({}), event dropped", reason);
                    return DispatchOutcome::Dropped;
                }
            };
            match pixel.track(action, &name, &data).await {
                Ok(()) => DispatchOutcome::Delivered,
                Err(e) => {
                    error!(event = %name, "Failed to track pixel event: {}", e);
                    DispatchOutcome::Failed
                }
            }
        })
    }

    /// Run a dispatch on the current runtime and report its outcome to the ticket
    fn spawn_dispatch<F>(&self, event: String, dispatch: F) -> DispatchTicket
    where
        F: Future<Output = DispatchOutcome> + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(event = %event, "No async runtime, event dropped");
                return DispatchTicket::resolved(event, DispatchOutcome::Dropped);
            }
        };

        let (tx, rx) = oneshot::channel();
        let in_flight = self.in_flight.clone();
        in_flight.begin();
        handle.spawn(async move {
            let outcome = dispatch.await;
            let _ = tx.send(outcome);
            in_flight.end();
        });
        DispatchTicket { event, rx }
    }
}
