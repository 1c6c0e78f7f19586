//! Recording collectors
//!
//! Keep every call in memory instead of sending it anywhere. Used by tests
//! and by the CLI's `--dry-run` mode. Either collector can be switched into
//! a failing mode to exercise error paths.

use super::{EventCollector, PixelAction, PixelCollector, TrackedEvent};
use async_trait::async_trait;
use funnel_common::{Error, Result};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct RecordingEventCollector {
    events: Mutex<Vec<TrackedEvent>>,
    user_properties: Mutex<Vec<(String, Map<String, Value>)>>,
    failing: AtomicBool,
    recorded: Notify,
}

impl RecordingEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<TrackedEvent> {
        lock(&self.events).clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        lock(&self.events).iter().map(|e| e.name.clone()).collect()
    }

    /// Most recent event with `name`
    pub fn last_named(&self, name: &str) -> Option<TrackedEvent> {
        lock(&self.events).iter().rev().find(|e| e.name == name).cloned()
    }

    pub fn user_properties(&self) -> Vec<(String, Map<String, Value>)> {
        lock(&self.user_properties).clone()
    }

    /// Wait until at least `count` events have been recorded
    pub async fn wait_for_events(&self, count: usize) {
        loop {
            let notified = self.recorded.notified();
            if lock(&self.events).len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Collector("recording collector set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventCollector for RecordingEventCollector {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn track(&self, event: &TrackedEvent) -> Result<()> {
        self.check()?;
        lock(&self.events).push(event.clone());
        self.recorded.notify_waiters();
        Ok(())
    }

    async fn set_user_properties(
        &self,
        device_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<()> {
        self.check()?;
        lock(&self.user_properties).push((device_id.to_string(), properties.clone()));
        Ok(())
    }
}

/// One recorded pixel call
#[derive(Debug, Clone, PartialEq)]
pub struct PixelCall {
    pub action: PixelAction,
    pub event_name: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct RecordingPixelCollector {
    calls: Mutex<Vec<PixelCall>>,
    failing: AtomicBool,
}

impl RecordingPixelCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PixelCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PixelCollector for RecordingPixelCollector {
    fn name(&self) -> &'static str {
        "recording-pixel"
    }

    async fn track(
        &self,
        action: PixelAction,
        event_name: &str,
        data: &Map<String, Value>,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Collector("recording pixel set to fail".to_string()));
        }
        lock(&self.calls).push(PixelCall {
            action,
            event_name: event_name.to_string(),
            data: data.clone(),
        });
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn event(name: &str) -> TrackedEvent {
        TrackedEvent {
            name: name.to_string(),
            properties: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_records_events_in_order() {
        let collector = RecordingEventCollector::new();
        collector.track(&event("a")).await.unwrap();
        collector.track(&event("b")).await.unwrap();
        assert_eq!(collector.event_names(), vec!["a", "b"]);
        assert_eq!(collector.last_named("a").unwrap().name, "a");
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let collector = RecordingEventCollector::new();
        collector.set_failing(true);
        assert!(collector.track(&event("a")).await.is_err());
        assert!(collector.events().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_events_wakes_on_record() {
        let collector = Arc::new(RecordingEventCollector::new());
        let waiter = {
            let collector = collector.clone();
            tokio::spawn(async move { collector.wait_for_events(1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        collector.track(&event("x")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_pixel_records_calls() {
        let pixel = RecordingPixelCollector::new();
        pixel
            .track(PixelAction::Track, "Purchase", &Map::new())
            .await
            .unwrap();
        assert_eq!(pixel.calls()[0].event_name, "Purchase");
        assert_eq!(PixelAction::TrackCustom.to_string(), "trackCustom");
    }
}
