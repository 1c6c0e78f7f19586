//! Analytics collectors
//!
//! The tracker talks to two external collectors through these traits:
//! - [`EventCollector`]: product analytics ingestion (`track`, `setUserProperties`)
//! - [`PixelCollector`]: ad-pixel milestones (`track(action, eventName, data)`)
//!
//! Implementations:
//! - [`http`]: reqwest clients for the HTTP ingestion APIs
//! - [`memory`]: recording collectors for tests and dry runs

pub mod http;
pub mod memory;

use async_trait::async_trait;
use funnel_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub use http::{HttpEventCollector, HttpPixelCollector};
pub use memory::{PixelCall, RecordingEventCollector, RecordingPixelCollector};

/// Fully decorated analytics event, built per `track` call and never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub name: String,
    pub properties: Map<String, Value>,
}

impl TrackedEvent {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// `session_id` property, when present
    pub fn session_id(&self) -> Option<&str> {
        self.properties.get("session_id").and_then(Value::as_str)
    }

    /// `timestamp` property (ms since epoch), when present
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.properties.get("timestamp").and_then(Value::as_i64)
    }
}

/// Product analytics ingestion
#[async_trait]
pub trait EventCollector: Send + Sync {
    /// Collector identifier for logs
    fn name(&self) -> &'static str;

    /// Ingest one event
    async fn track(&self, event: &TrackedEvent) -> Result<()>;

    /// Attach properties to the user/device identified by `device_id`
    async fn set_user_properties(
        &self,
        device_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<()>;
}

/// Pixel call action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PixelAction {
    /// Standard event (`Purchase`, `Lead`, `CompleteRegistration`, ...)
    Track,
    /// Custom event name
    TrackCustom,
}

impl fmt::Display for PixelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelAction::Track => f.write_str("track"),
            PixelAction::TrackCustom => f.write_str("trackCustom"),
        }
    }
}

/// Ad-pixel milestone ingestion
#[async_trait]
pub trait PixelCollector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn track(
        &self,
        action: PixelAction,
        event_name: &str,
        data: &Map<String, Value>,
    ) -> Result<()>;
}

/// Shared event collector handle
pub type SharedEventCollector = Arc<dyn EventCollector>;

/// Shared pixel collector handle
pub type SharedPixelCollector = Arc<dyn PixelCollector>;
