//! HTTP collectors
//!
//! - [`HttpEventCollector`]: Amplitude HTTP API v2 batch shape
//!   (`{"api_key", "events": [...]}`), user properties via `$identify`
//! - [`HttpPixelCollector`]: Conversions API shape (`{"data": [...]}`)

use super::{EventCollector, PixelAction, PixelCollector, TrackedEvent};
use async_trait::async_trait;
use funnel_common::config::{CollectorConfig, PixelConfig};
use funnel_common::{time, uuid_utils, Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("funnel-tracker/", env!("CARGO_PKG_VERSION"));

/// Event type Amplitude uses for user property updates
const IDENTIFY_EVENT: &str = "$identify";

#[derive(Debug, Serialize)]
struct AmplitudeBatch<'a> {
    api_key: &'a str,
    events: Vec<AmplitudeEvent<'a>>,
}

#[derive(Debug, Serialize)]
struct AmplitudeEvent<'a> {
    event_type: &'a str,
    device_id: &'a str,
    time: i64,
    insert_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_properties: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_properties: Option<Value>,
}

pub struct HttpEventCollector {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpEventCollector {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(Error::Config("collector endpoint is empty".to_string()));
        }
        let http_client = build_client(config.timeout_ms)?;
        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post_batch(&self, batch: &AmplitudeBatch<'_>) -> Result<()> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| Error::Collector(format!("network error: {}", e)))?;

        check_status(response).await
    }
}

#[async_trait]
impl EventCollector for HttpEventCollector {
    fn name(&self) -> &'static str {
        "amplitude-http"
    }

    async fn track(&self, event: &TrackedEvent) -> Result<()> {
        let device_id = event.session_id().unwrap_or("unknown");
        let batch = AmplitudeBatch {
            api_key: &self.api_key,
            events: vec![AmplitudeEvent {
                event_type: &event.name,
                device_id,
                time: event.timestamp_millis().unwrap_or_else(time::now_millis),
                insert_id: uuid_utils::generate().to_string(),
                event_properties: Some(&event.properties),
                user_properties: None,
            }],
        };

        debug!(event = %event.name, endpoint = %self.endpoint, "Posting event");
        self.post_batch(&batch).await
    }

    async fn set_user_properties(
        &self,
        device_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<()> {
        let batch = AmplitudeBatch {
            api_key: &self.api_key,
            events: vec![AmplitudeEvent {
                event_type: IDENTIFY_EVENT,
                device_id,
                time: time::now_millis(),
                insert_id: uuid_utils::generate().to_string(),
                event_properties: None,
                user_properties: Some(serde_json::json!({ "$set": properties })),
            }],
        };

        debug!(count = properties.len(), "Posting user properties");
        self.post_batch(&batch).await
    }
}

#[derive(Debug, Serialize)]
struct PixelBatch<'a> {
    data: Vec<PixelEvent<'a>>,
}

#[derive(Debug, Serialize)]
struct PixelEvent<'a> {
    event_name: &'a str,
    event_time: i64,
    event_id: String,
    action_source: &'static str,
    custom_data: &'a Map<String, Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    custom_event: bool,
}

pub struct HttpPixelCollector {
    http_client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

impl HttpPixelCollector {
    pub fn new(config: &PixelConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(Error::Config("pixel endpoint is empty".to_string()));
        }
        Ok(Self {
            http_client: build_client(config.timeout_ms)?,
            endpoint: config.endpoint.clone(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl PixelCollector for HttpPixelCollector {
    fn name(&self) -> &'static str {
        "pixel-http"
    }

    async fn track(
        &self,
        action: PixelAction,
        event_name: &str,
        data: &Map<String, Value>,
    ) -> Result<()> {
        let batch = PixelBatch {
            data: vec![PixelEvent {
                event_name,
                event_time: time::now().timestamp(),
                event_id: uuid_utils::generate().to_string(),
                action_source: "website",
                custom_data: data,
                custom_event: action == PixelAction::TrackCustom,
            }],
        };

        let mut request = self.http_client.post(&self.endpoint).json(&batch);
        if let Some(token) = &self.access_token {
            request = request.query(&[("access_token", token.as_str())]);
        }

        debug!(%action, event = event_name, "Posting pixel event");
        let response = request
            .send()
            .await
            .map_err(|e| Error::Collector(format!("network error: {}", e)))?;

        check_status(response).await
    }
}

fn build_client(timeout_ms: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| Error::Collector(format!("cannot build HTTP client: {}", e)))
}

async fn check_status(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Collector(format!(
        "HTTP {}: {}",
        status.as_u16(),
        body.chars().take(200).collect::<String>()
    )))
}
