//! HTTP collectors against a mock ingestion server
//!
//! Tests cover:
//! - Event batch and `$identify` payload shapes
//! - Pixel payloads with the access token query parameter
//! - Non-2xx responses surface as collector errors
//! - A configured funnel delivering through the HTTP collectors end to end

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use funnel_common::config::{CollectorConfig, PixelConfig, TomlConfig};
use funnel_common::Error;
use funnel_tracker::collector::{
    EventCollector, HttpEventCollector, HttpPixelCollector, PixelAction, PixelCollector,
    TrackedEvent,
};
use funnel_tracker::{CollectorSource, DispatchOutcome, FunnelApp, FunnelStores};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Received {
    path: &'static str,
    query: HashMap<String, String>,
    body: Value,
}

#[derive(Clone, Default)]
struct MockState {
    received: Arc<Mutex<Vec<Received>>>,
}

impl MockState {
    fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    fn record(&self, path: &'static str, query: HashMap<String, String>, body: Value) {
        self.received
            .lock()
            .unwrap()
            .push(Received { path, query, body });
    }
}

async fn ingest_events(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("/events", query, body);
    Json(json!({ "code": 200 }))
}

async fn ingest_pixel(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("/pixel", query, body);
    Json(json!({ "events_received": 1 }))
}

async fn reject() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "ingestion unavailable")
}

/// Test helper: start the mock server, returning its base URL
async fn start_mock() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/events", post(ingest_events))
        .route("/pixel", post(ingest_pixel))
        .route("/fail", post(reject))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Should bind mock server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn collector_config(base: &str, path: &str) -> CollectorConfig {
    CollectorConfig {
        endpoint: format!("{}{}", base, path),
        api_key: "test-key".to_string(),
        timeout_ms: 2000,
    }
}

fn pixel_config(base: &str, token: Option<&str>) -> PixelConfig {
    PixelConfig {
        endpoint: format!("{}/pixel", base),
        access_token: token.map(str::to_string),
        timeout_ms: 2000,
    }
}

fn sample_event() -> TrackedEvent {
    let mut properties = Map::new();
    properties.insert("screen".to_string(), json!("/quiz3"));
    properties.insert("session_id".to_string(), json!("session-1"));
    properties.insert("timestamp".to_string(), json!(1_700_000_000_000i64));
    properties.insert("utm_source".to_string(), json!("fb"));
    TrackedEvent {
        name: "view_question_3".to_string(),
        properties,
    }
}

// =============================================================================
// Event collector
// =============================================================================

#[tokio::test]
async fn test_event_batch_shape() {
    let (base, mock) = start_mock().await;
    let collector = HttpEventCollector::new(&collector_config(&base, "/events")).unwrap();

    collector.track(&sample_event()).await.unwrap();

    let received = mock.received();
    assert_eq!(received.len(), 1);
    let body = &received[0].body;
    assert_eq!(body["api_key"], "test-key");
    let event = &body["events"][0];
    assert_eq!(event["event_type"], "view_question_3");
    assert_eq!(event["device_id"], "session-1");
    assert_eq!(event["time"], 1_700_000_000_000i64);
    assert_eq!(event["event_properties"]["utm_source"], "fb");
    assert!(event["insert_id"].as_str().is_some());
}

#[tokio::test]
async fn test_identify_sets_user_properties() {
    let (base, mock) = start_mock().await;
    let collector = HttpEventCollector::new(&collector_config(&base, "/events")).unwrap();

    let mut props = Map::new();
    props.insert("gclid".to_string(), json!("g-1"));
    collector.set_user_properties("device-9", &props).await.unwrap();

    let event = &mock.received()[0].body["events"][0];
    assert_eq!(event["event_type"], "$identify");
    assert_eq!(event["device_id"], "device-9");
    assert_eq!(event["user_properties"]["$set"]["gclid"], "g-1");
    assert!(event.get("event_properties").is_none());
}

#[tokio::test]
async fn test_server_error_is_collector_error() {
    let (base, _mock) = start_mock().await;
    let collector = HttpEventCollector::new(&collector_config(&base, "/fail")).unwrap();

    match collector.track(&sample_event()).await {
        Err(Error::Collector(message)) => {
            assert!(message.contains("500"), "{}", message);
            assert!(message.contains("ingestion unavailable"), "{}", message);
        }
        other => panic!("expected collector error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_collector_error() {
    let config = CollectorConfig {
        endpoint: "http://127.0.0.1:9/events".to_string(),
        api_key: "k".to_string(),
        timeout_ms: 500,
    };
    let collector = HttpEventCollector::new(&config).unwrap();
    assert!(matches!(
        collector.track(&sample_event()).await,
        Err(Error::Collector(_))
    ));
}

// =============================================================================
// Pixel collector
// =============================================================================

#[tokio::test]
async fn test_pixel_payload_and_token() {
    let (base, mock) = start_mock().await;
    let pixel = HttpPixelCollector::new(&pixel_config(&base, Some("tok"))).unwrap();

    let mut data = Map::new();
    data.insert("value".to_string(), json!(24.99));
    data.insert("currency".to_string(), json!("USD"));
    pixel
        .track(PixelAction::Track, "Purchase", &data)
        .await
        .unwrap();
    pixel
        .track(PixelAction::TrackCustom, "QuizDone", &Map::new())
        .await
        .unwrap();

    let received = mock.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].path, "/pixel");
    assert_eq!(received[0].query.get("access_token").map(String::as_str), Some("tok"));

    let purchase = &received[0].body["data"][0];
    assert_eq!(purchase["event_name"], "Purchase");
    assert_eq!(purchase["action_source"], "website");
    assert_eq!(purchase["custom_data"]["value"], 24.99);
    assert!(purchase.get("custom_event").is_none());

    assert_eq!(received[1].body["data"][0]["custom_event"], true);
}

#[tokio::test]
async fn test_pixel_without_token() {
    let (base, mock) = start_mock().await;
    let pixel = HttpPixelCollector::new(&pixel_config(&base, None)).unwrap();
    pixel
        .track(PixelAction::Track, "CompleteRegistration", &Map::new())
        .await
        .unwrap();
    assert!(mock.received()[0].query.is_empty());
}

// =============================================================================
// Configured funnel
// =============================================================================

#[tokio::test]
async fn test_configured_funnel_delivers_over_http() {
    let (base, mock) = start_mock().await;
    let config = TomlConfig {
        collector: Some(collector_config(&base, "/events")),
        pixel: Some(pixel_config(&base, None)),
        ..TomlConfig::default()
    };

    let app = FunnelApp::start(
        &config,
        FunnelStores::in_memory(),
        CollectorSource::Configured,
        "https://funnel.example/?utm_source=fb&ref=abc#/start",
        Some("https://google.com/"),
    )
    .await
    .unwrap();

    // Tracked before the loader task has necessarily run
    let ticket = app.tracker().track("view_start_screen", None);
    assert_eq!(
        ticket.wait(Duration::from_secs(5)).await,
        DispatchOutcome::Delivered
    );
    app.tracker()
        .track_pixel_purchase(13.49, None, None)
        .wait(Duration::from_secs(5))
        .await;
    assert!(app.tracker().flush(Duration::from_secs(5)).await);

    let received = mock.received();
    let events: Vec<&Value> = received
        .iter()
        .filter(|r| r.path == "/events")
        .map(|r| &r.body["events"][0])
        .collect();
    assert_eq!(events.len(), 2);

    let identify = events
        .iter()
        .find(|e| e["event_type"] == "$identify")
        .expect("identify should be sent");
    assert_eq!(identify["user_properties"]["$set"]["utm_source"], "fb");
    assert_eq!(identify["device_id"], app.session_id().as_str());

    let view = events
        .iter()
        .find(|e| e["event_type"] == "view_start_screen")
        .unwrap();
    let props = &view["event_properties"];
    assert_eq!(props["utm_source"], "fb");
    assert_eq!(props["custom_params"]["ref"], "abc");
    assert_eq!(props["referrer"], "https://google.com/");
    assert_eq!(props["screen"], "/start");

    let pixel = received.iter().find(|r| r.path == "/pixel").unwrap();
    assert_eq!(pixel.body["data"][0]["custom_data"]["currency"], "USD");
}
