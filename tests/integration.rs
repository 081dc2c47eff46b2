use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use order_tracker::api::rest::router;
use order_tracker::channel::ChannelEvent;
use order_tracker::channel::hub::LocationHub;
use order_tracker::error::RoutingError;
use order_tracker::map::scene::{SceneOp, SceneSnapshot};
use order_tracker::map::surface::{DRIVER_LABEL, DROPOFF_LABEL, PICKUP_LABEL};
use order_tracker::models::coordinate::Coordinate;
use order_tracker::models::order::Order;
use order_tracker::observability::metrics::Metrics;
use order_tracker::routing::straight::StraightLineEngine;
use order_tracker::routing::{Route, RouteEngine};
use order_tracker::state::AppState;
use order_tracker::tracking::session::TeardownStep;
use order_tracker::tracking::view::{TrackingDeps, TrackingSettings, TrackingView, ViewState};
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;

const PICKUP: Coordinate = Coordinate {
    lat: 28.61,
    lng: 77.21,
};
const DROPOFF: Coordinate = Coordinate {
    lat: 28.65,
    lng: 77.23,
};

/// Straight-line routing that remembers every waypoint list it was asked for.
#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<Vec<Coordinate>>>,
}

impl RecordingEngine {
    fn calls(&self) -> Vec<Vec<Coordinate>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouteEngine for RecordingEngine {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn route(&self, waypoints: &[Coordinate]) -> Result<Route, RoutingError> {
        self.calls.lock().unwrap().push(waypoints.to_vec());
        StraightLineEngine::new(4).plot(waypoints)
    }
}

fn order_json(partner: Value) -> Value {
    json!({
        "_id": "42",
        "pickupLocation": { "type": "Point", "coordinates": [77.21, 28.61] },
        "dropoffLocation": { "type": "Point", "coordinates": [77.23, 28.65] },
        "status": "accepted",
        "deliveryPartner": partner
    })
}

fn order(partner: Value) -> Order {
    serde_json::from_value(order_json(partner)).unwrap()
}

fn deps(hub: Arc<LocationHub>, engine: Arc<dyn RouteEngine>, metrics: Metrics) -> TrackingDeps {
    TrackingDeps {
        transport: hub,
        engine,
        metrics,
        settings: TrackingSettings::default(),
    }
}

fn driver_location(lat: f64, lng: f64) -> ChannelEvent {
    ChannelEvent::new("driverLocation", json!({ "lat": lat, "lng": lng }))
}

async fn wait_for_listener(hub: &LocationHub, driver_id: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.listeners(driver_id) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber never joined the driver room");
}

async fn wait_for_scene(
    scene: &mut watch::Receiver<SceneSnapshot>,
    pred: impl FnMut(&SceneSnapshot) -> bool,
) -> SceneSnapshot {
    let snapshot = tokio::time::timeout(Duration::from_secs(2), scene.wait_for(pred))
        .await
        .expect("scene condition not reached")
        .expect("scene closed");
    snapshot.clone()
}

/// Replays the journal and fails if two route layers were ever on the map together.
fn assert_single_overlay(journal: impl IntoIterator<Item = SceneOp>) {
    let mut routes = HashSet::new();
    for op in journal {
        match op {
            SceneOp::RouteAdded { layer, .. } => {
                routes.insert(layer);
                assert!(routes.len() <= 1, "two route overlays coexisted");
            }
            SceneOp::LayerRemoved { layer } => {
                routes.remove(&layer);
            }
            _ => {}
        }
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        TrackingSettings::default(),
        Arc::new(StraightLineEngine::default()),
        None,
    ));
    (router(state.clone()), state)
}

#[tokio::test]
async fn driver_update_moves_marker_and_rebuilds_route_once() {
    let hub = Arc::new(LocationHub::new(64));
    let engine = Arc::new(RecordingEngine::default());
    let mut view = TrackingView::open(
        deps(hub.clone(), engine.clone(), Metrics::new()),
        order(json!("driverA")),
    );
    assert_eq!(view.state(), ViewState::Active);

    let mut scene = view.session().unwrap().scene();
    let mounted = wait_for_scene(&mut scene, |s| s.routes().len() == 1).await;
    assert_eq!(mounted.marker(PICKUP_LABEL), Some(PICKUP));
    assert_eq!(mounted.marker(DROPOFF_LABEL), Some(DROPOFF));
    assert_eq!(mounted.marker(DRIVER_LABEL), Some(Coordinate::PLACEHOLDER));
    assert_eq!(mounted.markers().count(), 3);

    wait_for_listener(&hub, "driverA").await;
    hub.publish("driverA", driver_location(28.62, 77.22));

    let driver = Coordinate {
        lat: 28.62,
        lng: 77.22,
    };
    let updated = wait_for_scene(&mut scene, |s| {
        s.marker(DRIVER_LABEL) == Some(driver) && s.routes().iter().any(|r| r[0] == driver)
    })
    .await;
    assert_eq!(updated.routes().len(), 1);

    let rebuilds: Vec<_> = engine
        .calls()
        .into_iter()
        .filter(|waypoints| waypoints.len() == 3)
        .collect();
    assert_eq!(rebuilds, vec![vec![driver, PICKUP, DROPOFF]]);
    assert_single_overlay(updated.journal.clone());

    view.unmount().await;
}

#[tokio::test]
async fn last_position_wins() {
    let hub = Arc::new(LocationHub::new(64));
    let mut view = TrackingView::open(
        deps(
            hub.clone(),
            Arc::new(StraightLineEngine::new(4)),
            Metrics::new(),
        ),
        order(json!({ "_id": "driverA", "name": "Asha" })),
    );
    let mut scene = view.session().unwrap().scene();
    wait_for_listener(&hub, "driverA").await;

    let positions = [(28.62, 77.22), (28.60, 77.20), (28.63, 77.19), (28.64, 77.25)];
    for (lat, lng) in positions {
        hub.publish("driverA", driver_location(lat, lng));
    }

    let last = Coordinate {
        lat: 28.64,
        lng: 77.25,
    };
    let settled = wait_for_scene(&mut scene, |s| {
        s.marker(DRIVER_LABEL) == Some(last) && s.routes().iter().any(|r| r[0] == last)
    })
    .await;
    assert_single_overlay(settled.journal.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scene.borrow().marker(DRIVER_LABEL), Some(last));

    view.unmount().await;
}

#[tokio::test]
async fn unmount_stops_all_mutation() {
    let hub = Arc::new(LocationHub::new(64));
    let metrics = Metrics::new();
    let mut view = TrackingView::open(
        deps(
            hub.clone(),
            Arc::new(StraightLineEngine::new(4)),
            metrics.clone(),
        ),
        order(json!("driverA")),
    );
    let mut scene = view.session().unwrap().scene();
    wait_for_listener(&hub, "driverA").await;

    let steps = view.unmount().await;
    assert_eq!(steps.first(), Some(&TeardownStep::ChannelClosed));
    assert_eq!(steps.last(), Some(&TeardownStep::MapReleased));
    assert_eq!(view.state(), ViewState::Unmounted);

    let released = wait_for_scene(&mut scene, |s| s.released).await;
    assert!(released.layers.is_empty());

    hub.publish("driverA", driver_location(28.62, 77.22));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = scene.borrow().clone();
    assert_eq!(after.revision, released.revision);
    assert!(after.layers.is_empty());
    assert_eq!(
        metrics
            .position_events_total
            .with_label_values(&["applied"])
            .get(),
        0
    );
    assert_eq!(metrics.tracking_sessions_active.get(), 0);
}

#[tokio::test]
async fn unassigned_order_keeps_placeholder_marker() {
    let hub = Arc::new(LocationHub::new(64));
    let mut view = TrackingView::open(
        deps(
            hub.clone(),
            Arc::new(StraightLineEngine::new(4)),
            Metrics::new(),
        ),
        order(Value::Null),
    );
    let session = view.session().unwrap();
    assert!(!session.is_subscribed());

    let mut scene = session.scene();
    let drawn = wait_for_scene(&mut scene, |s| s.routes().len() == 1).await;
    assert_eq!(drawn.routes()[0].first(), Some(&PICKUP));
    assert_eq!(drawn.routes()[0].last(), Some(&DROPOFF));

    hub.publish("driverA", driver_location(28.62, 77.22));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        scene.borrow().marker(DRIVER_LABEL),
        Some(Coordinate::PLACEHOLDER)
    );

    let steps = view.unmount().await;
    assert!(!steps.contains(&TeardownStep::ChannelClosed));
}

#[tokio::test]
async fn malformed_payload_leaves_marker_in_place() {
    let hub = Arc::new(LocationHub::new(64));
    let metrics = Metrics::new();
    let mut view = TrackingView::open(
        deps(
            hub.clone(),
            Arc::new(StraightLineEngine::new(4)),
            metrics.clone(),
        ),
        order(json!("driverA")),
    );
    let mut scene = view.session().unwrap().scene();
    wait_for_listener(&hub, "driverA").await;

    hub.publish(
        "driverA",
        ChannelEvent::new("driverLocation", json!({ "lng": 77.22 })),
    );
    hub.publish(
        "driverA",
        ChannelEvent::new("driverLocation", json!({ "lat": 120.0, "lng": 77.22 })),
    );
    hub.publish("driverA", driver_location(28.62, 77.22));

    let driver = Coordinate {
        lat: 28.62,
        lng: 77.22,
    };
    let snapshot = wait_for_scene(&mut scene, |s| s.marker(DRIVER_LABEL) == Some(driver)).await;
    let moves = snapshot
        .journal
        .iter()
        .filter(|op| matches!(op, SceneOp::MarkerMoved { .. }))
        .count();
    assert_eq!(moves, 1);
    assert_eq!(
        metrics
            .position_events_total
            .with_label_values(&["malformed"])
            .get(),
        2
    );
    assert_eq!(
        metrics
            .position_events_total
            .with_label_values(&["applied"])
            .get(),
        1
    );

    view.unmount().await;
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(empty_request("GET", "/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("tracking_sessions_active"));
}

#[tokio::test]
async fn tracking_lifecycle_over_http() {
    let (app, state) = setup();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/tracking",
            json!({ "order": order_json(json!("driverA")) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["order_id"], "42");
    assert_eq!(created["state"], "active");
    assert_eq!(created["driver_id"], "driverA");
    assert_eq!(created["subscribed"], true);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/tracking",
            json!({ "order": order_json(json!("driverA")) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["session_id"], created["session_id"]);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/tracking/42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["scene"]["type"], "FeatureCollection");
    let points: Vec<&Value> = detail["scene"]["features"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|f| f["geometry"]["type"] == "Point")
        .map(|f| &f["geometry"]["coordinates"])
        .collect();
    assert!(points.contains(&&json!([77.21, 28.61])));
    assert!(points.contains(&&json!([77.23, 28.65])));

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/tracking"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    assert_eq!(state.metrics.tracking_sessions_active.get(), 1);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/tracking/42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    let teardown = report["teardown"].as_array().unwrap();
    assert_eq!(teardown.first().unwrap(), "channel_closed");
    assert_eq!(teardown.last().unwrap(), "map_released");

    let response = app
        .oneshot(empty_request("GET", "/tracking/42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(state.views.is_empty());
    assert_eq!(state.metrics.tracking_sessions_active.get(), 0);
}

#[tokio::test]
async fn untrackable_order_returns_400() {
    let (app, state) = setup();
    let mut pending = order_json(json!("driverA"));
    pending["status"] = json!("pending");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/tracking", json!({ "order": pending })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            "/tracking",
            json!({ "order": order_json(Value::Null) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.views.is_empty());
}

#[tokio::test]
async fn empty_tracking_request_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/tracking", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn order_lookup_without_backend_returns_503() {
    let (app, _state) = setup();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/tracking", json!({ "order_id": "42" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .oneshot(empty_request("GET", "/orders/active"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_tracking_returns_404() {
    let (app, _state) = setup();
    let response = app
        .oneshot(empty_request("DELETE", "/tracking/nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
