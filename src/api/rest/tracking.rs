use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::Order;
use crate::state::AppState;
use crate::tracking::session::TeardownStep;
use crate::tracking::view::{TrackingView, ViewState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking", get(list_tracking).post(start_tracking))
        .route(
            "/tracking/:order_id",
            get(get_tracking).delete(stop_tracking),
        )
}

/// Either a full order or the id of one of the caller's pending orders.
#[derive(Deserialize)]
pub struct StartTrackingRequest {
    #[serde(default)]
    pub order: Option<Order>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackingSummary {
    pub order_id: String,
    pub state: ViewState,
    pub session_id: Option<Uuid>,
    pub driver_id: Option<String>,
    pub subscribed: bool,
}

impl TrackingSummary {
    fn of(order_id: &str, view: &TrackingView) -> Self {
        Self {
            order_id: order_id.to_string(),
            state: view.state(),
            session_id: view.session().map(|session| session.id()),
            driver_id: view
                .order()
                .and_then(Order::driver_id)
                .map(str::to_string),
            subscribed: view.session().is_some_and(|session| session.is_subscribed()),
        }
    }
}

#[derive(Serialize)]
pub struct TrackingDetail {
    #[serde(flatten)]
    pub summary: TrackingSummary,
    pub revision: u64,
    pub scene: Value,
}

#[derive(Serialize)]
pub struct TeardownReport {
    pub order_id: String,
    pub teardown: Vec<TeardownStep>,
}

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartTrackingRequest>,
) -> Result<(StatusCode, Json<TrackingSummary>), AppError> {
    let order = match (payload.order, payload.order_id) {
        (Some(order), _) => order,
        (None, Some(order_id)) => state.backend()?.find_order(&order_id).await?,
        (None, None) => {
            return Err(AppError::BadRequest(
                "either order or order_id is required".to_string(),
            ));
        }
    };

    if !order.is_trackable() {
        return Err(AppError::BadRequest(format!(
            "order {} has no driver on the way",
            order.id
        )));
    }

    let (status, summary) = match state.views.entry(order.id.clone()) {
        Entry::Occupied(entry) => (StatusCode::OK, TrackingSummary::of(entry.key(), entry.get())),
        Entry::Vacant(entry) => {
            let view = TrackingView::open(state.deps.clone(), order);
            let summary = TrackingSummary::of(entry.key(), &view);
            entry.insert(view);
            info!(order_id = %summary.order_id, state = ?summary.state, "tracking started");
            (StatusCode::CREATED, summary)
        }
    };

    Ok((status, Json(summary)))
}

async fn list_tracking(State(state): State<Arc<AppState>>) -> Json<Vec<TrackingSummary>> {
    let summaries = state
        .views
        .iter()
        .map(|view| TrackingSummary::of(view.key(), view.value()))
        .collect();

    Json(summaries)
}

async fn get_tracking(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<TrackingDetail>, AppError> {
    let view = state
        .views
        .get(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} is not tracked")))?;

    let snapshot = view.session().map(|session| session.snapshot());
    let detail = TrackingDetail {
        summary: TrackingSummary::of(&order_id, &view),
        revision: snapshot.as_ref().map_or(0, |scene| scene.revision),
        scene: snapshot.map_or(Value::Null, |scene| scene.to_geojson()),
    };

    Ok(Json(detail))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<TeardownReport>, AppError> {
    let (order_id, mut view) = state
        .views
        .remove(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} is not tracked")))?;

    let teardown = view.unmount().await;
    info!(order_id = %order_id, ?teardown, "tracking stopped");

    Ok(Json(TeardownReport { order_id, teardown }))
}
