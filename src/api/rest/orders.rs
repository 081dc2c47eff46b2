use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde::Serialize;

use crate::error::AppError;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/orders/active", get(active_orders))
}

#[derive(Serialize)]
pub struct ActiveOrder {
    #[serde(flatten)]
    pub order: Order,
    /// A driver is assigned and the order is under way.
    pub trackable: bool,
    /// A tracking view is mounted for it.
    pub tracking: bool,
}

async fn active_orders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ActiveOrder>>, AppError> {
    let orders = state.backend()?.pending_orders().await?;

    let active = orders
        .into_iter()
        .map(|order| ActiveOrder {
            trackable: order.is_trackable(),
            tracking: state.views.contains_key(&order.id),
            order,
        })
        .collect();

    Ok(Json(active))
}
