pub mod osrm;
pub mod overlay;
pub mod straight;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RoutingError;
use crate::models::coordinate::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineStyle {
    pub color: &'static str,
    pub weight: u8,
    pub opacity: f32,
}

pub const ROUTE_STYLE: LineStyle = LineStyle {
    color: "#003366",
    weight: 4,
    opacity: 0.8,
};

/// Interactive affordances of a route overlay. Tracking maps are passive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverlayControls {
    pub show_itinerary: bool,
    pub add_waypoints: bool,
    pub draggable_waypoints: bool,
    pub waypoint_markers: bool,
}

pub const PASSIVE_CONTROLS: OverlayControls = OverlayControls {
    show_itinerary: false,
    add_waypoints: false,
    draggable_waypoints: false,
    waypoint_markers: false,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub waypoints: Vec<Coordinate>,
    pub path: Vec<Coordinate>,
    pub distance_km: f64,
    pub duration_s: Option<f64>,
}

#[async_trait]
pub trait RouteEngine: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Computes a path visiting `waypoints` in order.
    async fn route(&self, waypoints: &[Coordinate]) -> Result<Route, RoutingError>;
}
