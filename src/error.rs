use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("coordinate is not finite: ({lat}, {lng})")]
    NotFinite { lat: f64, lng: f64 },

    #[error("coordinate out of range: ({lat}, {lng})")]
    OutOfRange { lat: f64, lng: f64 },
}

/// A real-time position payload that could not be turned into a coordinate.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed position payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid position: {0}")]
    Invalid(#[from] CoordinateError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    #[error("map viewport already created")]
    AlreadyCreated,

    #[error("map viewport not created")]
    NoViewport,

    #[error("unknown layer {0}")]
    UnknownLayer(u64),

    #[error("map rendering failed: {0}")]
    Render(String),
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("a route needs at least two distinct waypoints, got {0}")]
    NotEnoughWaypoints(usize),

    #[error("routing request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("routing engine returned {code}: {message}")]
    Engine { code: String, message: String },

    #[error("routing response had no usable route")]
    NoRoute,

    #[error(transparent)]
    Geometry(#[from] CoordinateError),
}

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("channel connect failed: {0}")]
    Connect(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeolocationError {
    #[error("geolocation permission denied")]
    PermissionDenied,

    #[error("geolocation timed out")]
    Timeout,

    #[error("geolocation unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}
