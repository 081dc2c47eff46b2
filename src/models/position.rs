use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PayloadError;
use crate::models::coordinate::Coordinate;

/// Wire shape of a position event: `{lat, lng}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
}

impl LocationPayload {
    pub fn parse(data: &Value) -> Result<Coordinate, PayloadError> {
        let payload = LocationPayload::deserialize(data)?;
        Ok(Coordinate::new(payload.lat, payload.lng)?)
    }
}

impl From<Coordinate> for LocationPayload {
    fn from(c: Coordinate) -> Self {
        Self {
            lat: c.lat,
            lng: c.lng,
        }
    }
}

/// A driver position in transit for one trip. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct LiveDriverPosition {
    pub order_id: String,
    pub driver_id: String,
    pub coordinate: Coordinate,
    pub received_at: DateTime<Utc>,
}
