use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::coordinate::Coordinate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// A driver is on the trip: accepted and not yet finished.
    pub fn is_in_progress(self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::PickedUp)
    }
}

/// GeoJSON point as stored by the backend: `coordinates` is `[lng, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_kind")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

fn point_kind() -> String {
    "Point".to_string()
}

impl GeoPoint {
    pub fn from_coordinate(c: Coordinate) -> Self {
        Self {
            kind: point_kind(),
            coordinates: c.to_lng_lat(),
        }
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match Coordinate::from_lng_lat(self.coordinates) {
            Ok(c) => Some(c),
            Err(err) => {
                warn!(error = %err, "ignoring invalid stored location");
                None
            }
        }
    }
}

/// The assigned delivery partner, either a bare id or a populated profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DriverRef {
    Id(String),
    Profile {
        #[serde(alias = "_id")]
        id: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl DriverRef {
    pub fn id(&self) -> &str {
        match self {
            DriverRef::Id(id) => id,
            DriverRef::Profile { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub pickup_location: Option<GeoPoint>,
    #[serde(default)]
    pub dropoff_location: Option<GeoPoint>,
    pub status: OrderStatus,
    #[serde(default)]
    pub delivery_partner: Option<DriverRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
}

impl Order {
    pub fn pickup(&self) -> Option<Coordinate> {
        self.pickup_location.as_ref().and_then(GeoPoint::coordinate)
    }

    pub fn dropoff(&self) -> Option<Coordinate> {
        self.dropoff_location.as_ref().and_then(GeoPoint::coordinate)
    }

    /// Pickup and dropoff in render order, once both are loaded and valid.
    pub fn route_endpoints(&self) -> Option<(Coordinate, Coordinate)> {
        Some((self.pickup()?, self.dropoff()?))
    }

    pub fn driver_id(&self) -> Option<&str> {
        self.delivery_partner.as_ref().map(DriverRef::id)
    }

    pub fn is_trackable(&self) -> bool {
        self.status.is_in_progress() && self.delivery_partner.is_some()
    }
}
