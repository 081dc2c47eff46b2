use serde::{Deserialize, Serialize};

use crate::error::CoordinateError;

/// A (latitude, longitude) pair in degrees, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Where the driver marker sits before any position is known.
    pub const PLACEHOLDER: Coordinate = Coordinate { lat: 0.0, lng: 0.0 };

    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(CoordinateError::NotFinite { lat, lng });
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::OutOfRange { lat, lng });
        }

        Ok(Self { lat, lng })
    }

    /// Converts a stored `[longitude, latitude]` pair (GeoJSON order).
    ///
    /// Every storage-order pair entering the crate goes through here, so the
    /// swap lives in exactly one place.
    pub fn from_lng_lat(pair: [f64; 2]) -> Result<Self, CoordinateError> {
        let [lng, lat] = pair;
        Self::new(lat, lng)
    }

    /// Inverse of [`Coordinate::from_lng_lat`].
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    pub fn validate(self) -> Result<Self, CoordinateError> {
        Self::new(self.lat, self.lng)
    }
}
