use async_trait::async_trait;

use crate::error::RoutingError;
use crate::geo::{great_circle_steps, path_length_km};
use crate::models::coordinate::Coordinate;
use crate::routing::{Route, RouteEngine};

const DEFAULT_SEGMENTS: usize = 16;

/// Offline engine: great-circle legs between consecutive waypoints.
#[derive(Debug, Clone)]
pub struct StraightLineEngine {
    segments_per_leg: usize,
}

impl StraightLineEngine {
    pub fn new(segments_per_leg: usize) -> Self {
        Self {
            segments_per_leg: segments_per_leg.max(1),
        }
    }

    pub fn plot(&self, waypoints: &[Coordinate]) -> Result<Route, RoutingError> {
        if waypoints.len() < 2 {
            return Err(RoutingError::NotEnoughWaypoints(waypoints.len()));
        }

        let mut path = vec![waypoints[0]];
        for leg in waypoints.windows(2) {
            path.extend(great_circle_steps(&leg[0], &leg[1], self.segments_per_leg));
        }

        Ok(Route {
            waypoints: waypoints.to_vec(),
            distance_km: path_length_km(&path),
            path,
            duration_s: None,
        })
    }
}

impl Default for StraightLineEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENTS)
    }
}

#[async_trait]
impl RouteEngine for StraightLineEngine {
    fn name(&self) -> &'static str {
        "straight-line"
    }

    async fn route(&self, waypoints: &[Coordinate]) -> Result<Route, RoutingError> {
        self.plot(waypoints)
    }
}

#[cfg(test)]
mod tests {
    use super::StraightLineEngine;
    use crate::error::RoutingError;
    use crate::geo::haversine_km;
    use crate::models::coordinate::Coordinate;

    #[test]
    fn path_visits_waypoints_in_order() {
        let driver = Coordinate {
            lat: 28.62,
            lng: 77.22,
        };
        let pickup = Coordinate {
            lat: 28.61,
            lng: 77.21,
        };
        let dropoff = Coordinate {
            lat: 28.65,
            lng: 77.23,
        };

        let route = StraightLineEngine::new(4)
            .plot(&[driver, pickup, dropoff])
            .unwrap();

        assert_eq!(route.path.len(), 9);
        assert_eq!(route.path[0], driver);
        assert_eq!(route.path[4], pickup);
        assert_eq!(route.path[8], dropoff);

        let legs = haversine_km(&driver, &pickup) + haversine_km(&pickup, &dropoff);
        assert!((route.distance_km - legs).abs() < 1e-6);
    }

    #[test]
    fn single_waypoint_is_rejected() {
        let err = StraightLineEngine::default()
            .plot(&[Coordinate::PLACEHOLDER])
            .unwrap_err();
        assert!(matches!(err, RoutingError::NotEnoughWaypoints(1)));
    }
}
