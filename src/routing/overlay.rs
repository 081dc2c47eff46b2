use tracing::warn;

use crate::error::MapError;
use crate::map::backend::{LayerId, MapBackend};
use crate::map::surface::MapSurface;
use crate::models::coordinate::Coordinate;
use crate::routing::Route;

struct ActiveOverlay {
    waypoints: Vec<Coordinate>,
    layer: LayerId,
}

/// Zero or one route line on a surface. Never edited in place: every change
/// removes the old line before the new one is drawn.
#[derive(Default)]
pub struct RouteOverlay {
    active: Option<ActiveOverlay>,
}

impl RouteOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waypoints for `current → pickup → dropoff`.
    ///
    /// Without a live position the pickup stands in for the driver.
    /// Consecutive duplicates are dropped, so the result can be shorter than
    /// three.
    pub fn plan(
        current: Option<Coordinate>,
        pickup: Coordinate,
        dropoff: Coordinate,
    ) -> Vec<Coordinate> {
        let source = current.unwrap_or(pickup);
        let mut waypoints: Vec<Coordinate> = Vec::with_capacity(3);
        for point in [source, pickup, dropoff] {
            if waypoints.last() != Some(&point) {
                waypoints.push(point);
            }
        }
        waypoints
    }

    pub fn is_present(&self) -> bool {
        self.active.is_some()
    }

    pub fn waypoints(&self) -> Option<&[Coordinate]> {
        self.active.as_ref().map(|a| a.waypoints.as_slice())
    }

    pub fn replace<M: MapBackend>(
        &mut self,
        surface: &mut MapSurface<M>,
        route: &Route,
    ) -> Result<(), MapError> {
        if !surface.is_live() {
            return Err(MapError::NoViewport);
        }

        self.remove(surface);
        let layer = surface.draw_route(route)?;
        self.active = Some(ActiveOverlay {
            waypoints: route.waypoints.clone(),
            layer,
        });
        Ok(())
    }

    /// Returns whether an overlay was present.
    pub fn remove<M: MapBackend>(&mut self, surface: &mut MapSurface<M>) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        if let Err(err) = surface.erase_route(active.layer) {
            warn!(error = %err, layer = active.layer, "failed to remove route overlay");
        }
        true
    }
}
