use tracing::{debug, error, warn};

use crate::error::MapError;
use crate::map::backend::{LayerId, MapBackend, Viewport};
use crate::models::coordinate::Coordinate;
use crate::routing::{PASSIVE_CONTROLS, ROUTE_STYLE, Route};

pub const PICKUP_LABEL: &str = "Pickup Location";
pub const DROPOFF_LABEL: &str = "Dropoff Location";
pub const DRIVER_LABEL: &str = "Driver Location";

/// Owns one map viewport for the life of a session.
///
/// The pickup and dropoff markers are placed once at creation and never move.
/// The driver marker starts at [`Coordinate::PLACEHOLDER`]. Operations on a
/// surface that is not live are no-ops.
pub struct MapSurface<M: MapBackend> {
    backend: M,
    view: Option<Viewport>,
    driver_marker: Option<LayerId>,
}

impl<M: MapBackend> MapSurface<M> {
    pub fn new(backend: M) -> Self {
        Self {
            backend,
            view: None,
            driver_marker: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<Viewport> {
        self.view
    }

    pub fn backend(&self) -> &M {
        &self.backend
    }

    /// Creates the viewport and its markers. Returns `Ok(false)` when the
    /// surface is already live.
    pub fn create(
        &mut self,
        view: Viewport,
        pickup: Coordinate,
        dropoff: Coordinate,
    ) -> Result<bool, MapError> {
        if self.is_live() {
            debug!("map surface already created");
            return Ok(false);
        }

        self.backend.create_viewport(view)?;
        self.view = Some(view);

        let placed = self
            .backend
            .add_marker(pickup, PICKUP_LABEL)
            .and_then(|_| self.backend.add_marker(dropoff, DROPOFF_LABEL))
            .and_then(|_| self.backend.add_marker(Coordinate::PLACEHOLDER, DRIVER_LABEL));

        match placed {
            Ok(driver) => {
                self.driver_marker = Some(driver);
                Ok(true)
            }
            Err(err) => {
                self.destroy();
                Err(err)
            }
        }
    }

    /// Moves the driver marker. Failures are logged, never returned.
    pub fn update_driver_marker(&mut self, to: Coordinate) -> bool {
        if !self.is_live() {
            debug!("driver marker update after surface release ignored");
            return false;
        }
        let Some(marker) = self.driver_marker else {
            warn!("driver marker missing; update ignored");
            return false;
        };

        match self.backend.move_marker(marker, to) {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, lat = to.lat, lng = to.lng, "failed to move driver marker");
                if err == MapError::UnknownLayer(marker) {
                    self.driver_marker = None;
                }
                false
            }
        }
    }

    /// Re-centers on `center`, keeping the zoom.
    pub fn recenter(&mut self, center: Coordinate) {
        let Some(view) = self.view else {
            return;
        };
        let next = Viewport { center, ..view };
        if next == view {
            return;
        }

        match self.backend.set_view(next) {
            Ok(()) => self.view = Some(next),
            Err(err) => error!(error = %err, "failed to re-center map"),
        }
    }

    pub fn draw_route(&mut self, route: &Route) -> Result<LayerId, MapError> {
        if !self.is_live() {
            return Err(MapError::NoViewport);
        }
        self.backend
            .add_route(&route.path, &ROUTE_STYLE, &PASSIVE_CONTROLS)
    }

    pub fn erase_route(&mut self, layer: LayerId) -> Result<(), MapError> {
        if !self.is_live() {
            return Err(MapError::NoViewport);
        }
        self.backend.remove_layer(layer)
    }

    /// Releases the viewport. Returns whether anything was live.
    pub fn destroy(&mut self) -> bool {
        if self.view.take().is_none() {
            return false;
        }
        self.driver_marker = None;

        if let Err(err) = self.backend.remove_viewport() {
            error!(error = %err, "failed to release map viewport");
        }
        true
    }
}
