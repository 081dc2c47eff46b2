use serde::Serialize;

use crate::error::MapError;
use crate::models::coordinate::Coordinate;
use crate::routing::{LineStyle, OverlayControls};

pub type LayerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: u8,
}

/// The imperative map library behind a [`crate::map::surface::MapSurface`].
///
/// Implementations hold exactly one viewport. Nothing outside the surface calls
/// these directly.
pub trait MapBackend: Send + 'static {
    fn create_viewport(&mut self, view: Viewport) -> Result<(), MapError>;

    fn set_view(&mut self, view: Viewport) -> Result<(), MapError>;

    fn add_marker(&mut self, at: Coordinate, label: &str) -> Result<LayerId, MapError>;

    fn move_marker(&mut self, marker: LayerId, to: Coordinate) -> Result<(), MapError>;

    fn add_route(
        &mut self,
        path: &[Coordinate],
        style: &LineStyle,
        controls: &OverlayControls,
    ) -> Result<LayerId, MapError>;

    fn remove_layer(&mut self, layer: LayerId) -> Result<(), MapError>;

    /// Removes the viewport and every layer on it.
    fn remove_viewport(&mut self) -> Result<(), MapError>;
}
