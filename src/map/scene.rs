use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::error::MapError;
use crate::map::backend::{LayerId, MapBackend, Viewport};
use crate::models::coordinate::Coordinate;
use crate::routing::{LineStyle, OverlayControls};

const DEFAULT_JOURNAL_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    Marker {
        label: String,
        position: Coordinate,
    },
    Route {
        path: Vec<Coordinate>,
        style: LineStyle,
        controls: OverlayControls,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SceneOp {
    ViewportCreated { view: Viewport },
    ViewChanged { view: Viewport },
    MarkerAdded { layer: LayerId, label: String, at: Coordinate },
    MarkerMoved { layer: LayerId, to: Coordinate },
    RouteAdded { layer: LayerId, points: usize },
    LayerRemoved { layer: LayerId },
    ViewportRemoved,
}

/// What a [`SceneMap`] currently shows, plus a bounded log of how it got there.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneSnapshot {
    pub viewport: Option<Viewport>,
    pub layers: BTreeMap<LayerId, Layer>,
    pub revision: u64,
    pub journal: VecDeque<SceneOp>,
    pub released: bool,
}

impl SceneSnapshot {
    pub fn marker(&self, label: &str) -> Option<Coordinate> {
        self.markers().find(|(l, _)| *l == label).map(|(_, at)| at)
    }

    pub fn markers(&self) -> impl Iterator<Item = (&str, Coordinate)> + '_ {
        self.layers.values().filter_map(|layer| match layer {
            Layer::Marker { label, position } => Some((label.as_str(), *position)),
            Layer::Route { .. } => None,
        })
    }

    pub fn routes(&self) -> Vec<&[Coordinate]> {
        self.layers
            .values()
            .filter_map(|layer| match layer {
                Layer::Route { path, .. } => Some(path.as_slice()),
                Layer::Marker { .. } => None,
            })
            .collect()
    }

    /// Renders markers and routes as a GeoJSON `FeatureCollection`.
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .layers
            .iter()
            .map(|(id, layer)| match layer {
                Layer::Marker { label, position } => json!({
                    "type": "Feature",
                    "id": id,
                    "geometry": { "type": "Point", "coordinates": position.to_lng_lat() },
                    "properties": { "kind": "marker", "label": label },
                }),
                Layer::Route { path, style, .. } => json!({
                    "type": "Feature",
                    "id": id,
                    "geometry": {
                        "type": "LineString",
                        "coordinates": path.iter().map(|c| c.to_lng_lat()).collect::<Vec<_>>(),
                    },
                    "properties": {
                        "kind": "route",
                        "color": style.color,
                        "weight": style.weight,
                        "opacity": style.opacity,
                    },
                }),
            })
            .collect();

        json!({
            "type": "FeatureCollection",
            "features": features,
            "viewport": self.viewport,
        })
    }
}

/// Headless [`MapBackend`]: keeps the scene in memory and publishes a fresh
/// [`SceneSnapshot`] to watchers after every mutation.
pub struct SceneMap {
    scene: SceneSnapshot,
    next_layer: LayerId,
    journal_limit: usize,
    tx: watch::Sender<SceneSnapshot>,
}

impl SceneMap {
    pub fn new() -> Self {
        Self::with_journal_limit(DEFAULT_JOURNAL_LIMIT)
    }

    pub fn with_journal_limit(journal_limit: usize) -> Self {
        let (tx, _unused_rx) = watch::channel(SceneSnapshot::default());
        Self {
            scene: SceneSnapshot::default(),
            next_layer: 1,
            journal_limit: journal_limit.max(1),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SceneSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> &SceneSnapshot {
        &self.scene
    }

    fn require_viewport(&self) -> Result<(), MapError> {
        if self.scene.viewport.is_none() {
            return Err(MapError::NoViewport);
        }
        Ok(())
    }

    fn allocate(&mut self) -> LayerId {
        let id = self.next_layer;
        self.next_layer += 1;
        id
    }

    fn commit(&mut self, op: SceneOp) {
        if self.scene.journal.len() == self.journal_limit {
            self.scene.journal.pop_front();
        }
        self.scene.journal.push_back(op);
        self.scene.revision += 1;
        self.tx.send_replace(self.scene.clone());
    }
}

impl Default for SceneMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MapBackend for SceneMap {
    fn create_viewport(&mut self, view: Viewport) -> Result<(), MapError> {
        if self.scene.viewport.is_some() {
            return Err(MapError::AlreadyCreated);
        }
        self.scene.viewport = Some(view);
        self.scene.released = false;
        self.commit(SceneOp::ViewportCreated { view });
        Ok(())
    }

    fn set_view(&mut self, view: Viewport) -> Result<(), MapError> {
        self.require_viewport()?;
        self.scene.viewport = Some(view);
        self.commit(SceneOp::ViewChanged { view });
        Ok(())
    }

    fn add_marker(&mut self, at: Coordinate, label: &str) -> Result<LayerId, MapError> {
        self.require_viewport()?;
        let layer = self.allocate();
        self.scene.layers.insert(
            layer,
            Layer::Marker {
                label: label.to_string(),
                position: at,
            },
        );
        self.commit(SceneOp::MarkerAdded {
            layer,
            label: label.to_string(),
            at,
        });
        Ok(layer)
    }

    fn move_marker(&mut self, marker: LayerId, to: Coordinate) -> Result<(), MapError> {
        self.require_viewport()?;
        match self.scene.layers.get_mut(&marker) {
            Some(Layer::Marker { position, .. }) => *position = to,
            _ => return Err(MapError::UnknownLayer(marker)),
        }
        self.commit(SceneOp::MarkerMoved { layer: marker, to });
        Ok(())
    }

    fn add_route(
        &mut self,
        path: &[Coordinate],
        style: &LineStyle,
        controls: &OverlayControls,
    ) -> Result<LayerId, MapError> {
        self.require_viewport()?;
        if path.len() < 2 {
            return Err(MapError::Render(format!(
                "a route line needs two points, got {}",
                path.len()
            )));
        }
        let layer = self.allocate();
        self.scene.layers.insert(
            layer,
            Layer::Route {
                path: path.to_vec(),
                style: *style,
                controls: *controls,
            },
        );
        self.commit(SceneOp::RouteAdded {
            layer,
            points: path.len(),
        });
        Ok(layer)
    }

    fn remove_layer(&mut self, layer: LayerId) -> Result<(), MapError> {
        self.require_viewport()?;
        if self.scene.layers.remove(&layer).is_none() {
            return Err(MapError::UnknownLayer(layer));
        }
        self.commit(SceneOp::LayerRemoved { layer });
        Ok(())
    }

    fn remove_viewport(&mut self) -> Result<(), MapError> {
        self.require_viewport()?;
        self.scene.viewport = None;
        self.scene.layers.clear();
        self.scene.released = true;
        self.commit(SceneOp::ViewportRemoved);
        Ok(())
    }
}
