use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::api::client::BackendClient;
use crate::channel::hub::LocationHub;
use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::routing::RouteEngine;
use crate::tracking::view::{TrackingDeps, TrackingSettings, TrackingView};

pub struct AppState {
    pub views: DashMap<String, TrackingView>,
    pub hub: Arc<LocationHub>,
    pub deps: TrackingDeps,
    pub backend: Option<BackendClient>,
    pub metrics: Metrics,
    pub static_dir: String,
}

impl AppState {
    pub fn new(
        settings: TrackingSettings,
        engine: Arc<dyn RouteEngine>,
        backend: Option<BackendClient>,
    ) -> Self {
        let metrics = Metrics::new();
        let hub = Arc::new(LocationHub::new(settings.event_buffer));
        let deps = TrackingDeps {
            transport: hub.clone(),
            engine,
            metrics: metrics.clone(),
            settings,
        };

        Self {
            views: DashMap::new(),
            hub,
            deps,
            backend,
            metrics,
            static_dir: "static".to_string(),
        }
    }

    pub fn with_static_dir(mut self, static_dir: impl Into<String>) -> Self {
        self.static_dir = static_dir.into();
        self
    }

    pub fn backend(&self) -> Result<&BackendClient, AppError> {
        self.backend
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("no order backend configured".to_string()))
    }

    /// Tears down every mounted view.
    pub async fn unmount_all(&self) {
        let order_ids: Vec<String> = self.views.iter().map(|view| view.key().clone()).collect();
        for order_id in order_ids {
            if let Some((_, mut view)) = self.views.remove(&order_id) {
                view.unmount().await;
            }
        }
        info!("all tracking views unmounted");
    }
}
