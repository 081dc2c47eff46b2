use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::Transport;
use crate::channel::link::{LinkOptions, ReconnectPolicy};
use crate::map::backend::Viewport;
use crate::models::coordinate::Coordinate;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;
use crate::routing::RouteEngine;
use crate::tracking::session::{
    MapSession, PositionFeed, SessionConfig, SessionFeed, TeardownStep,
};
use crate::tracking::subscriber::LocationSubscriber;

/// Delhi, the fallback center before the device reports a position.
pub const DEFAULT_CENTER: Coordinate = Coordinate {
    lat: 28.6139,
    lng: 77.2090,
};

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub zoom: u8,
    pub driver_zoom: u8,
    pub default_center: Coordinate,
    pub poll_interval: Duration,
    pub geolocation_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub event_buffer: usize,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            zoom: 14,
            driver_zoom: 13,
            default_center: DEFAULT_CENTER,
            poll_interval: Duration::from_secs(5),
            geolocation_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            event_buffer: 1024,
        }
    }
}

/// Collaborators shared by every tracking view and driver trip.
#[derive(Clone)]
pub struct TrackingDeps {
    pub transport: Arc<dyn Transport>,
    pub engine: Arc<dyn RouteEngine>,
    pub metrics: Metrics,
    pub settings: TrackingSettings,
}

impl TrackingDeps {
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            policy: self.settings.reconnect.clone(),
            buffer: self.settings.event_buffer,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    Unmounted,
    /// An order is selected but its coordinates are not usable yet.
    Initializing,
    Active,
}

/// Live tracking of one customer order.
pub struct TrackingView {
    deps: TrackingDeps,
    order: Option<Order>,
    session: Option<MapSession>,
}

impl TrackingView {
    pub fn new(deps: TrackingDeps) -> Self {
        Self {
            deps,
            order: None,
            session: None,
        }
    }

    /// Builds a view with `order` already selected.
    pub fn open(deps: TrackingDeps, order: Order) -> Self {
        let mut view = Self::new(deps);
        view.order = Some(order);
        view.activate();
        view
    }

    pub fn state(&self) -> ViewState {
        match (&self.order, &self.session) {
            (_, Some(_)) => ViewState::Active,
            (Some(_), None) => ViewState::Initializing,
            (None, None) => ViewState::Unmounted,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn session(&self) -> Option<&MapSession> {
        self.session.as_ref()
    }

    /// Selects a new order, or none. Any change to the selected order tears
    /// the current session down before the next one is mounted.
    pub async fn select(&mut self, order: Option<Order>) -> Vec<TeardownStep> {
        let Some(order) = order else {
            return self.unmount().await;
        };

        if self.order.as_ref() == Some(&order) {
            if self.session.is_none() {
                self.activate();
            }
            return Vec::new();
        }

        let steps = self.unmount().await;
        self.order = Some(order);
        self.activate();
        steps
    }

    pub async fn unmount(&mut self) -> Vec<TeardownStep> {
        let order = self.order.take();
        let Some(session) = self.session.take() else {
            return Vec::new();
        };

        let steps = session.close().await;
        if let Some(order) = order {
            info!(order_id = %order.id, "tracking view unmounted");
        }
        steps
    }

    fn activate(&mut self) {
        let Some(order) = self.order.as_ref() else {
            return;
        };
        let Some((pickup, dropoff)) = order.route_endpoints() else {
            debug!(order_id = %order.id, "order coordinates not loaded; waiting");
            return;
        };

        let config = SessionConfig {
            order_id: order.id.clone(),
            pickup,
            dropoff,
            viewport: Viewport {
                center: pickup,
                zoom: self.deps.settings.zoom,
            },
            follow_driver: false,
            engine: self.deps.engine.clone(),
            metrics: self.deps.metrics.clone(),
        };

        let transport = self.deps.transport.clone();
        let options = self.deps.link_options();
        let opened = MapSession::start(config, || {
            match LocationSubscriber::open(order, transport, options) {
                Some(subscriber) => SessionFeed {
                    feed: PositionFeed::Remote(subscriber),
                    companions: Vec::new(),
                },
                None => {
                    debug!(order_id = %order.id, "no driver assigned; not subscribing");
                    SessionFeed::idle()
                }
            }
        });

        match opened {
            Ok(session) => {
                info!(order_id = %order.id, session_id = %session.id(), "tracking view active");
                self.session = Some(session);
            }
            Err(err) => warn!(order_id = %order.id, error = %err, "failed to create tracking map"),
        }
    }
}
