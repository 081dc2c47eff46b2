use std::sync::Arc;

use tracing::info;

use crate::error::AppError;
use crate::map::backend::Viewport;
use crate::models::order::Order;
use crate::tracking::publisher::LocationPublisher;
use crate::tracking::session::{MapSession, PositionFeed, SessionConfig, SessionFeed, TeardownStep};
use crate::tracking::source::{Geolocator, PositionSource};
use crate::tracking::view::TrackingDeps;

/// The driver's own map for an accepted order: polls the device position,
/// publishes it, and follows it on a map with the route ahead.
pub struct DriverTrip {
    driver_id: String,
    session: MapSession,
}

impl DriverTrip {
    pub fn start(
        driver_id: &str,
        order: &Order,
        geolocator: Arc<dyn Geolocator>,
        deps: &TrackingDeps,
    ) -> Result<Self, AppError> {
        let (pickup, dropoff) = order.route_endpoints().ok_or_else(|| {
            AppError::BadRequest(format!("order {} has no usable coordinates", order.id))
        })?;

        let settings = &deps.settings;
        let config = SessionConfig {
            order_id: order.id.clone(),
            pickup,
            dropoff,
            viewport: Viewport {
                center: settings.default_center,
                zoom: settings.driver_zoom,
            },
            follow_driver: true,
            engine: deps.engine.clone(),
            metrics: deps.metrics.clone(),
        };

        let session = MapSession::start(config, || {
            let source = PositionSource::new(
                geolocator,
                settings.poll_interval,
                settings.geolocation_timeout,
                deps.metrics.clone(),
            );
            let (positions, source_task) = source.spawn();
            let publisher = LocationPublisher::new(
                driver_id,
                deps.transport.clone(),
                deps.link_options(),
                settings.poll_interval,
            );
            let publisher_task = publisher.spawn(positions.clone());

            SessionFeed {
                feed: PositionFeed::Local(positions),
                companions: vec![source_task, publisher_task],
            }
        })
        .map_err(|err| AppError::Internal(format!("failed to create trip map: {err}")))?;

        info!(driver_id = %driver_id, order_id = %order.id, "driver trip started");
        Ok(Self {
            driver_id: driver_id.to_string(),
            session,
        })
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn session(&self) -> &MapSession {
        &self.session
    }

    pub async fn stop(self) -> Vec<TeardownStep> {
        let steps = self.session.close().await;
        info!(driver_id = %self.driver_id, ?steps, "driver trip stopped");
        steps
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;
    use serde_json::json;

    use super::DriverTrip;
    use crate::channel::hub::LocationHub;
    use crate::channel::{Transport, UPDATE_DRIVER_LOCATION_EVENT};
    use crate::error::GeolocationError;
    use crate::map::surface::DRIVER_LABEL;
    use crate::models::coordinate::Coordinate;
    use crate::models::order::Order;
    use crate::observability::metrics::Metrics;
    use crate::routing::straight::StraightLineEngine;
    use crate::tracking::session::TeardownStep;
    use crate::tracking::source::ScriptedGeolocator;
    use crate::tracking::view::{DEFAULT_CENTER, TrackingDeps, TrackingSettings};

    fn order() -> Order {
        serde_json::from_value(json!({
            "_id": "42",
            "pickupLocation": { "type": "Point", "coordinates": [77.21, 28.61] },
            "dropoffLocation": { "type": "Point", "coordinates": [77.23, 28.65] },
            "status": "accepted",
            "deliveryPartner": "driverA"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn follows_and_publishes_the_device_position() {
        let hub = Arc::new(LocationHub::new(16));
        let mut observer = hub.connect("driverA").await.unwrap();
        let deps = TrackingDeps {
            transport: hub.clone(),
            engine: Arc::new(StraightLineEngine::new(4)),
            metrics: Metrics::new(),
            settings: TrackingSettings::default(),
        };
        let here = Coordinate {
            lat: 28.62,
            lng: 77.22,
        };
        let geolocator = Arc::new(ScriptedGeolocator::new([Ok(here)]));

        let trip = DriverTrip::start("driverA", &order(), geolocator, &deps).unwrap();
        assert_eq!(
            trip.session().snapshot().viewport.map(|v| (v.center, v.zoom)),
            Some((DEFAULT_CENTER, 13))
        );

        let event = tokio::time::timeout(Duration::from_secs(2), observer.incoming.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event, UPDATE_DRIVER_LOCATION_EVENT);
        assert_eq!(event.data["lat"], 28.62);

        let mut scene = trip.session().scene();
        tokio::time::timeout(
            Duration::from_secs(2),
            scene.wait_for(|s| {
                s.marker(DRIVER_LABEL) == Some(here)
                    && s.viewport.map(|v| v.center) == Some(here)
            }),
        )
        .await
        .unwrap()
        .unwrap();

        let steps = trip.stop().await;
        assert_eq!(steps.first(), Some(&TeardownStep::ChannelClosed));
        assert_eq!(steps.last(), Some(&TeardownStep::MapReleased));
    }

    #[tokio::test]
    async fn refuses_orders_without_coordinates() {
        let hub = Arc::new(LocationHub::new(16));
        let deps = TrackingDeps {
            transport: hub,
            engine: Arc::new(StraightLineEngine::new(4)),
            metrics: Metrics::new(),
            settings: TrackingSettings::default(),
        };
        let mut order = order();
        order.pickup_location = None;

        let started = DriverTrip::start(
            "driverA",
            &order,
            Arc::new(ScriptedGeolocator::new([Err(GeolocationError::PermissionDenied)])),
            &deps,
        );
        assert!(started.is_err());
    }
}
