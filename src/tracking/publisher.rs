use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace};

use crate::channel::link::{ChannelLink, LinkOptions};
use crate::channel::{ChannelEvent, Transport};
use crate::models::coordinate::Coordinate;

/// Pushes the driver's current position to the channel.
///
/// Emits on every change and again on every tick, so observers may see the
/// same position more than once.
pub struct LocationPublisher {
    link: ChannelLink,
    every: Duration,
}

impl LocationPublisher {
    pub fn new(
        driver_id: &str,
        transport: Arc<dyn Transport>,
        options: LinkOptions,
        every: Duration,
    ) -> Self {
        Self {
            link: ChannelLink::open(transport, driver_id, options),
            every,
        }
    }

    pub fn spawn(self, positions: watch::Receiver<Option<Coordinate>>) -> JoinHandle<()> {
        tokio::spawn(self.run(positions))
    }

    async fn run(self, mut positions: watch::Receiver<Option<Coordinate>>) {
        let mut link = self.link;
        let emitter = link.emitter();
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = positions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
                // The room echoes our own frames back; drain them.
                incoming = link.recv() => match incoming {
                    Some(event) => {
                        trace!(event = %event.event, "discarding inbound frame");
                        continue;
                    }
                    None => break,
                },
            }

            let current = *positions.borrow_and_update();
            let Some(position) = current else {
                continue;
            };

            trace!(room = %link.room(), lat = position.lat, lng = position.lng, "emitting driver location");
            if emitter.send(ChannelEvent::driver_location(position)).await.is_err() {
                break;
            }
        }

        debug!(room = %link.room(), "location publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::sync::watch;

    use super::LocationPublisher;
    use crate::channel::hub::LocationHub;
    use crate::channel::link::{LinkOptions, ReconnectPolicy};
    use crate::channel::{Transport, UPDATE_DRIVER_LOCATION_EVENT};
    use crate::models::coordinate::Coordinate;
    use crate::observability::metrics::Metrics;

    #[tokio::test]
    async fn emits_positions_to_the_driver_room() {
        let hub = Arc::new(LocationHub::new(16));
        let mut observer = hub.connect("driverA").await.unwrap();

        let (tx, rx) = watch::channel(None);
        let publisher = LocationPublisher::new(
            "driverA",
            hub.clone(),
            LinkOptions {
                policy: ReconnectPolicy::default(),
                buffer: 16,
                metrics: Metrics::new(),
            },
            Duration::from_secs(60),
        );
        let handle = publisher.spawn(rx);

        tx.send_replace(Some(Coordinate {
            lat: 28.62,
            lng: 77.22,
        }));

        let event = tokio::time::timeout(Duration::from_secs(2), observer.incoming.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event, UPDATE_DRIVER_LOCATION_EVENT);
        assert_eq!(event.data["lat"], 28.62);
        assert_eq!(event.data["lng"], 77.22);

        drop(tx);
        handle.await.unwrap();
    }
}
