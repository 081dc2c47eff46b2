use std::sync::Arc;

use chrono::Utc;
use tracing::{info, trace};

use crate::channel::link::{ChannelLink, LinkOptions};
use crate::channel::{Transport, UPDATE_DRIVER_LOCATION_EVENT};
use crate::error::PayloadError;
use crate::models::order::Order;
use crate::models::position::{LiveDriverPosition, LocationPayload};

/// Receives position events for the driver of one order.
pub struct LocationSubscriber {
    order_id: String,
    driver_id: String,
    link: ChannelLink,
}

impl LocationSubscriber {
    /// `None` when the order has no driver to listen for.
    pub fn open(order: &Order, transport: Arc<dyn Transport>, options: LinkOptions) -> Option<Self> {
        let driver_id = order.driver_id()?.to_string();
        let link = ChannelLink::open(transport, driver_id.clone(), options);
        info!(order_id = %order.id, driver_id = %driver_id, "subscribed to driver location");

        Some(Self {
            order_id: order.id.clone(),
            driver_id,
            link,
        })
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    /// Next driver position, or the reason the payload was unusable. `None`
    /// once the channel is gone for good.
    pub async fn next(&mut self) -> Option<Result<LiveDriverPosition, PayloadError>> {
        loop {
            let event = self.link.recv().await?;
            if !event.is(UPDATE_DRIVER_LOCATION_EVENT) {
                trace!(event = %event.event, "ignoring channel event");
                continue;
            }

            return Some(LocationPayload::parse(&event.data).map(|coordinate| {
                LiveDriverPosition {
                    order_id: self.order_id.clone(),
                    driver_id: self.driver_id.clone(),
                    coordinate,
                    received_at: Utc::now(),
                }
            }));
        }
    }

    pub fn close(self) {
        info!(order_id = %self.order_id, driver_id = %self.driver_id, "driver location subscription closed");
        self.link.close();
    }
}
