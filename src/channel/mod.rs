pub mod hub;
pub mod link;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::models::coordinate::Coordinate;
use crate::models::position::LocationPayload;

/// Emitted by a driver's client with its current position.
pub const DRIVER_LOCATION_EVENT: &str = "driverLocation";
/// Delivered to observers of a driver.
pub const UPDATE_DRIVER_LOCATION_EVENT: &str = "updateDriverLocation";

/// One frame on the real-time channel: `{"event": name, "data": payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ChannelEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn driver_location(position: Coordinate) -> Self {
        Self::new(
            DRIVER_LOCATION_EVENT,
            serde_json::to_value(LocationPayload::from(position)).unwrap_or(Value::Null),
        )
    }

    pub fn is(&self, name: &str) -> bool {
        self.event == name
    }
}

/// A live connection to one room of the channel. The incoming stream ends
/// when the connection drops.
pub struct Connection {
    pub outgoing: mpsc::Sender<ChannelEvent>,
    pub incoming: BoxStream<'static, ChannelEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connects to the room of `driver_id`.
    async fn connect(&self, driver_id: &str) -> Result<Connection, ChannelError>;
}
