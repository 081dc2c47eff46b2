use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::channel::{
    ChannelEvent, Connection, DRIVER_LOCATION_EVENT, Transport, UPDATE_DRIVER_LOCATION_EVENT,
};
use crate::error::ChannelError;

type Rooms = Arc<DashMap<String, broadcast::Sender<ChannelEvent>>>;

/// In-process relay with one broadcast room per driver.
///
/// A `driverLocation` frame sent into a room reaches everyone in it as
/// `updateDriverLocation`. Payloads are relayed as-is. A room exists only
/// while someone is connected to it.
pub struct LocationHub {
    rooms: Rooms,
    buffer: usize,
}

impl LocationHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Joins a room, creating it if needed. Subscribes under the entry lock.
    fn join(&self, driver_id: &str) -> broadcast::Receiver<ChannelEvent> {
        self.rooms
            .entry(driver_id.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    /// Sends a client frame into a room. Returns how many connections received it.
    pub fn publish(&self, driver_id: &str, event: ChannelEvent) -> usize {
        relay_into(&self.rooms, driver_id, event)
    }

    /// Drops a room; every connection to it sees its stream end.
    pub fn disconnect(&self, driver_id: &str) -> bool {
        self.rooms.remove(driver_id).is_some()
    }

    pub fn rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn listeners(&self, driver_id: &str) -> usize {
        self.rooms
            .get(driver_id)
            .map(|room| room.receiver_count())
            .unwrap_or(0)
    }
}

fn release_room(rooms: &Rooms, driver_id: &str) {
    if rooms
        .remove_if(driver_id, |_, room| room.receiver_count() == 0)
        .is_some()
    {
        debug!(driver_id, "room released");
    }
}

/// Holds a room open for one connection; releases it once the last
/// listener is gone.
struct RoomLease {
    rooms: Rooms,
    driver_id: String,
}

impl Drop for RoomLease {
    fn drop(&mut self) {
        release_room(&self.rooms, &self.driver_id);
    }
}

/// The incoming side of a hub connection. `events` drops before `_lease`,
/// so the receiver is gone by the time the room is checked.
struct RoomStream {
    events: BoxStream<'static, ChannelEvent>,
    _lease: RoomLease,
}

impl Stream for RoomStream {
    type Item = ChannelEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChannelEvent>> {
        self.events.poll_next_unpin(cx)
    }
}

fn relay_into(rooms: &Rooms, driver_id: &str, event: ChannelEvent) -> usize {
    if !event.is(DRIVER_LOCATION_EVENT) {
        debug!(driver_id, event = %event.event, "ignoring unrelayed client event");
        return 0;
    }

    let Some(room) = rooms.get(driver_id).map(|room| room.clone()) else {
        debug!(driver_id, "no room for driver; location dropped");
        return 0;
    };

    room.send(ChannelEvent::new(UPDATE_DRIVER_LOCATION_EVENT, event.data))
        .unwrap_or(0)
}

#[async_trait]
impl Transport for LocationHub {
    async fn connect(&self, driver_id: &str) -> Result<Connection, ChannelError> {
        let events = BroadcastStream::new(self.join(driver_id))
            .filter_map(|result| async move {
                match result {
                    Ok(event) => Some(event),
                    Err(err) => {
                        warn!(error = %err, "location subscriber lagged");
                        None
                    }
                }
            })
            .boxed();
        let incoming = RoomStream {
            events,
            _lease: RoomLease {
                rooms: self.rooms.clone(),
                driver_id: driver_id.to_string(),
            },
        }
        .boxed();

        let (outgoing, mut outgoing_rx) = mpsc::channel::<ChannelEvent>(self.buffer);
        let rooms = self.rooms.clone();
        let driver_id = driver_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = outgoing_rx.recv().await {
                relay_into(&rooms, &driver_id, event);
            }
            release_room(&rooms, &driver_id);
        });

        Ok(Connection { outgoing, incoming })
    }
}
