use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, Transport};
use crate::observability::metrics::Metrics;

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt > max)
    }
}

#[derive(Clone)]
pub struct LinkOptions {
    pub policy: ReconnectPolicy,
    pub buffer: usize,
    pub metrics: Metrics,
}

/// A reconnecting connection to one channel room.
///
/// Frames are delivered in transport order. Dropping the link stops the pump;
/// nothing is delivered afterwards.
pub struct ChannelLink {
    room: String,
    events: mpsc::Receiver<ChannelEvent>,
    outgoing: mpsc::Sender<ChannelEvent>,
    pump: JoinHandle<()>,
}

impl ChannelLink {
    pub fn open(transport: Arc<dyn Transport>, room: impl Into<String>, options: LinkOptions) -> Self {
        let room = room.into();
        let buffer = options.buffer.max(1);
        let (events_tx, events) = mpsc::channel(buffer);
        let (outgoing, outgoing_rx) = mpsc::channel(buffer);

        let pump = tokio::spawn(run_pump(
            transport,
            room.clone(),
            options.policy,
            options.metrics,
            events_tx,
            outgoing_rx,
        ));

        Self {
            room,
            events,
            outgoing,
            pump,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Next incoming frame; `None` once the link has given up reconnecting.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    pub fn emitter(&self) -> mpsc::Sender<ChannelEvent> {
        self.outgoing.clone()
    }

    pub fn close(self) {}
}

impl Drop for ChannelLink {
    fn drop(&mut self) {
        self.pump.abort();
        debug!(room = %self.room, "channel link closed");
    }
}

async fn run_pump(
    transport: Arc<dyn Transport>,
    room: String,
    policy: ReconnectPolicy,
    metrics: Metrics,
    events_tx: mpsc::Sender<ChannelEvent>,
    mut outgoing_rx: mpsc::Receiver<ChannelEvent>,
) {
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            if policy.exhausted(attempt) {
                warn!(room = %room, attempt, "giving up on channel reconnect");
                return;
            }
            let delay = policy.delay_for(attempt);
            debug!(room = %room, attempt, delay_ms = delay.as_millis() as u64, "reconnecting channel");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = events_tx.closed() => return,
            }
            metrics.channel_reconnects_total.inc();
        }

        let mut connection = match transport.connect(&room).await {
            Ok(connection) => {
                if attempt > 0 {
                    info!(room = %room, attempt, "channel reconnected");
                }
                attempt = 0;
                connection
            }
            Err(err) => {
                warn!(room = %room, error = %err, "channel connect failed");
                attempt += 1;
                continue;
            }
        };

        let mut outgoing_open = true;
        loop {
            tokio::select! {
                _ = events_tx.closed() => return,
                incoming = connection.incoming.next() => match incoming {
                    Some(event) => {
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        warn!(room = %room, "channel disconnected");
                        break;
                    }
                },
                outgoing = outgoing_rx.recv(), if outgoing_open => match outgoing {
                    Some(event) => {
                        if connection.outgoing.send(event).await.is_err() {
                            warn!(room = %room, "channel disconnected while sending");
                            break;
                        }
                    }
                    None => outgoing_open = false,
                },
            }
        }

        attempt = 1;
    }
}
