use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, warn};

use crate::error::GeolocationError;
use crate::models::coordinate::Coordinate;
use crate::observability::metrics::Metrics;

/// One-shot query for the device's current position.
#[async_trait]
pub trait Geolocator: Send + Sync + 'static {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError>;
}

/// Plays back a fixed list of fixes and failures, then repeats the last one.
pub struct ScriptedGeolocator {
    script: Mutex<VecDeque<Result<Coordinate, GeolocationError>>>,
    last: Mutex<Result<Coordinate, GeolocationError>>,
}

impl ScriptedGeolocator {
    pub fn new(script: impl IntoIterator<Item = Result<Coordinate, GeolocationError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(Err(GeolocationError::Unavailable(
                "no position scripted".to_string(),
            ))),
        }
    }
}

#[async_trait]
impl Geolocator for ScriptedGeolocator {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        let mut last = self.last.lock().await;
        if let Some(next) = self.script.lock().await.pop_front() {
            *last = next;
        }
        last.clone()
    }
}

/// Polls a [`Geolocator`] on a fixed interval.
///
/// The latest good fix is published on a watch channel that doubles as the
/// "current position" and "map center" state. A failed poll keeps the previous
/// value.
pub struct PositionSource {
    geolocator: Arc<dyn Geolocator>,
    every: Duration,
    query_timeout: Duration,
    metrics: Metrics,
}

impl PositionSource {
    pub fn new(
        geolocator: Arc<dyn Geolocator>,
        every: Duration,
        query_timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            geolocator,
            every,
            query_timeout,
            metrics,
        }
    }

    /// Queries once; returns whether the published position changed.
    pub async fn poll_once(&self, position: &watch::Sender<Option<Coordinate>>) -> bool {
        let outcome = match timeout(self.query_timeout, self.geolocator.current_position()).await {
            Ok(result) => result,
            Err(_) => Err(GeolocationError::Timeout),
        };

        match outcome.and_then(|c| {
            c.validate()
                .map_err(|err| GeolocationError::Unavailable(err.to_string()))
        }) {
            Ok(fix) => position.send_if_modified(|current| {
                if *current == Some(fix) {
                    false
                } else {
                    *current = Some(fix);
                    true
                }
            }),
            Err(err) => {
                self.metrics.geolocation_failures_total.inc();
                warn!(error = %err, "position query failed; keeping last known position");
                false
            }
        }
    }

    /// Starts polling, beginning immediately. The task ends once every
    /// receiver is gone.
    pub fn spawn(self) -> (watch::Receiver<Option<Coordinate>>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {
                        self.poll_once(&tx).await;
                    }
                }
            }
            debug!("position source stopped");
        });

        (rx, handle)
    }
}
