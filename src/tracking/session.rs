use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{MapError, PayloadError, RoutingError};
use crate::map::backend::Viewport;
use crate::map::scene::{SceneMap, SceneSnapshot};
use crate::map::surface::MapSurface;
use crate::models::coordinate::Coordinate;
use crate::observability::metrics::Metrics;
use crate::routing::overlay::RouteOverlay;
use crate::routing::{Route, RouteEngine};
use crate::tracking::subscriber::LocationSubscriber;

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStep {
    ChannelClosed,
    RouteCancelled,
    OverlayRemoved,
    MapReleased,
}

#[derive(Debug)]
enum SessionCommand {
    Recenter(Coordinate),
}

/// Where driver positions come from.
pub enum PositionFeed {
    /// Pushed over the real-time channel.
    Remote(LocationSubscriber),
    /// The device's own position source.
    Local(watch::Receiver<Option<Coordinate>>),
    Idle,
}

enum FeedUpdate {
    Position(Coordinate),
    Malformed(PayloadError),
    Ended,
}

impl PositionFeed {
    fn is_idle(&self) -> bool {
        matches!(self, PositionFeed::Idle)
    }

    async fn next(&mut self) -> FeedUpdate {
        match self {
            PositionFeed::Remote(subscriber) => match subscriber.next().await {
                Some(Ok(position)) => FeedUpdate::Position(position.coordinate),
                Some(Err(err)) => FeedUpdate::Malformed(err),
                None => FeedUpdate::Ended,
            },
            PositionFeed::Local(positions) => loop {
                if positions.changed().await.is_err() {
                    return FeedUpdate::Ended;
                }
                if let Some(position) = *positions.borrow_and_update() {
                    return FeedUpdate::Position(position);
                }
            },
            PositionFeed::Idle => std::future::pending().await,
        }
    }

    fn close(self) {
        match self {
            PositionFeed::Remote(subscriber) => subscriber.close(),
            PositionFeed::Local(_) | PositionFeed::Idle => {}
        }
    }
}

/// The position feed of a session plus any tasks that live and die with it.
pub struct SessionFeed {
    pub feed: PositionFeed,
    pub companions: Vec<JoinHandle<()>>,
}

impl SessionFeed {
    pub fn idle() -> Self {
        Self {
            feed: PositionFeed::Idle,
            companions: Vec::new(),
        }
    }
}

pub struct SessionConfig {
    pub order_id: String,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    pub viewport: Viewport,
    /// Re-center on every driver position.
    pub follow_driver: bool,
    pub engine: Arc<dyn RouteEngine>,
    pub metrics: Metrics,
}

/// Handle to one mounted map session.
///
/// The session itself runs as a single task that owns the surface, the feed,
/// the overlay and the in-flight route computation.
pub struct MapSession {
    id: Uuid,
    order_id: String,
    subscribed: bool,
    scene: watch::Receiver<SceneSnapshot>,
    commands: mpsc::Sender<SessionCommand>,
    /// Fired or dropped to stop the actor. Never blocked by queued commands.
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Vec<TeardownStep>>>,
}

impl MapSession {
    /// Creates the map and its static markers, then opens the feed.
    pub fn start(
        config: SessionConfig,
        open_feed: impl FnOnce() -> SessionFeed,
    ) -> Result<Self, MapError> {
        let map = SceneMap::new();
        let scene = map.subscribe();
        let mut surface = MapSurface::new(map);
        surface.create(config.viewport, config.pickup, config.dropoff)?;

        let SessionFeed { feed, companions } = open_feed();
        let subscribed = matches!(feed, PositionFeed::Remote(_));

        let id = Uuid::new_v4();
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (stop, stop_rx) = oneshot::channel();
        config.metrics.tracking_sessions_active.inc();
        info!(session_id = %id, order_id = %config.order_id, subscribed, "map session started");

        let actor = SessionActor {
            session_id: id,
            order_id: config.order_id.clone(),
            pickup: config.pickup,
            dropoff: config.dropoff,
            follow_driver: config.follow_driver,
            surface,
            overlay: RouteOverlay::new(),
            feed,
            companions,
            current: None,
            pending: None,
            engine: config.engine,
            metrics: config.metrics,
        };
        let task = tokio::spawn(actor.run(commands_rx, stop_rx));

        Ok(Self {
            id,
            order_id: config.order_id,
            subscribed,
            scene,
            commands,
            stop: Some(stop),
            task: Some(task),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn scene(&self) -> watch::Receiver<SceneSnapshot> {
        self.scene.clone()
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        self.scene.borrow().clone()
    }

    pub async fn recenter(&self, center: Coordinate) -> bool {
        self.commands
            .send(SessionCommand::Recenter(center))
            .await
            .is_ok()
    }

    /// Tears the session down and reports what was released, in order.
    pub async fn close(mut self) -> Vec<TeardownStep> {
        let Some(task) = self.task.take() else {
            return Vec::new();
        };
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        match task.await {
            Ok(steps) => steps,
            Err(err) => {
                error!(session_id = %self.id, error = %err, "map session task failed");
                Vec::new()
            }
        }
    }
}

impl Drop for MapSession {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            debug!(session_id = %self.id, "map session dropped without close");
            let _ = stop.send(());
        }
    }
}

struct PendingRoute {
    handle: JoinHandle<Result<Route, RoutingError>>,
    started: Instant,
}

struct RouteOutcome {
    joined: Result<Result<Route, RoutingError>, JoinError>,
    elapsed_secs: f64,
}

async fn wait_route(pending: &mut Option<PendingRoute>) -> RouteOutcome {
    let Some(route) = pending.as_mut() else {
        return std::future::pending().await;
    };
    let joined = (&mut route.handle).await;
    let elapsed_secs = route.started.elapsed().as_secs_f64();
    *pending = None;

    RouteOutcome {
        joined,
        elapsed_secs,
    }
}

struct SessionActor {
    session_id: Uuid,
    order_id: String,
    pickup: Coordinate,
    dropoff: Coordinate,
    follow_driver: bool,
    surface: MapSurface<SceneMap>,
    overlay: RouteOverlay,
    feed: PositionFeed,
    companions: Vec<JoinHandle<()>>,
    current: Option<Coordinate>,
    pending: Option<PendingRoute>,
    engine: Arc<dyn RouteEngine>,
    metrics: Metrics,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut stop: oneshot::Receiver<()>,
    ) -> Vec<TeardownStep> {
        self.request_route();

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                command = commands.recv() => match command {
                    Some(SessionCommand::Recenter(center)) => self.surface.recenter(center),
                    None => break,
                },
                update = self.feed.next() => self.apply_feed(update),
                outcome = wait_route(&mut self.pending) => self.apply_route(outcome),
            }
        }

        self.teardown()
    }

    fn apply_feed(&mut self, update: FeedUpdate) {
        match update {
            FeedUpdate::Position(position) => {
                self.metrics
                    .position_events_total
                    .with_label_values(&["applied"])
                    .inc();
                self.surface.update_driver_marker(position);
                if self.follow_driver {
                    self.surface.recenter(position);
                }
                if self.current != Some(position) {
                    self.current = Some(position);
                    self.request_route();
                }
            }
            FeedUpdate::Malformed(err) => {
                self.metrics
                    .position_events_total
                    .with_label_values(&["malformed"])
                    .inc();
                warn!(order_id = %self.order_id, error = %err, "discarding driver position");
            }
            FeedUpdate::Ended => {
                warn!(order_id = %self.order_id, "driver position feed ended");
                self.feed = PositionFeed::Idle;
            }
        }
    }

    fn request_route(&mut self) {
        if !self.surface.is_live() {
            return;
        }

        if let Some(superseded) = self.pending.take() {
            superseded.handle.abort();
            debug!(order_id = %self.order_id, "superseded in-flight route computation");
        }

        let waypoints = RouteOverlay::plan(self.current, self.pickup, self.dropoff);
        if waypoints.len() < 2 {
            debug!(order_id = %self.order_id, "waypoints collapse to a point; no route");
            self.overlay.remove(&mut self.surface);
            return;
        }

        let engine = self.engine.clone();
        let handle = tokio::spawn(async move { engine.route(&waypoints).await });
        self.pending = Some(PendingRoute {
            handle,
            started: Instant::now(),
        });
    }

    fn apply_route(&mut self, outcome: RouteOutcome) {
        match outcome.joined {
            Ok(Ok(route)) => match self.overlay.replace(&mut self.surface, &route) {
                Ok(()) => {
                    self.metrics.record_route("success", outcome.elapsed_secs);
                    info!(
                        order_id = %self.order_id,
                        engine = self.engine.name(),
                        waypoints = route.waypoints.len(),
                        distance_km = route.distance_km,
                        "route overlay rebuilt"
                    );
                }
                Err(err) => {
                    self.metrics.record_route("error", outcome.elapsed_secs);
                    warn!(order_id = %self.order_id, error = %err, "failed to draw route overlay");
                }
            },
            Ok(Err(err)) => {
                self.metrics.record_route("error", outcome.elapsed_secs);
                warn!(order_id = %self.order_id, error = %err, "route computation failed; keeping previous overlay");
            }
            Err(err) => {
                self.metrics.record_route("error", outcome.elapsed_secs);
                error!(order_id = %self.order_id, error = %err, "route task failed");
            }
        }
    }

    fn teardown(mut self) -> Vec<TeardownStep> {
        let mut steps = Vec::with_capacity(4);

        let feed = std::mem::replace(&mut self.feed, PositionFeed::Idle);
        let had_channel = !feed.is_idle() || !self.companions.is_empty();
        feed.close();
        for companion in self.companions.drain(..) {
            companion.abort();
        }
        if had_channel {
            steps.push(TeardownStep::ChannelClosed);
        }

        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
            steps.push(TeardownStep::RouteCancelled);
        }

        if self.overlay.remove(&mut self.surface) {
            steps.push(TeardownStep::OverlayRemoved);
        }

        if self.surface.destroy() {
            steps.push(TeardownStep::MapReleased);
        }

        self.metrics.tracking_sessions_active.dec();
        info!(session_id = %self.session_id, order_id = %self.order_id, ?steps, "map session torn down");
        steps
    }
}
