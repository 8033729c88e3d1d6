use std::fmt;
use std::sync::Arc;

use artisan_shared::{Cluster, ClusterDescriptor, Gazetteer, Point, Viewport, cull};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::animation::FocusAnimator;
use crate::config::EngineConfig;
use crate::map::{MapEvent, MapProvider, ProviderError, Subscription};
use crate::viewport::cluster_click_target;

const SUBSCRIBED_EVENTS: [MapEvent; 2] = [MapEvent::BoundsChanged, MapEvent::ZoomChanged];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No map attached yet.
    Uninitialized,
    /// Listening for viewport changes.
    Ready,
    Recomputing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeReason {
    MapLoaded,
    BoundsChanged,
    ZoomChanged,
    PointsUpdated,
    ViewportSet,
    ClusterClick,
    DistrictFocus,
}

impl From<MapEvent> for RecomputeReason {
    fn from(event: MapEvent) -> Self {
        match event {
            MapEvent::BoundsChanged => Self::BoundsChanged,
            MapEvent::ZoomChanged => Self::ZoomChanged,
        }
    }
}

/// One complete clustering result. Replaced wholesale on every recompute.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    /// 0 until the first recompute publishes.
    pub seq: u64,
    pub reason: Option<RecomputeReason>,
    pub viewport: Viewport,
    /// False when every point was bucketed: the provider had no bounds, or
    /// the zoom is at the full-marker level.
    pub culled: bool,
    pub clusters: Vec<Cluster>,
    pub computed_at: DateTime<Utc>,
}

impl ClusterSnapshot {
    fn initial(viewport: Viewport) -> Self {
        Self {
            seq: 0,
            reason: None,
            viewport,
            culled: false,
            clusters: Vec::new(),
            computed_at: Utc::now(),
        }
    }

    pub fn descriptors(&self) -> Vec<ClusterDescriptor> {
        self.clusters.iter().map(Cluster::descriptor).collect()
    }

    /// Number of points represented across all clusters.
    pub fn point_count(&self) -> usize {
        self.clusters.iter().map(|cluster| cluster.count).sum()
    }

    pub fn find(&self, id: &str) -> Option<&Cluster> {
        self.clusters
            .iter()
            .find(|cluster| cluster.id.to_string() == id)
    }
}

pub enum Command {
    /// The map provider finished loading.
    Attach(Arc<dyn MapProvider>),
    Detach,
    MapEvent(MapEvent),
    SetPoints(Vec<Point>),
    /// Caller-driven move, e.g. a drag or zoom reported by the provider's on-change.
    SetViewport(Viewport),
    ClickCluster(String),
    FocusDistrict(String),
    FocusArrived {
        generation: u64,
        target: Viewport,
    },
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attach(_) => f.write_str("Attach"),
            Self::Detach => f.write_str("Detach"),
            Self::MapEvent(event) => write!(f, "MapEvent({event})"),
            Self::SetPoints(points) => write!(f, "SetPoints({} points)", points.len()),
            Self::SetViewport(viewport) => write!(f, "SetViewport({viewport:?})"),
            Self::ClickCluster(id) => write!(f, "ClickCluster({id})"),
            Self::FocusDistrict(name) => write!(f, "FocusDistrict({name})"),
            Self::FocusArrived { generation, .. } => write!(f, "FocusArrived({generation})"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to subscribe to {event}: {source}")]
    Subscribe {
        event: MapEvent,
        #[source]
        source: ProviderError,
    },
    #[error("clustering engine has shut down")]
    Closed,
}

enum Applied {
    Recompute(RecomputeReason),
    Nothing,
    Stop,
}

/// Cloneable front door to a running [`ClusterEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    published: watch::Receiver<Arc<ClusterSnapshot>>,
}

impl EngineHandle {
    pub fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands.send(command).map_err(|_| EngineError::Closed)
    }

    pub fn map_loaded(&self, map: Arc<dyn MapProvider>) -> Result<(), EngineError> {
        self.send(Command::Attach(map))
    }

    pub fn set_points(&self, points: Vec<Point>) -> Result<(), EngineError> {
        self.send(Command::SetPoints(points))
    }

    pub fn set_viewport(&self, viewport: Viewport) -> Result<(), EngineError> {
        self.send(Command::SetViewport(viewport))
    }

    pub fn click_cluster(&self, id: impl Into<String>) -> Result<(), EngineError> {
        self.send(Command::ClickCluster(id.into()))
    }

    pub fn focus_district(&self, name: impl Into<String>) -> Result<(), EngineError> {
        self.send(Command::FocusDistrict(name.into()))
    }

    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.send(Command::Shutdown)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterSnapshot>> {
        self.published.clone()
    }

    pub fn latest(&self) -> Arc<ClusterSnapshot> {
        Arc::clone(&self.published.borrow())
    }
}

/// Recompute scheduler: owns the viewport and the published cluster list for
/// one map, and re-buckets the point set whenever either changes.
pub struct ClusterEngine {
    config: EngineConfig,
    gazetteer: Gazetteer,
    map: Option<Arc<dyn MapProvider>>,
    subscriptions: Vec<Subscription>,
    state: SchedulerState,
    viewport: Viewport,
    points: Vec<Point>,
    seq: u64,
    focus: FocusAnimator,
    published: watch::Sender<Arc<ClusterSnapshot>>,
    /// Dropped when `run` starts, so the loop ends once every handle is gone.
    commands_tx: Option<mpsc::UnboundedSender<Command>>,
    /// Used by map listeners and focus timers; never keeps the engine alive.
    commands_weak: mpsc::WeakUnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
}

impl ClusterEngine {
    pub fn new(config: EngineConfig) -> Self {
        let viewport = config.default_viewport;
        let (published, _) = watch::channel(Arc::new(ClusterSnapshot::initial(viewport)));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let commands_weak = commands_tx.downgrade();
        Self {
            config,
            gazetteer: Gazetteer::default(),
            map: None,
            subscriptions: Vec::new(),
            state: SchedulerState::Uninitialized,
            viewport,
            points: Vec::new(),
            seq: 0,
            focus: FocusAnimator::default(),
            published,
            commands_tx: Some(commands_tx),
            commands_weak,
            commands_rx,
        }
    }

    pub fn with_gazetteer(mut self, gazetteer: Gazetteer) -> Self {
        self.gazetteer = gazetteer;
        self
    }

    /// A handle to this engine. Handles keep a running engine alive; once
    /// the last one is dropped, `run` tears down and returns.
    pub fn handle(&self) -> EngineHandle {
        let commands = self
            .commands_tx
            .clone()
            .or_else(|| self.commands_weak.upgrade())
            // The engine has stopped; sends on this handle report `Closed`.
            .unwrap_or_else(|| mpsc::unbounded_channel().0);
        EngineHandle {
            commands,
            published: self.published.subscribe(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn latest(&self) -> Arc<ClusterSnapshot> {
        Arc::clone(&self.published.borrow())
    }

    /// Attach to a loaded map: subscribe to its viewport notifications and
    /// publish the first clustering.
    pub fn attach(&mut self, map: Arc<dyn MapProvider>) -> Result<(), EngineError> {
        self.connect(map)?;
        self.recompute(RecomputeReason::MapLoaded);
        Ok(())
    }

    /// Remove every listener from the map and stop recomputing.
    pub fn teardown(&mut self) {
        if self.map.is_none() {
            return;
        }
        let released = self.subscriptions.len();
        self.subscriptions.clear();
        self.map = None;
        self.focus.cancel();
        self.state = SchedulerState::Uninitialized;
        info!(released, "detached clustering engine from map");
    }

    pub fn set_points(&mut self, points: Vec<Point>) {
        self.apply_now(Command::SetPoints(points));
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.apply_now(Command::SetViewport(viewport));
    }

    pub fn notify(&mut self, event: MapEvent) {
        self.apply_now(Command::MapEvent(event));
    }

    /// Zoom into a cluster from the latest result. Returns the new viewport,
    /// or `None` when `id` is a plain marker or no longer published.
    pub fn click_cluster(&mut self, id: &str) -> Option<Viewport> {
        let target = self.cluster_target(id)?;
        self.apply_now(Command::ClickCluster(id.to_string()));
        Some(target)
    }

    /// Reset to the default view now and move onto `district` after the
    /// focus delay. Needs a tokio runtime for the delayed step.
    pub fn focus_district(&mut self, district: &str) {
        self.apply_now(Command::FocusDistrict(district.to_string()));
    }

    /// Handle every queued command as one batch with at most one recompute.
    /// Returns false once a shutdown was processed; the engine is then
    /// detached.
    pub fn process_pending(&mut self) -> bool {
        match self.commands_rx.try_recv() {
            Ok(command) => self.apply_now(command),
            Err(_) => true,
        }
    }

    /// Drive the engine until a `Shutdown` command arrives or every
    /// [`EngineHandle`] has been dropped.
    pub async fn run(mut self) {
        info!("clustering engine started");
        self.commands_tx = None;
        while let Some(command) = self.commands_rx.recv().await {
            if !self.apply_batch(command) {
                break;
            }
        }
        self.teardown();
        info!("clustering engine stopped");
    }

    /// Re-read zoom, center and bounds from the map, cull, bucket and publish.
    ///
    /// Returns false when nothing was published: no map attached yet, or the
    /// provider could not report a zoom level. Missing bounds only disables
    /// culling.
    pub fn recompute(&mut self, reason: RecomputeReason) -> bool {
        let Some(map) = self.map.clone() else {
            debug!(?reason, "no map attached; skipping recompute");
            return false;
        };
        let zoom = match map.zoom() {
            Ok(zoom) => zoom,
            Err(e) => {
                debug!(?reason, error = %e, "zoom unavailable; waiting for next event");
                return false;
            }
        };
        let bounds = map
            .bounds()
            .ok()
            .filter(|_| self.config.grid.culls_at(zoom));

        self.state = SchedulerState::Recomputing;
        self.viewport.zoom = zoom;
        if let Ok(center) = map.center() {
            self.viewport.center = center;
        }

        let visible = cull(&self.points, bounds.as_ref());
        let visible_count = visible.len();
        let clusters = self.config.grid.bucket(visible.iter().copied(), zoom);

        self.seq += 1;
        debug!(
            seq = self.seq,
            ?reason,
            zoom,
            points = self.points.len(),
            visible = visible_count,
            clusters = clusters.len(),
            "recomputed clusters"
        );
        self.published.send_replace(Arc::new(ClusterSnapshot {
            seq: self.seq,
            reason: Some(reason),
            viewport: self.viewport,
            culled: bounds.is_some(),
            clusters,
            computed_at: Utc::now(),
        }));
        self.state = SchedulerState::Ready;
        true
    }

    /// Subscribe to `map` and make it the attached map. On failure the
    /// previously attached map, if any, stays attached.
    fn connect(&mut self, map: Arc<dyn MapProvider>) -> Result<(), EngineError> {
        let mut subscriptions = Vec::with_capacity(SUBSCRIBED_EVENTS.len());
        for event in SUBSCRIBED_EVENTS {
            let tx = self.commands_weak.clone();
            let callback = Box::new(move || {
                if let Some(tx) = tx.upgrade() {
                    let _ = tx.send(Command::MapEvent(event));
                }
            });
            match Subscription::register(&map, event, callback) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(source) => {
                    warn!(%event, error = %source, "failed to subscribe to map event");
                    return Err(EngineError::Subscribe { event, source });
                }
            }
        }

        self.teardown();
        if let Ok(viewport) = map.viewport() {
            self.viewport = viewport;
        }
        self.subscriptions = subscriptions;
        self.map = Some(map);
        self.state = SchedulerState::Ready;
        info!(
            listeners = self.subscriptions.len(),
            "attached clustering engine to map"
        );
        Ok(())
    }

    /// Apply `command` together with everything already queued, including
    /// the notifications the provider raised for our own moves.
    fn apply_now(&mut self, command: Command) -> bool {
        let running = self.apply_batch(command);
        if !running {
            self.teardown();
        }
        running
    }

    /// The first trigger in a batch names the recompute; later ones are
    /// usually the provider echoing that move.
    fn apply_batch(&mut self, first: Command) -> bool {
        let mut pending = None;
        let mut next = Some(first);
        while let Some(command) = next {
            match self.apply(command) {
                Applied::Recompute(reason) => {
                    pending.get_or_insert(reason);
                }
                Applied::Nothing => {}
                Applied::Stop => return false,
            }
            next = self.commands_rx.try_recv().ok();
        }
        if let Some(reason) = pending {
            self.recompute(reason);
        }
        true
    }

    fn apply(&mut self, command: Command) -> Applied {
        match command {
            Command::Attach(map) => match self.connect(map) {
                Ok(()) => Applied::Recompute(RecomputeReason::MapLoaded),
                Err(e) => {
                    warn!(error = %e, "map attach failed");
                    Applied::Nothing
                }
            },
            Command::Detach => {
                self.teardown();
                Applied::Nothing
            }
            Command::MapEvent(event) => {
                let Some(map) = self.map.as_ref() else {
                    return Applied::Nothing;
                };
                if let Ok(viewport) = map.viewport() {
                    self.viewport = viewport;
                }
                Applied::Recompute(event.into())
            }
            Command::SetPoints(points) => {
                self.points = points;
                Applied::Recompute(RecomputeReason::PointsUpdated)
            }
            Command::SetViewport(viewport) => {
                self.focus.cancel();
                self.move_to(viewport);
                Applied::Recompute(RecomputeReason::ViewportSet)
            }
            Command::ClickCluster(id) => match self.cluster_target(&id) {
                Some(target) => {
                    self.focus.cancel();
                    self.move_to(target);
                    Applied::Recompute(RecomputeReason::ClusterClick)
                }
                None => {
                    debug!(cluster = %id, "click on non-expandable marker ignored");
                    Applied::Nothing
                }
            },
            Command::FocusDistrict(name) => {
                self.begin_focus(&name);
                Applied::Recompute(RecomputeReason::DistrictFocus)
            }
            Command::FocusArrived { generation, target } => {
                if !self.focus.is_current(generation) {
                    debug!(generation, "superseded district focus dropped");
                    return Applied::Nothing;
                }
                self.move_to(target);
                Applied::Recompute(RecomputeReason::DistrictFocus)
            }
            Command::Shutdown => Applied::Stop,
        }
    }

    fn begin_focus(&mut self, district: &str) {
        let plan = self.focus.plan(district, &self.gazetteer, &self.config);
        self.move_to(plan.immediate);

        let Some(pending) = plan.pending else {
            debug!(district, "district not in gazetteer; staying at default view");
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(district, "no async runtime; district focus stops at default view");
            return;
        };
        let tx = self.commands_weak.clone();
        runtime.spawn(async move {
            tokio::time::sleep(pending.delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::FocusArrived {
                    generation: pending.generation,
                    target: pending.target,
                });
            }
        });
    }

    fn cluster_target(&self, id: &str) -> Option<Viewport> {
        let latest = self.published.borrow();
        let cluster = latest.find(id)?;
        cluster_click_target(self.viewport.zoom, cluster, &self.config)
    }

    fn move_to(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        if let Some(map) = self.map.as_ref() {
            map.set_viewport(viewport);
        }
    }
}
