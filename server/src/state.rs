use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use artisan_shared::{Gazetteer, GridConfig, Point, PointsState};
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::warn;

use crate::config::{
    cluster_cell_scale, sse_broadcast_buffer, upstream_connect_timeout, upstream_http_timeout,
};

/// Pre-serialized SSE event, serialized once by the loader and shared by all clients.
#[derive(Debug, Clone)]
pub enum PreSerializedEvent {
    Snapshot { seq: u64, json: Arc<Bytes> },
}

/// The artisan point set currently served to map clients.
#[derive(Debug, Clone)]
pub struct LivePoints {
    pub seq: u64,
    pub timestamp: String,
    pub points: Arc<Vec<Point>>,
    /// CRC32 of the last upstream body, used to skip unchanged refreshes.
    pub checksum: Option<u32>,
    pub snapshot_json: Arc<Bytes>,
    pub state_json: Arc<Bytes>,
}

impl Default for LivePoints {
    fn default() -> Self {
        let seq = 0;
        let timestamp = Utc::now().to_rfc3339();
        let state_json = serde_json::to_vec(&PointsState {
            seq,
            timestamp: timestamp.clone(),
            points: Vec::new(),
        })
        .map(Bytes::from)
        .unwrap_or_else(|_| Bytes::from_static(br#"{"seq":0,"timestamp":"","points":[]}"#));

        Self {
            seq,
            timestamp,
            points: Arc::new(Vec::new()),
            checksum: None,
            snapshot_json: Arc::new(Bytes::new()),
            state_json: Arc::new(state_json),
        }
    }
}

/// District boundary overlay lifecycle.
#[derive(Debug, Clone, Default)]
pub enum BoundaryState {
    /// `BOUNDARIES_URL` is unset.
    #[default]
    Disabled,
    Pending,
    Loaded {
        json: Arc<Bytes>,
        districts: Vec<String>,
    },
    Failed {
        error: String,
    },
}

impl BoundaryState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Pending => "pending",
            Self::Loaded { .. } => "loaded",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub live_points: Arc<RwLock<LivePoints>>,
    pub next_seq: Arc<AtomicU64>,
    pub event_tx: broadcast::Sender<PreSerializedEvent>,
    pub boundaries: Arc<RwLock<BoundaryState>>,
    pub gazetteer: Arc<Gazetteer>,
    pub grid: GridConfig,
    pub http_client: reqwest::Client,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    cluster_requests_total: AtomicU64,
    points_refreshes_total: AtomicU64,
    points_fetch_failures_total: AtomicU64,
    boundary_fetch_failures_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObservabilitySnapshot {
    pub cluster_requests_total: u64,
    pub points_refreshes_total: u64,
    pub points_fetch_failures_total: u64,
    pub boundary_fetch_failures_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            cluster_requests_total: self.cluster_requests_total.load(Ordering::Relaxed),
            points_refreshes_total: self.points_refreshes_total.load(Ordering::Relaxed),
            points_fetch_failures_total: self.points_fetch_failures_total.load(Ordering::Relaxed),
            boundary_fetch_failures_total: self
                .boundary_fetch_failures_total
                .load(Ordering::Relaxed),
        }
    }

    pub fn record_cluster_request(&self) {
        self.cluster_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_points_refresh(&self) {
        self.points_refreshes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_points_fetch_failure(&self) {
        self.points_fetch_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_boundary_fetch_failure(&self) {
        self.boundary_fetch_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::with_gazetteer(Gazetteer::punjab())
    }

    pub fn with_gazetteer(gazetteer: Gazetteer) -> Self {
        let (event_tx, _) = broadcast::channel(sse_broadcast_buffer());
        let request_timeout = upstream_http_timeout();
        let connect_timeout = upstream_connect_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent("artisan-map/0.1")
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(
                    error = %e,
                    "failed to build configured HTTP client, falling back to defaults"
                );
                reqwest::Client::new()
            });
        Self {
            live_points: Arc::new(RwLock::new(LivePoints::default())),
            next_seq: Arc::new(AtomicU64::new(0)),
            event_tx,
            boundaries: Arc::new(RwLock::new(BoundaryState::default())),
            gazetteer: Arc::new(gazetteer),
            grid: GridConfig {
                cell_scale: cluster_cell_scale(),
                ..GridConfig::default()
            },
            http_client,
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
