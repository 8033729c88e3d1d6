use serde::{Deserialize, Serialize};

use crate::cluster::ClusterDescriptor;
use crate::point::Point;

/// Events pushed to map clients whenever the artisan point set is refreshed.
///
/// A client treats every snapshot as a trigger to recompute its clusters
/// under the current viewport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PointsEvent {
    Snapshot {
        #[serde(default)]
        seq: u64,
        points: Vec<Point>,
        timestamp: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsState {
    pub seq: u64,
    pub timestamp: String,
    pub points: Vec<Point>,
}

/// Server-side clustering result for one zoom/bounds query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResponse {
    pub seq: u64,
    pub zoom: u8,
    pub culled: bool,
    pub clusters: Vec<ClusterDescriptor>,
}
