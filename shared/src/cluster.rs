use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::point::Point;

/// Smallest rendered marker, in pixels.
pub const MIN_MARKER_SIZE: u32 = 32;
/// Largest rendered marker, in pixels.
pub const MAX_MARKER_SIZE: u32 = 60;
const MARKER_PX_PER_POINT: usize = 3;

/// Grid cell coordinates: `(floor(lng / grid_size), floor(lat / grid_size))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i64,
    pub y: i64,
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.x, self.y)
    }
}

/// Identity of an emitted cluster. Only stable for a fixed zoom level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClusterId {
    Cell(CellKey),
    Point(String),
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell(key) => key.fmt(f),
            Self::Point(id) => f.write_str(id),
        }
    }
}

impl Serialize for ClusterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One bucket of points. `is_cluster` is false exactly when `count == 1`;
/// such a marker sits at its point's raw coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: ClusterId,
    pub lat: f64,
    pub lng: f64,
    pub count: usize,
    pub is_cluster: bool,
    pub items: Vec<Point>,
}

impl Cluster {
    pub(crate) fn marker(point: &Point) -> Self {
        Self {
            id: ClusterId::Point(point.id.clone()),
            lat: point.lat,
            lng: point.lng,
            count: 1,
            is_cluster: false,
            items: vec![point.clone()],
        }
    }

    pub fn size(&self) -> u32 {
        marker_size(self.count)
    }

    pub fn descriptor(&self) -> ClusterDescriptor {
        ClusterDescriptor {
            id: self.id.to_string(),
            lat: self.lat,
            lng: self.lng,
            count: self.count,
            is_cluster: self.is_cluster,
            size: self.size(),
        }
    }
}

/// What the renderer needs to place one marker, without cluster internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub count: usize,
    pub is_cluster: bool,
    pub size: u32,
}

/// Marker diameter for a bucket of `count` points: `clamp(count * 3, 32, 60)`.
pub fn marker_size(count: usize) -> u32 {
    let px = count
        .saturating_mul(MARKER_PX_PER_POINT)
        .clamp(MIN_MARKER_SIZE as usize, MAX_MARKER_SIZE as usize);
    px as u32
}

#[cfg(test)]
mod tests {
    use super::{CellKey, Cluster, ClusterId, marker_size};
    use crate::point::Point;

    #[test]
    fn marker_size_saturates_at_both_ends() {
        assert_eq!(marker_size(1), 32);
        assert_eq!(marker_size(10), 32);
        assert_eq!(marker_size(11), 33);
        assert_eq!(marker_size(15), 45);
        assert_eq!(marker_size(20), 60);
        assert_eq!(marker_size(10_000), 60);
        assert_eq!(marker_size(usize::MAX), 60);
    }

    #[test]
    fn marker_size_is_non_decreasing() {
        let sizes: Vec<u32> = (0..100).map(marker_size).collect();
        assert!(sizes.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn cell_key_renders_as_dash_joined_pair() {
        assert_eq!(CellKey { x: -3, y: 12 }.to_string(), "-3-12");
        assert_eq!(ClusterId::Point("abc".into()).to_string(), "abc");
    }

    #[test]
    fn descriptor_serializes_renderer_contract() {
        let cluster = Cluster::marker(&Point::new("p1", 31.5, 74.3));
        let json = serde_json::to_value(cluster.descriptor()).expect("serialize descriptor");

        assert_eq!(json["id"], "p1");
        assert_eq!(json["isCluster"], false);
        assert_eq!(json["count"], 1);
        assert_eq!(json["size"], 32);
    }
}
