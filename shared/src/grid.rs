use std::collections::HashMap;

use crate::cluster::{CellKey, Cluster, ClusterId};
use crate::geo::{Bounds, LatLng};
use crate::point::Point;

/// Zoom level at or above which every point renders as its own marker.
pub const FULL_MARKER_ZOOM: u8 = 14;
/// Cell edge in degrees at zoom 16; doubles per zoom step out.
pub const DEFAULT_CELL_SCALE: f64 = 0.005;
const GRID_BASE_ZOOM: i32 = 16;

/// Zoom-dependent planar grid used to bucket points into clusters.
///
/// Cells are anchored at `(0, 0)` and do not follow the viewport, so cluster
/// identity is only stable while the zoom level stays fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    pub cell_scale: f64,
    pub full_marker_zoom: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_scale: DEFAULT_CELL_SCALE,
            full_marker_zoom: FULL_MARKER_ZOOM,
        }
    }
}

impl GridConfig {
    /// Cell edge in degrees: `2^(16 - zoom) * cell_scale`.
    pub fn grid_size(&self, zoom: u8) -> f64 {
        2f64.powi(GRID_BASE_ZOOM - i32::from(zoom)) * self.cell_scale
    }

    /// Whether viewport culling applies at `zoom`. From the full-marker zoom
    /// on, every point is shown regardless of bounds.
    pub fn culls_at(&self, zoom: u8) -> bool {
        zoom < self.full_marker_zoom
    }

    pub fn cell_key(&self, pos: LatLng, zoom: u8) -> CellKey {
        cell_key(pos, self.grid_size(zoom))
    }

    /// Group `points` into clusters for `zoom`.
    ///
    /// Points with non-finite coordinates are skipped. Groups are emitted in
    /// order of first appearance.
    pub fn bucket<'a, I>(&self, points: I, zoom: u8) -> Vec<Cluster>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let placed = points
            .into_iter()
            .filter_map(|point| point.position().map(|pos| (point, pos)));

        if zoom >= self.full_marker_zoom {
            return placed.map(|(point, _)| Cluster::marker(point)).collect();
        }

        let grid_size = self.grid_size(zoom);
        let mut slots: HashMap<CellKey, usize> = HashMap::new();
        let mut groups: Vec<CellGroup<'a>> = Vec::new();

        for (point, pos) in placed {
            let key = cell_key(pos, grid_size);
            let slot = *slots.entry(key).or_insert_with(|| {
                groups.push(CellGroup::new(key));
                groups.len() - 1
            });
            groups[slot].push(point, pos);
        }

        groups.into_iter().map(CellGroup::into_cluster).collect()
    }
}

struct CellGroup<'a> {
    key: CellKey,
    sum_lat: f64,
    sum_lng: f64,
    members: Vec<&'a Point>,
}

impl<'a> CellGroup<'a> {
    fn new(key: CellKey) -> Self {
        Self {
            key,
            sum_lat: 0.0,
            sum_lng: 0.0,
            members: Vec::new(),
        }
    }

    fn push(&mut self, point: &'a Point, pos: LatLng) {
        self.sum_lat += pos.lat;
        self.sum_lng += pos.lng;
        self.members.push(point);
    }

    fn into_cluster(self) -> Cluster {
        if let [only] = self.members.as_slice() {
            return Cluster::marker(only);
        }

        let count = self.members.len();
        Cluster {
            id: ClusterId::Cell(self.key),
            lat: self.sum_lat / count as f64,
            lng: self.sum_lng / count as f64,
            count,
            is_cluster: true,
            items: self.members.into_iter().cloned().collect(),
        }
    }
}

fn cell_key(pos: LatLng, grid_size: f64) -> CellKey {
    CellKey {
        x: (pos.lng / grid_size).floor() as i64,
        y: (pos.lat / grid_size).floor() as i64,
    }
}

/// Cell edge in degrees for `zoom` with the default cell scale.
pub fn grid_size(zoom: u8) -> f64 {
    GridConfig::default().grid_size(zoom)
}

/// Bucket `points` with the default grid.
pub fn bucket(points: &[Point], zoom: u8) -> Vec<Cluster> {
    GridConfig::default().bucket(points, zoom)
}

/// Keep the points inside `bounds`. Without bounds (map not ready yet) the
/// input passes through untouched.
pub fn cull<'a>(points: &'a [Point], bounds: Option<&Bounds>) -> Vec<&'a Point> {
    match bounds {
        None => points.iter().collect(),
        Some(bounds) => points
            .iter()
            .filter(|point| point.position().is_some_and(|pos| bounds.contains(pos)))
            .collect(),
    }
}
