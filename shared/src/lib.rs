pub mod cluster;
pub mod events;
pub mod gazetteer;
pub mod geo;
pub mod grid;
pub mod point;

pub use cluster::{Cluster, ClusterDescriptor, ClusterId, marker_size};
pub use events::*;
pub use gazetteer::{District, Gazetteer};
pub use geo::{Bounds, LatLng, Viewport};
pub use grid::{FULL_MARKER_ZOOM, GridConfig, bucket, cull, grid_size};
pub use point::{Payload, Point};
