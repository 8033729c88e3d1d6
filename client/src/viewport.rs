use artisan_shared::{Cluster, District, LatLng, Viewport};

use crate::config::{EngineConfig, MAX_ZOOM};

/// Viewport to move to when a cluster marker is clicked: centered on the
/// cluster, `click_zoom_step` levels closer, never past the full-marker zoom.
///
/// Plain markers have nothing to expand and yield `None`.
pub fn cluster_click_target(
    current_zoom: u8,
    cluster: &Cluster,
    config: &EngineConfig,
) -> Option<Viewport> {
    if !cluster.is_cluster {
        return None;
    }
    let zoom = current_zoom
        .saturating_add(config.click_zoom_step)
        .min(config.click_zoom_cap());
    Some(Viewport::new(LatLng::new(cluster.lat, cluster.lng), zoom))
}

/// Viewport that frames a district from the gazetteer.
pub fn district_target(district: &District, config: &EngineConfig) -> Viewport {
    Viewport::new(district.center(), config.district_zoom.min(MAX_ZOOM))
}
