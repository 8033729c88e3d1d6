use std::time::Duration;

use artisan_shared::{GridConfig, LatLng, Viewport};

pub const DEFAULT_CENTER: LatLng = LatLng::new(31.1704, 72.7097); // Punjab
pub const DEFAULT_ZOOM: u8 = 7;
pub const DEFAULT_DISTRICT_ZOOM: u8 = 9;
pub const DEFAULT_FOCUS_DELAY_MS: u64 = 500;
pub const CLUSTER_CLICK_ZOOM_STEP: u8 = 2;
pub const MAX_ZOOM: u8 = 22;

/// Tunables for one clustering engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub default_viewport: Viewport,
    pub district_zoom: u8,
    pub focus_delay: Duration,
    pub click_zoom_step: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            default_viewport: Viewport::new(DEFAULT_CENTER, DEFAULT_ZOOM),
            district_zoom: DEFAULT_DISTRICT_ZOOM,
            focus_delay: Duration::from_millis(DEFAULT_FOCUS_DELAY_MS),
            click_zoom_step: CLUSTER_CLICK_ZOOM_STEP,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ARTISAN_*` environment variables. Invalid
    /// values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.default_viewport.zoom = default_zoom();
        config.district_zoom = district_zoom();
        config.focus_delay = focus_delay();
        config.grid.cell_scale = cluster_cell_scale();
        config
    }

    /// Highest zoom a cluster click may land on.
    pub fn click_zoom_cap(&self) -> u8 {
        self.grid.full_marker_zoom
    }
}

fn zoom_var(name: &str, fallback: u8) -> u8 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u8>().ok())
        .filter(|value| *value <= MAX_ZOOM)
        .unwrap_or(fallback)
}

pub fn default_zoom() -> u8 {
    zoom_var("ARTISAN_DEFAULT_ZOOM", DEFAULT_ZOOM)
}

pub fn district_zoom() -> u8 {
    zoom_var("ARTISAN_DISTRICT_ZOOM", DEFAULT_DISTRICT_ZOOM)
}

pub fn focus_delay() -> Duration {
    std::env::var("ARTISAN_FOCUS_DELAY_MS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(DEFAULT_FOCUS_DELAY_MS))
}

pub fn cluster_cell_scale() -> f64 {
    std::env::var("ARTISAN_CLUSTER_CELL_SCALE")
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(artisan_shared::grid::DEFAULT_CELL_SCALE)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{DEFAULT_DISTRICT_ZOOM, EngineConfig};

    #[test]
    fn from_env_applies_valid_overrides() {
        temp_env::with_vars(
            [
                ("ARTISAN_DEFAULT_ZOOM", Some("6")),
                ("ARTISAN_DISTRICT_ZOOM", Some("8")),
                ("ARTISAN_FOCUS_DELAY_MS", Some("250")),
                ("ARTISAN_CLUSTER_CELL_SCALE", Some("0.01")),
            ],
            || {
                let config = EngineConfig::from_env();
                assert_eq!(config.default_viewport.zoom, 6);
                assert_eq!(config.district_zoom, 8);
                assert_eq!(config.focus_delay, Duration::from_millis(250));
                assert_eq!(config.grid.cell_scale, 0.01);
            },
        );
    }

    #[test]
    fn from_env_ignores_invalid_values() {
        temp_env::with_vars(
            [
                ("ARTISAN_DEFAULT_ZOOM", Some("99")),
                ("ARTISAN_DISTRICT_ZOOM", Some("nine")),
                ("ARTISAN_FOCUS_DELAY_MS", None),
                ("ARTISAN_CLUSTER_CELL_SCALE", Some("-1")),
            ],
            || {
                let config = EngineConfig::from_env();
                assert_eq!(config, EngineConfig::default());
                assert_eq!(config.district_zoom, DEFAULT_DISTRICT_ZOOM);
            },
        );
    }

    #[test]
    fn cluster_clicks_are_capped_at_the_full_marker_zoom() {
        assert_eq!(EngineConfig::default().click_zoom_cap(), 14);
    }
}
