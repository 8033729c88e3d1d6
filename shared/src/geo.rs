use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Rectangular lat/lng region currently visible on screen.
///
/// Containment is a plain inclusive range test on both axes. Bounds that
/// straddle the anti-meridian (`west > east`) are not special-cased and
/// contain nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Bounds of `half_lat`/`half_lng` degrees around `center`, latitude clamped to the poles.
    pub fn around(center: LatLng, half_lat: f64, half_lng: f64) -> Self {
        Self {
            south: (center.lat - half_lat).max(-90.0),
            west: center.lng - half_lng,
            north: (center.lat + half_lat).min(90.0),
            east: center.lng + half_lng,
        }
    }

    pub fn contains(&self, pos: LatLng) -> bool {
        pos.lat >= self.south && pos.lat <= self.north && pos.lng >= self.west && pos.lng <= self.east
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

/// The map's current center and integer zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: u8,
}

impl Viewport {
    pub const fn new(center: LatLng, zoom: u8) -> Self {
        Self { center, zoom }
    }
}

#[cfg(test)]
mod tests {
    use super::{Bounds, LatLng};

    #[test]
    fn contains_is_inclusive_on_edges() {
        let bounds = Bounds::new(30.0, 70.0, 32.0, 75.0);
        assert!(bounds.contains(LatLng::new(30.0, 70.0)));
        assert!(bounds.contains(LatLng::new(32.0, 75.0)));
        assert!(bounds.contains(LatLng::new(31.5, 74.3)));
        assert!(!bounds.contains(LatLng::new(29.99, 72.0)));
        assert!(!bounds.contains(LatLng::new(31.0, 75.01)));
    }

    #[test]
    fn contains_rejects_non_finite_positions() {
        let bounds = Bounds::new(-90.0, -180.0, 90.0, 180.0);
        assert!(!bounds.contains(LatLng::new(f64::NAN, 0.0)));
        assert!(!bounds.contains(LatLng::new(0.0, f64::INFINITY)));
    }

    #[test]
    fn around_clamps_latitude_to_poles() {
        let bounds = Bounds::around(LatLng::new(89.0, 10.0), 5.0, 2.0);
        assert_eq!(bounds.north, 90.0);
        assert_eq!(bounds.south, 84.0);
        assert_eq!(bounds.west, 8.0);
        assert_eq!(bounds.east, 12.0);
    }

    #[test]
    fn anti_meridian_bounds_are_not_wrapped() {
        let bounds = Bounds::new(-10.0, 170.0, 10.0, -170.0);
        assert!(!bounds.contains(LatLng::new(0.0, 175.0)));
    }
}
