use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use artisan_shared::{Bounds, LatLng, Viewport};
use parking_lot::Mutex;

use crate::config::MAX_ZOOM;
use crate::map::{ListenerCallback, ListenerId, MapEvent, MapProvider, ProviderError};

const TILE_SIZE_PX: f64 = 256.0;

type SharedCallback = Arc<dyn Fn() + Send + Sync>;

/// In-memory map provider with a fixed pixel size.
///
/// Bounds are planar: the visible span in degrees is the pixel size times
/// `360 / (256 * 2^zoom)` on both axes. Used for headless rendering and by the
/// engine tests to stand in for the browser map.
pub struct HeadlessMap {
    state: Mutex<HeadlessState>,
    listeners: Mutex<BTreeMap<ListenerId, (MapEvent, SharedCallback)>>,
    next_listener: AtomicU64,
}

struct HeadlessState {
    ready: bool,
    viewport: Viewport,
    width_px: f64,
    height_px: f64,
}

impl HeadlessMap {
    pub fn new(viewport: Viewport, width_px: u32, height_px: u32) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                ready: true,
                viewport: clamp_zoom(viewport),
                width_px: f64::from(width_px),
                height_px: f64::from(height_px),
            }),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// A map that reports `ProviderError::Unready` until `set_ready(true)`.
    pub fn unready(viewport: Viewport, width_px: u32, height_px: u32) -> Self {
        let map = Self::new(viewport, width_px, height_px);
        map.state.lock().ready = false;
        map
    }

    /// Flip readiness. Becoming ready fires `BoundsChanged`, like a browser
    /// map finishing its first layout.
    pub fn set_ready(&self, ready: bool) {
        let became_ready = {
            let mut state = self.state.lock();
            let was_ready = state.ready;
            state.ready = ready;
            ready && !was_ready
        };
        if became_ready {
            self.fire(MapEvent::BoundsChanged);
        }
    }

    /// Simulate a user drag to `center` at the current zoom.
    pub fn pan_to(&self, center: LatLng) {
        let zoom = self.state.lock().viewport.zoom;
        self.set_viewport(Viewport::new(center, zoom));
    }

    pub fn current_viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn fire(&self, event: MapEvent) {
        // Callbacks run outside the lock so they may call back into the map.
        let callbacks: Vec<SharedCallback> = self
            .listeners
            .lock()
            .values()
            .filter(|(registered, _)| *registered == event)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    fn read<T>(&self, f: impl FnOnce(&HeadlessState) -> T) -> Result<T, ProviderError> {
        let state = self.state.lock();
        if !state.ready {
            return Err(ProviderError::Unready);
        }
        Ok(f(&state))
    }
}

impl MapProvider for HeadlessMap {
    fn bounds(&self) -> Result<Bounds, ProviderError> {
        self.read(|state| {
            let degrees_per_px =
                360.0 / (TILE_SIZE_PX * 2f64.powi(i32::from(state.viewport.zoom)));
            Bounds::around(
                state.viewport.center,
                state.height_px / 2.0 * degrees_per_px,
                state.width_px / 2.0 * degrees_per_px,
            )
        })
    }

    fn zoom(&self) -> Result<u8, ProviderError> {
        self.read(|state| state.viewport.zoom)
    }

    fn center(&self) -> Result<LatLng, ProviderError> {
        self.read(|state| state.viewport.center)
    }

    fn set_viewport(&self, viewport: Viewport) {
        let (ready, zoom_changed) = {
            let mut state = self.state.lock();
            let next = clamp_zoom(viewport);
            let zoom_changed = state.viewport.zoom != next.zoom;
            state.viewport = next;
            (state.ready, zoom_changed)
        };
        if !ready {
            return;
        }
        if zoom_changed {
            self.fire(MapEvent::ZoomChanged);
        }
        self.fire(MapEvent::BoundsChanged);
    }

    fn add_listener(
        &self,
        event: MapEvent,
        callback: ListenerCallback,
    ) -> Result<ListenerId, ProviderError> {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().insert(id, (event, Arc::from(callback)));
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }
}

fn clamp_zoom(viewport: Viewport) -> Viewport {
    Viewport::new(viewport.center, viewport.zoom.min(MAX_ZOOM))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use artisan_shared::{LatLng, Viewport};

    use super::HeadlessMap;
    use crate::map::{MapEvent, MapProvider, ProviderError, Subscription};

    fn lahore_view(zoom: u8) -> Viewport {
        Viewport::new(LatLng::new(31.5204, 74.3587), zoom)
    }

    fn counter_callback(counter: &Arc<AtomicUsize>) -> crate::map::ListenerCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn bounds_span_halves_per_zoom_step() {
        let map = HeadlessMap::new(lahore_view(8), 1024, 512);
        let wide = map.bounds().expect("ready map has bounds");
        map.set_viewport(lahore_view(9));
        let narrow = map.bounds().expect("ready map has bounds");

        let wide_span = wide.east - wide.west;
        let narrow_span = narrow.east - narrow.west;
        assert!((wide_span - 2.0 * narrow_span).abs() < 1e-9);
        // 1024px at zoom 8 covers 1024 * 360 / 65536 degrees.
        assert!((wide_span - 5.625).abs() < 1e-9);
        assert!(wide.contains(LatLng::new(31.5204, 74.3587)));
    }

    #[test]
    fn unready_map_reports_unready_until_ready() {
        let map = HeadlessMap::unready(lahore_view(7), 800, 600);
        assert_eq!(map.bounds(), Err(ProviderError::Unready));
        assert_eq!(map.zoom(), Err(ProviderError::Unready));

        let fired = Arc::new(AtomicUsize::new(0));
        let map: Arc<dyn MapProvider> = Arc::new(map);
        let _sub = Subscription::register(&map, MapEvent::BoundsChanged, counter_callback(&fired))
            .expect("register listener");

        map.set_viewport(lahore_view(8));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn set_viewport_fires_zoom_only_when_zoom_changes() {
        let map: Arc<dyn MapProvider> = Arc::new(HeadlessMap::new(lahore_view(7), 800, 600));
        let bounds_fired = Arc::new(AtomicUsize::new(0));
        let zoom_fired = Arc::new(AtomicUsize::new(0));
        let _bounds = Subscription::register(
            &map,
            MapEvent::BoundsChanged,
            counter_callback(&bounds_fired),
        )
        .expect("register bounds listener");
        let _zoom = Subscription::register(&map, MapEvent::ZoomChanged, counter_callback(&zoom_fired))
            .expect("register zoom listener");

        map.set_viewport(Viewport::new(LatLng::new(30.0, 71.0), 7));
        map.set_viewport(lahore_view(9));

        assert_eq!(bounds_fired.load(Ordering::SeqCst), 2);
        assert_eq!(zoom_fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_removes_listener() {
        let headless = Arc::new(HeadlessMap::new(lahore_view(7), 800, 600));
        let map: Arc<dyn MapProvider> = headless.clone();
        let fired = Arc::new(AtomicUsize::new(0));

        let sub = Subscription::register(&map, MapEvent::BoundsChanged, counter_callback(&fired))
            .expect("register listener");
        assert_eq!(headless.listener_count(), 1);
        drop(sub);
        assert_eq!(headless.listener_count(), 0);

        headless.pan_to(LatLng::new(32.0, 74.0));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zoom_is_clamped_to_provider_maximum() {
        let map = HeadlessMap::new(lahore_view(40), 800, 600);
        assert_eq!(map.zoom(), Ok(22));
    }
}
