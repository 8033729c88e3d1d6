use std::fmt;
use std::sync::Arc;

use artisan_shared::{Bounds, LatLng, Viewport};

/// Notifications the clustering engine subscribes to on the map provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapEvent {
    BoundsChanged,
    ZoomChanged,
}

impl MapEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BoundsChanged => "bounds_changed",
            Self::ZoomChanged => "zoom_changed",
        }
    }
}

impl fmt::Display for MapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Listener callbacks carry no payload; the engine re-reads bounds and zoom
/// from the provider when it handles the notification.
pub type ListenerCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("map provider is not ready")]
    Unready,
    #[error("map provider rejected listener for {event}: {reason}")]
    Listener { event: MapEvent, reason: String },
}

/// The third-party map the engine is attached to.
///
/// Geometry reads can fail while the provider is still initializing; the
/// engine treats that as "try again on the next event".
pub trait MapProvider: Send + Sync {
    fn bounds(&self) -> Result<Bounds, ProviderError>;

    fn zoom(&self) -> Result<u8, ProviderError>;

    fn center(&self) -> Result<LatLng, ProviderError>;

    /// Move the map. Providers fire their own change notifications afterwards.
    fn set_viewport(&self, viewport: Viewport);

    fn add_listener(
        &self,
        event: MapEvent,
        callback: ListenerCallback,
    ) -> Result<ListenerId, ProviderError>;

    fn remove_listener(&self, id: ListenerId);

    fn viewport(&self) -> Result<Viewport, ProviderError> {
        Ok(Viewport::new(self.center()?, self.zoom()?))
    }
}

/// A registered listener, removed from the provider when dropped.
#[must_use = "dropping a Subscription removes the listener immediately"]
pub struct Subscription {
    map: Arc<dyn MapProvider>,
    event: MapEvent,
    id: ListenerId,
}

impl Subscription {
    pub fn register(
        map: &Arc<dyn MapProvider>,
        event: MapEvent,
        callback: ListenerCallback,
    ) -> Result<Self, ProviderError> {
        let id = map.add_listener(event, callback)?;
        Ok(Self {
            map: Arc::clone(map),
            event,
            id,
        })
    }

    pub fn event(&self) -> MapEvent {
        self.event
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.map.remove_listener(self.id);
    }
}
