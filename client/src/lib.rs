//! Map-side clustering engine: keeps a published cluster list in step with
//! the viewport of an attached map provider.

pub mod animation;
pub mod config;
pub mod engine;
pub mod headless;
pub mod map;
pub mod viewport;

pub use config::EngineConfig;
pub use engine::{
    ClusterEngine, ClusterSnapshot, Command, EngineError, EngineHandle, RecomputeReason,
    SchedulerState,
};
pub use headless::HeadlessMap;
pub use map::{ListenerCallback, ListenerId, MapEvent, MapProvider, ProviderError, Subscription};
