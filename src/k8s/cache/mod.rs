pub mod cluster_cache;
pub mod config;
pub mod errors;
pub mod kinds;
pub mod source;
pub mod store;
pub mod update_hook;
pub mod watcher;

pub use cluster_cache::{CacheSources, ClusterCache};
pub use config::{CacheConfig, WatcherConfig};
pub use kinds::{object_key, ResourceKind};
pub use source::{EventStream, KubeSource, Listing, ResourceSource};
pub use store::TypedStore;
pub use update_hook::{UpdateEvent, UpdateHandler, UpdateHook};
pub use watcher::{KindWatcher, ResourceWatcher, WatchState, WatcherStats};
