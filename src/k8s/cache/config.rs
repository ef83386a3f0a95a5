/**
 * Configuration constants for the cluster cache and its watchers
 */
use std::time::Duration;

/// Maximum backoff time in seconds between reconnect attempts
pub const MAX_BACKOFF_SECONDS: u64 = 60;

/// Initial backoff time in seconds
pub const INITIAL_BACKOFF_SECONDS: u64 = 1;

/// Delay before reopening a watch stream the server closed cleanly
pub const RESTART_DELAY_SECONDS: u64 = 1;

/// Watch stream timeout in seconds (294 vs 300 to allow 6 seconds for graceful shutdown)
pub const WATCH_TIMEOUT_SECONDS: u32 = 294;

/// Namespace holding the configuration config maps when none is given
pub const DEFAULT_CONFIG_NAMESPACE: &str = "kubecost";

/// Timing knobs for a single resource watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Delay before the first reconnect after a failed watch
    pub initial_backoff: Duration,
    /// Upper bound for the doubling reconnect delay
    pub max_backoff: Duration,
    /// Pause before reopening a cleanly closed watch stream
    pub restart_delay: Duration,
    /// Server-side timeout requested for every watch call
    pub watch_timeout_secs: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(INITIAL_BACKOFF_SECONDS),
            max_backoff: Duration::from_secs(MAX_BACKOFF_SECONDS),
            restart_delay: Duration::from_secs(RESTART_DELAY_SECONDS),
            watch_timeout_secs: WATCH_TIMEOUT_SECONDS,
        }
    }
}

impl WatcherConfig {
    /// Next backoff after `current`, doubled and capped at `max_backoff`
    #[must_use]
    pub fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }
}

/// Configuration for the whole cluster cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Namespace whose config maps are cached
    pub config_namespace: String,
    pub watcher: WatcherConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            config_namespace: DEFAULT_CONFIG_NAMESPACE.to_string(),
            watcher: WatcherConfig::default(),
        }
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(MAX_BACKOFF_SECONDS > 0, "MAX_BACKOFF_SECONDS must be greater than 0");
    assert!(INITIAL_BACKOFF_SECONDS > 0, "INITIAL_BACKOFF_SECONDS must be greater than 0");
    assert!(
        INITIAL_BACKOFF_SECONDS <= MAX_BACKOFF_SECONDS,
        "INITIAL_BACKOFF_SECONDS must not exceed MAX_BACKOFF_SECONDS"
    );
    assert!(RESTART_DELAY_SECONDS > 0, "RESTART_DELAY_SECONDS must be greater than 0");
    assert!(WATCH_TIMEOUT_SECONDS > 0, "WATCH_TIMEOUT_SECONDS must be greater than 0");
};
