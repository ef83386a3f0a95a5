/**
 * Resource Watcher
 *
 * Keeps one typed store in sync with one resource kind through list-then-watch.
 * A full listing warms the store, then a watch stream resumes from the listing's
 * resource version. Transient stream failures reconnect from the last seen
 * version; an expired version forces a fresh listing that replaces the store.
 */
use super::config::WatcherConfig;
use super::errors::{is_expired_error, is_resource_expired, warm_up_error};
use super::kinds::{object_key, ResourceKind};
use super::source::{Listing, ResourceSource};
use super::store::TypedStore;
use super::update_hook::{UpdateEvent, UpdateHandler, UpdateHook};
use crate::error::{Error, Result};
use futures::TryStreamExt;
use kube::api::WatchEvent;
use kube::{Resource, ResourceExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a watcher's session with the API server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Uninitialized,
    Warming,
    Active,
    Reconnecting,
    Stopped,
}

/// Outcome of one step of the watch loop that was not a transport error
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    /// Server closed the stream, typically on its watch timeout
    Closed,
    /// The resumption token is no longer valid
    Expired,
    /// A fresh listing replaced the store
    Relisted,
    /// The stop signal fired
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WatcherStats {
    pub kind: ResourceKind,
    pub state: WatchState,
    pub objects: usize,
    pub resource_version: Option<String>,
    pub loops_started: u64,
}

pub struct ResourceWatcher<K> {
    kind: ResourceKind,
    source: Arc<dyn ResourceSource<K>>,
    store: TypedStore<K>,
    hook: UpdateHook<K>,
    state: RwLock<WatchState>,
    resource_version: RwLock<Option<String>>,
    loops_started: AtomicU64,
    /// Held by a running watch loop; a new `run` waits for the previous one to exit
    writer: tokio::sync::Mutex<()>,
    config: WatcherConfig,
}

impl<K> std::fmt::Debug for ResourceWatcher<K>
where
    K: Resource + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceWatcher")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("objects", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl<K> ResourceWatcher<K>
where
    K: Resource + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        kind: ResourceKind,
        source: Arc<dyn ResourceSource<K>>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            kind,
            source,
            store: TypedStore::new(),
            hook: UpdateHook::new(),
            state: RwLock::new(WatchState::Uninitialized),
            resource_version: RwLock::new(None),
            loops_started: AtomicU64::new(0),
            writer: tokio::sync::Mutex::new(()),
            config,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> WatchState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WatchState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Last resource version seen, the point a new watch resumes from
    #[must_use]
    pub fn resource_version(&self) -> Option<String> {
        self.resource_version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_resource_version(&self, version: Option<String>) {
        *self
            .resource_version
            .write()
            .unwrap_or_else(PoisonError::into_inner) = version;
    }

    /// Number of times `run` has been entered
    #[must_use]
    pub fn loops_started(&self) -> u64 {
        self.loops_started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Point-in-time copy of the cached objects
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<K>> {
        self.store.snapshot()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<K>> {
        self.store.get(key)
    }

    /// Register the callback fired after every applied mutation
    pub fn set_update_handler(&self, handler: UpdateHandler<K>) {
        self.hook.set(handler);
    }

    pub fn clear_update_handler(&self) {
        self.hook.clear();
    }

    #[must_use]
    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            kind: self.kind,
            state: self.state(),
            objects: self.store.len(),
            resource_version: self.resource_version(),
            loops_started: self.loops_started(),
        }
    }

    /// Load the initial full listing.
    ///
    /// # Errors
    ///
    /// Returns `WarmUpCancelled` if `cancel` fires first and `WarmUp` if the
    /// listing fails. Either way the store is left untouched.
    pub async fn warm_up(&self, cancel: &CancellationToken) -> Result<()> {
        info!("🔥 Warming {} cache", self.kind);
        self.set_state(WatchState::Warming);

        let listing = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("{} warm-up cancelled", self.kind);
                self.set_state(WatchState::Uninitialized);
                return Err(Error::WarmUpCancelled(self.kind));
            }
            listing = self.source.list() => listing,
        };

        match listing {
            Ok(listing) => {
                let count = listing.items.len();
                self.apply_listing(listing);
                self.set_state(WatchState::Active);
                info!("✅ {} cache warm with {} objects", self.kind, count);
                Ok(())
            }
            Err(e) => {
                error!("❌ {} warm-up listing failed: {}", self.kind, e);
                self.set_state(WatchState::Uninitialized);
                Err(warm_up_error(self.kind, e))
            }
        }
    }

    /// Watch for changes until `stop` fires.
    ///
    /// Never returns an error: stream failures reconnect with backoff, an
    /// expired resource version triggers a fresh listing. Once `stop` has fired
    /// no further event reaches the store.
    pub async fn run(&self, stop: CancellationToken) {
        let _writer = tokio::select! {
            biased;
            () = stop.cancelled() => return,
            guard = self.writer.lock() => guard,
        };

        self.loops_started.fetch_add(1, Ordering::SeqCst);
        info!("🔍 Starting {} watcher", self.kind);
        self.set_state(WatchState::Active);

        tokio::select! {
            biased;
            () = stop.cancelled() => {}
            () = self.watch_loop(&stop) => {}
        }

        self.set_state(WatchState::Stopped);
        info!("🛑 {} watcher stopped", self.kind);
    }

    async fn watch_loop(&self, stop: &CancellationToken) {
        let mut backoff = self.config.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            let result = match self.resource_version() {
                Some(version) => self.watch_once(&version, stop).await,
                // No usable resumption point, re-list before watching
                None => self.resync(stop).await,
            };

            match result {
                Ok(StreamEnd::Stopped) => return,
                Ok(StreamEnd::Relisted) => {
                    backoff = self.config.initial_backoff;
                    attempt = 0;
                    self.set_state(WatchState::Active);
                }
                Ok(StreamEnd::Closed) => {
                    debug!("{} watch stream ended, reconnecting", self.kind);
                    backoff = self.config.initial_backoff;
                    attempt = 0;
                    self.set_state(WatchState::Active);
                    if !pause(stop, self.config.restart_delay).await {
                        return;
                    }
                }
                Ok(StreamEnd::Expired) => {
                    info!("♻️  {} resource version expired, re-listing", self.kind);
                    self.set_resource_version(None);
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    self.set_state(WatchState::Reconnecting);
                    warn!(
                        "❌ {} watcher failed (attempt {}): {}, reconnecting in {:?}",
                        self.kind, attempt, e, backoff
                    );
                    if !pause(stop, backoff).await {
                        return;
                    }
                    backoff = self.config.next_backoff(backoff);
                }
            }
        }
    }

    /// Drain one watch stream into the store
    async fn watch_once(&self, version: &str, stop: &CancellationToken) -> Result<StreamEnd> {
        let mut stream = match self.source.watch(version).await {
            Ok(stream) => stream,
            Err(e) if is_expired_error(&e) => return Ok(StreamEnd::Expired),
            Err(e) => return Err(e),
        };
        self.set_state(WatchState::Active);

        while let Some(event) = stream.try_next().await? {
            if stop.is_cancelled() {
                return Ok(StreamEnd::Stopped);
            }
            match event {
                WatchEvent::Added(obj) => {
                    self.track_version(&obj);
                    self.apply(UpdateEvent::Added(Arc::new(obj)));
                }
                WatchEvent::Modified(obj) => {
                    self.track_version(&obj);
                    self.apply(UpdateEvent::Modified(Arc::new(obj)));
                }
                WatchEvent::Deleted(obj) => {
                    self.track_version(&obj);
                    self.apply(UpdateEvent::Deleted(Arc::new(obj)));
                }
                WatchEvent::Bookmark(bookmark) => {
                    debug!(
                        "{} bookmark at {}",
                        self.kind, bookmark.metadata.resource_version
                    );
                    self.set_resource_version(Some(bookmark.metadata.resource_version));
                }
                WatchEvent::Error(response) if is_resource_expired(&response) => {
                    return Ok(StreamEnd::Expired);
                }
                WatchEvent::Error(response) => {
                    return Err(Error::Kube(kube::Error::Api(response)));
                }
            }
        }

        Ok(StreamEnd::Closed)
    }

    fn track_version(&self, obj: &K) {
        if let Some(version) = obj.resource_version() {
            self.set_resource_version(Some(version));
        }
    }

    /// Apply one event to the store, then notify the hook
    fn apply(&self, event: UpdateEvent<K>) {
        match &event {
            UpdateEvent::Added(obj) | UpdateEvent::Modified(obj) => {
                let key = object_key(obj.as_ref());
                debug!("📝 {} upsert: {}", self.kind, key);
                self.store.upsert(key, obj.clone());
            }
            UpdateEvent::Deleted(obj) => {
                let key = object_key(obj.as_ref());
                debug!("🗑️  {} delete: {}", self.kind, key);
                self.store.delete(&key);
            }
        }
        self.hook.fire(&event);
    }

    /// Fresh listing that replaces the whole store
    async fn resync(&self, stop: &CancellationToken) -> Result<StreamEnd> {
        let listing = self.source.list().await?;
        if stop.is_cancelled() {
            return Ok(StreamEnd::Stopped);
        }
        let count = listing.items.len();
        self.apply_listing(listing);
        info!("♻️  {} re-listed with {} objects", self.kind, count);
        Ok(StreamEnd::Relisted)
    }

    fn apply_listing(&self, listing: Listing<K>) {
        let objects: Vec<Arc<K>> = listing.items.into_iter().map(Arc::new).collect();
        let discarded = self.store.replace(
            objects
                .iter()
                .map(|obj| (object_key(obj.as_ref()), obj.clone())),
        );
        self.set_resource_version(Some(listing.resource_version));

        if self.hook.is_set() {
            for obj in objects {
                self.hook.fire(&UpdateEvent::Modified(obj));
            }
            for obj in discarded {
                self.hook.fire(&UpdateEvent::Deleted(obj));
            }
        }
    }
}

/// Sleep for `delay`; `false` if `stop` fired first
async fn pause(stop: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        () = stop.cancelled() => false,
        () = sleep(delay) => true,
    }
}

/// Kind-erased view of a watcher, used to fan out over every tracked kind
pub trait KindWatcher: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn stats(&self) -> WatcherStats;

    /// This watcher's `warm_up` as a boxed future
    fn warm_up_boxed<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> futures::future::BoxFuture<'a, Result<()>>;

    /// Spawn this watcher's `run` loop on the tokio runtime
    fn spawn_run(self: Arc<Self>, stop: CancellationToken) -> tokio::task::JoinHandle<()>;
}

impl<K> KindWatcher for ResourceWatcher<K>
where
    K: Resource + Send + Sync + 'static,
{
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn stats(&self) -> WatcherStats {
        Self::stats(self)
    }

    fn warm_up_boxed<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> futures::future::BoxFuture<'a, Result<()>> {
        Box::pin(self.warm_up(cancel))
    }

    fn spawn_run(self: Arc<Self>, stop: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(stop).await })
    }
}
