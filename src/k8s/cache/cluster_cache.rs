/**
Cluster cache

Owns one `ResourceWatcher` per tracked kind. Construction warms every kind in
parallel and only succeeds once each has a full listing loaded; `run` and `stop`
then control the background watch loops.
*/
use super::config::{CacheConfig, WatcherConfig};
use super::kinds::ResourceKind;
use super::source::{KubeSource, ResourceSource};
use super::update_hook::UpdateHandler;
use super::watcher::{KindWatcher, ResourceWatcher, WatcherStats};
use crate::error::Result;
use futures::future::join_all;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Node, PersistentVolume, Pod, Service,
};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::Client;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Upstream source for every tracked kind
pub struct CacheSources {
    pub namespaces: Arc<dyn ResourceSource<Namespace>>,
    pub nodes: Arc<dyn ResourceSource<Node>>,
    pub pods: Arc<dyn ResourceSource<Pod>>,
    pub services: Arc<dyn ResourceSource<Service>>,
    pub daemon_sets: Arc<dyn ResourceSource<DaemonSet>>,
    pub deployments: Arc<dyn ResourceSource<Deployment>>,
    pub stateful_sets: Arc<dyn ResourceSource<StatefulSet>>,
    pub replica_sets: Arc<dyn ResourceSource<ReplicaSet>>,
    pub persistent_volumes: Arc<dyn ResourceSource<PersistentVolume>>,
    pub storage_classes: Arc<dyn ResourceSource<StorageClass>>,
    /// Scoped to the configuration namespace
    pub config_maps: Arc<dyn ResourceSource<ConfigMap>>,
}

impl CacheSources {
    /// Kubernetes API sources; config maps are limited to `config.config_namespace`
    #[must_use]
    pub fn from_client(client: &Client, config: &CacheConfig) -> Self {
        let timeout = config.watcher.watch_timeout_secs;
        Self {
            namespaces: Arc::new(KubeSource::all(client.clone()).with_watch_timeout(timeout)),
            nodes: Arc::new(KubeSource::all(client.clone()).with_watch_timeout(timeout)),
            pods: Arc::new(KubeSource::all(client.clone()).with_watch_timeout(timeout)),
            services: Arc::new(KubeSource::all(client.clone()).with_watch_timeout(timeout)),
            daemon_sets: Arc::new(KubeSource::all(client.clone()).with_watch_timeout(timeout)),
            deployments: Arc::new(KubeSource::all(client.clone()).with_watch_timeout(timeout)),
            stateful_sets: Arc::new(KubeSource::all(client.clone()).with_watch_timeout(timeout)),
            replica_sets: Arc::new(KubeSource::all(client.clone()).with_watch_timeout(timeout)),
            persistent_volumes: Arc::new(
                KubeSource::all(client.clone()).with_watch_timeout(timeout),
            ),
            storage_classes: Arc::new(
                KubeSource::all(client.clone()).with_watch_timeout(timeout),
            ),
            config_maps: Arc::new(
                KubeSource::namespaced(client.clone(), &config.config_namespace)
                    .with_watch_timeout(timeout),
            ),
        }
    }
}

/// Background loops of one `run` session
struct RunSession {
    stop: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub struct ClusterCache {
    client: Client,

    namespaces: Arc<ResourceWatcher<Namespace>>,
    nodes: Arc<ResourceWatcher<Node>>,
    pods: Arc<ResourceWatcher<Pod>>,
    services: Arc<ResourceWatcher<Service>>,
    daemon_sets: Arc<ResourceWatcher<DaemonSet>>,
    deployments: Arc<ResourceWatcher<Deployment>>,
    stateful_sets: Arc<ResourceWatcher<StatefulSet>>,
    replica_sets: Arc<ResourceWatcher<ReplicaSet>>,
    persistent_volumes: Arc<ResourceWatcher<PersistentVolume>>,
    storage_classes: Arc<ResourceWatcher<StorageClass>>,
    config_maps: Arc<ResourceWatcher<ConfigMap>>,

    /// The same watchers, kind-erased, in `ResourceKind::ALL` order
    watchers: Vec<Arc<dyn KindWatcher>>,
    session: Mutex<Option<RunSession>>,
}

impl std::fmt::Debug for ClusterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCache")
            .field("kinds", &self.watchers.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn watcher<K>(
    kind: ResourceKind,
    source: Arc<dyn ResourceSource<K>>,
    config: &WatcherConfig,
) -> Arc<ResourceWatcher<K>>
where
    K: kube::Resource + Send + Sync + 'static,
{
    Arc::new(ResourceWatcher::new(kind, source, config.clone()))
}

impl ClusterCache {
    /// Build a cache over the Kubernetes API and block until every kind is warm.
    ///
    /// # Errors
    ///
    /// Returns the first warm-up failure, see [`ClusterCache::with_sources`].
    pub async fn new(client: Client, config: &CacheConfig, cancel: CancellationToken) -> Result<Self> {
        info!("NAMESPACE: {}", config.config_namespace);
        let sources = CacheSources::from_client(&client, config);
        Self::with_sources(client, sources, &config.watcher, cancel).await
    }

    /// Build a cache over the given sources and block until every kind is warm.
    ///
    /// All kinds warm concurrently under one shared cancellation token. The
    /// first failure cancels the token, so the remaining warm-ups stop and the
    /// cache is never returned half-initialized.
    ///
    /// # Errors
    ///
    /// Returns the first listing failure as `Error::WarmUp`, or
    /// `Error::WarmUpCancelled` if `cancel` fired before warm-up finished.
    pub async fn with_sources(
        client: Client,
        sources: CacheSources,
        config: &WatcherConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let cache = Self::assemble(client, sources, config);
        cache.warm_up(&cancel).await?;
        Ok(cache)
    }

    fn assemble(client: Client, sources: CacheSources, config: &WatcherConfig) -> Self {
        let namespaces = watcher(ResourceKind::Namespaces, sources.namespaces, config);
        let nodes = watcher(ResourceKind::Nodes, sources.nodes, config);
        let pods = watcher(ResourceKind::Pods, sources.pods, config);
        let services = watcher(ResourceKind::Services, sources.services, config);
        let daemon_sets = watcher(ResourceKind::DaemonSets, sources.daemon_sets, config);
        let deployments = watcher(ResourceKind::Deployments, sources.deployments, config);
        let stateful_sets = watcher(ResourceKind::StatefulSets, sources.stateful_sets, config);
        let replica_sets = watcher(ResourceKind::ReplicaSets, sources.replica_sets, config);
        let persistent_volumes = watcher(
            ResourceKind::PersistentVolumes,
            sources.persistent_volumes,
            config,
        );
        let storage_classes =
            watcher(ResourceKind::StorageClasses, sources.storage_classes, config);
        let config_maps = watcher(ResourceKind::ConfigMaps, sources.config_maps, config);

        let watchers: Vec<Arc<dyn KindWatcher>> = vec![
            namespaces.clone() as Arc<dyn KindWatcher>,
            nodes.clone() as Arc<dyn KindWatcher>,
            pods.clone() as Arc<dyn KindWatcher>,
            services.clone() as Arc<dyn KindWatcher>,
            daemon_sets.clone() as Arc<dyn KindWatcher>,
            deployments.clone() as Arc<dyn KindWatcher>,
            stateful_sets.clone() as Arc<dyn KindWatcher>,
            replica_sets.clone() as Arc<dyn KindWatcher>,
            persistent_volumes.clone() as Arc<dyn KindWatcher>,
            storage_classes.clone() as Arc<dyn KindWatcher>,
            config_maps.clone() as Arc<dyn KindWatcher>,
        ];

        Self {
            client,
            namespaces,
            nodes,
            pods,
            services,
            daemon_sets,
            deployments,
            stateful_sets,
            replica_sets,
            persistent_volumes,
            storage_classes,
            config_maps,
            watchers,
            session: Mutex::new(None),
        }
    }

    async fn warm_up(&self, cancel: &CancellationToken) -> Result<()> {
        info!("🔥 Warming {} resource kinds", self.watchers.len());

        // Child token: a failing kind aborts its siblings without cancelling the caller's token
        let shared = cancel.child_token();
        let shared = &shared;
        let warm_ups = self.watchers.iter().map(|watcher| async move {
            let result = watcher.warm_up_boxed(shared).await;
            if result.is_err() {
                shared.cancel();
            }
            result
        });
        let results = join_all(warm_ups).await;

        let mut cancelled = None;
        for result in results {
            match result {
                Ok(()) => {}
                Err(e) if e.is_cancellation() => {
                    cancelled.get_or_insert(e);
                }
                Err(e) => {
                    error!("Cluster cache warm-up failed: {}", e);
                    return Err(e);
                }
            }
        }

        if let Some(e) = cancelled {
            error!("Cluster cache warm-up cancelled: {}", e);
            return Err(e);
        }

        info!("✅ Cluster cache warm");
        Ok(())
    }

    /// Start every kind's watch loop.
    ///
    /// Returns `false` without starting anything if a session is already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn run(&self) -> bool {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_some() {
            debug!("Cluster cache already running");
            return false;
        }

        let stop = CancellationToken::new();
        let handles = self
            .watchers
            .iter()
            .map(|watcher| watcher.clone().spawn_run(stop.child_token()))
            .collect();
        *session = Some(RunSession { stop, handles });
        drop(session);

        info!("🔍 Cluster cache watchers started for {} kinds", self.watchers.len());
        true
    }

    /// Signal every watch loop to stop.
    ///
    /// Returns `false` if nothing was running. A later `run` starts a fresh session;
    /// each kind's new loop waits for the old one to exit before it touches the store.
    pub fn stop(&self) -> bool {
        let Some(session) = self.take_session() else {
            debug!("Cluster cache not running");
            return false;
        };
        session.stop.cancel();
        info!("🛑 Cluster cache stop requested");
        true
    }

    /// Stop the watch loops and wait for all of them to exit
    pub async fn shutdown(&self) {
        let Some(session) = self.take_session() else {
            return;
        };
        session.stop.cancel();
        for handle in session.handles {
            if let Err(e) = handle.await {
                error!("Watcher task ended abnormally: {}", e);
            }
        }
        info!("🛑 Cluster cache shut down");
    }

    fn take_session(&self) -> Option<RunSession> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Direct API access for kinds the cache does not track
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Per-kind diagnostics in `ResourceKind::ALL` order
    #[must_use]
    pub fn stats(&self) -> Vec<WatcherStats> {
        self.watchers.iter().map(|w| w.stats()).collect()
    }

    /// Register the callback fired on every config map change
    pub fn set_config_map_update_func(&self, handler: UpdateHandler<ConfigMap>) {
        self.config_maps.set_update_handler(handler);
    }

    #[must_use]
    pub fn get_all_namespaces(&self) -> Vec<Arc<Namespace>> {
        self.namespaces.get_all()
    }

    #[must_use]
    pub fn get_all_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.get_all()
    }

    #[must_use]
    pub fn get_all_pods(&self) -> Vec<Arc<Pod>> {
        self.pods.get_all()
    }

    #[must_use]
    pub fn get_all_services(&self) -> Vec<Arc<Service>> {
        self.services.get_all()
    }

    #[must_use]
    pub fn get_all_daemon_sets(&self) -> Vec<Arc<DaemonSet>> {
        self.daemon_sets.get_all()
    }

    #[must_use]
    pub fn get_all_deployments(&self) -> Vec<Arc<Deployment>> {
        self.deployments.get_all()
    }

    #[must_use]
    pub fn get_all_stateful_sets(&self) -> Vec<Arc<StatefulSet>> {
        self.stateful_sets.get_all()
    }

    #[must_use]
    pub fn get_all_replica_sets(&self) -> Vec<Arc<ReplicaSet>> {
        self.replica_sets.get_all()
    }

    #[must_use]
    pub fn get_all_persistent_volumes(&self) -> Vec<Arc<PersistentVolume>> {
        self.persistent_volumes.get_all()
    }

    #[must_use]
    pub fn get_all_storage_classes(&self) -> Vec<Arc<StorageClass>> {
        self.storage_classes.get_all()
    }

    /// Config maps of the configuration namespace
    #[must_use]
    pub fn get_all_config_maps(&self) -> Vec<Arc<ConfigMap>> {
        self.config_maps.get_all()
    }
}

impl Drop for ClusterCache {
    fn drop(&mut self) {
        if let Some(session) = self.take_session() {
            session.stop.cancel();
        }
    }
}
