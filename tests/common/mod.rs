#![allow(dead_code)]

use async_trait::async_trait;
use clustercache::error::{Error, Result};
use clustercache::k8s::cache::{CacheSources, EventStream, Listing, ResourceSource, WatcherConfig};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Node, PersistentVolume, Pod, Service,
};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{ObjectMeta, WatchEvent};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type EventSender<K> = UnboundedSender<Result<WatchEvent<K>>>;

/// In-memory list/watch source driven by the test
pub struct MockSource<K> {
    items: Mutex<Vec<K>>,
    version: AtomicU64,
    streams: Mutex<VecDeque<EventStream<K>>>,
    watch_errors: Mutex<VecDeque<Error>>,
    watched_versions: Mutex<Vec<String>>,
    pub fail_list: AtomicBool,
    pub hang_list: AtomicBool,
    pub list_started: Notify,
    pub list_calls: AtomicUsize,
    pub watch_calls: AtomicUsize,
}

impl<K: Clone + Send + Sync + 'static> MockSource<K> {
    pub fn new(items: Vec<K>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            version: AtomicU64::new(100),
            streams: Mutex::new(VecDeque::new()),
            watch_errors: Mutex::new(VecDeque::new()),
            watched_versions: Mutex::new(Vec::new()),
            fail_list: AtomicBool::new(false),
            hang_list: AtomicBool::new(false),
            list_started: Notify::new(),
            list_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn failing() -> Arc<Self> {
        let source = Self::empty();
        source.fail_list.store(true, Ordering::SeqCst);
        source
    }

    pub fn hanging() -> Arc<Self> {
        let source = Self::empty();
        source.hang_list.store(true, Ordering::SeqCst);
        source
    }

    /// Objects returned by the next listing
    pub fn set_items(&self, items: Vec<K>) {
        *self.items.lock().unwrap() = items;
    }

    /// Queue a stream for the next `watch` call and return its sender
    pub fn open_stream(&self) -> EventSender<K> {
        let (tx, rx) = unbounded_channel();
        self.streams
            .lock()
            .unwrap()
            .push_back(UnboundedReceiverStream::new(rx).boxed());
        tx
    }

    /// Queue a stream that ends immediately with `events`
    pub fn queue_events(&self, events: Vec<Result<WatchEvent<K>>>) {
        self.streams
            .lock()
            .unwrap()
            .push_back(futures::stream::iter(events).boxed());
    }

    /// Make the next `watch` call fail with `error` instead of opening a stream
    pub fn fail_next_watch(&self, error: Error) {
        self.watch_errors.lock().unwrap().push_back(error);
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_count(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn watched_versions(&self) -> Vec<String> {
        self.watched_versions.lock().unwrap().clone()
    }
}

#[async_trait]
impl<K: Clone + Send + Sync + 'static> ResourceSource<K> for MockSource<K> {
    async fn list(&self) -> Result<Listing<K>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list_started.notify_one();
        if self.hang_list.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Custom("list failed".to_string()));
        }
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Listing {
            items: self.items.lock().unwrap().clone(),
            resource_version: version.to_string(),
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<EventStream<K>> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        self.watched_versions
            .lock()
            .unwrap()
            .push(resource_version.to_string());
        let failure = self.watch_errors.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        let queued = self.streams.lock().unwrap().pop_front();
        // Nothing queued: stay open and silent
        Ok(queued.unwrap_or_else(|| futures::stream::pending().boxed()))
    }
}

/// One mock per tracked kind
pub struct MockSources {
    pub namespaces: Arc<MockSource<Namespace>>,
    pub nodes: Arc<MockSource<Node>>,
    pub pods: Arc<MockSource<Pod>>,
    pub services: Arc<MockSource<Service>>,
    pub daemon_sets: Arc<MockSource<DaemonSet>>,
    pub deployments: Arc<MockSource<Deployment>>,
    pub stateful_sets: Arc<MockSource<StatefulSet>>,
    pub replica_sets: Arc<MockSource<ReplicaSet>>,
    pub persistent_volumes: Arc<MockSource<PersistentVolume>>,
    pub storage_classes: Arc<MockSource<StorageClass>>,
    pub config_maps: Arc<MockSource<ConfigMap>>,
}

impl Default for MockSources {
    fn default() -> Self {
        Self {
            namespaces: MockSource::empty(),
            nodes: MockSource::empty(),
            pods: MockSource::empty(),
            services: MockSource::empty(),
            daemon_sets: MockSource::empty(),
            deployments: MockSource::empty(),
            stateful_sets: MockSource::empty(),
            replica_sets: MockSource::empty(),
            persistent_volumes: MockSource::empty(),
            storage_classes: MockSource::empty(),
            config_maps: MockSource::empty(),
        }
    }
}

impl MockSources {
    pub fn cache_sources(&self) -> CacheSources {
        CacheSources {
            namespaces: self.namespaces.clone(),
            nodes: self.nodes.clone(),
            pods: self.pods.clone(),
            services: self.services.clone(),
            daemon_sets: self.daemon_sets.clone(),
            deployments: self.deployments.clone(),
            stateful_sets: self.stateful_sets.clone(),
            replica_sets: self.replica_sets.clone(),
            persistent_volumes: self.persistent_volumes.clone(),
            storage_classes: self.storage_classes.clone(),
            config_maps: self.config_maps.clone(),
        }
    }
}

/// A client that never reaches a cluster; must be built inside a tokio runtime
pub fn mock_client() -> kube::Client {
    let (service, _handle) = tower_test::mock::pair::<
        hyper::http::Request<kube::client::Body>,
        hyper::http::Response<kube::client::Body>,
    >();
    kube::Client::new(service, "default")
}

/// Millisecond backoff so reconnect tests finish quickly
pub fn fast_config() -> WatcherConfig {
    WatcherConfig {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        restart_delay: Duration::from_millis(5),
        ..WatcherConfig::default()
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

fn meta(namespace: Option<&str>, name: &str, version: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        resource_version: Some(version.to_string()),
        ..ObjectMeta::default()
    }
}

pub fn node(name: &str, version: &str, labels: &[(&str, &str)]) -> Node {
    let mut metadata = meta(None, name, version);
    metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    );
    Node {
        metadata,
        ..Node::default()
    }
}

pub fn pod(namespace: &str, name: &str, version: &str) -> Pod {
    Pod {
        metadata: meta(Some(namespace), name, version),
        ..Pod::default()
    }
}

pub fn config_map(namespace: &str, name: &str, version: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: meta(Some(namespace), name, version),
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..ConfigMap::default()
    }
}

pub fn zone_of(node: &Node) -> Option<String> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get("zone").cloned())
}
