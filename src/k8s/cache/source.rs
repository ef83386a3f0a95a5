use super::config::WATCH_TIMEOUT_SECONDS;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Result of one full listing: every object plus the point-in-time it was taken at
#[derive(Debug, Clone)]
pub struct Listing<K> {
    pub items: Vec<K>,
    pub resource_version: String,
}

pub type EventStream<K> = BoxStream<'static, Result<WatchEvent<K>>>;

/// Upstream list/watch operations for one resource kind
#[async_trait]
pub trait ResourceSource<K>: Send + Sync {
    /// Full listing of the kind
    async fn list(&self) -> Result<Listing<K>>;

    /// Change stream starting after `resource_version`
    async fn watch(&self, resource_version: &str) -> Result<EventStream<K>>;
}

/// `ResourceSource` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSource<K> {
    api: Api<K>,
    field_selector: Option<String>,
    watch_timeout_secs: u32,
}

impl<K> KubeSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    /// Cluster-wide source (all namespaces, or a cluster-scoped kind)
    #[must_use]
    pub fn all(client: Client) -> Self {
        Self::from_api(Api::all(client))
    }

    #[must_use]
    pub fn namespaced(client: Client, namespace: &str) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        Self::from_api(Api::namespaced(client, namespace))
    }

    fn from_api(api: Api<K>) -> Self {
        Self {
            api,
            field_selector: None,
            watch_timeout_secs: WATCH_TIMEOUT_SECONDS,
        }
    }

    /// Restrict listing and watching with a server-side field selector
    #[must_use]
    pub fn with_field_selector(mut self, selector: &str) -> Self {
        self.field_selector = Some(selector.to_string());
        self
    }

    #[must_use]
    pub const fn with_watch_timeout(mut self, seconds: u32) -> Self {
        self.watch_timeout_secs = seconds;
        self
    }

    fn list_params(&self) -> ListParams {
        let lp = ListParams::default();
        match &self.field_selector {
            Some(selector) => lp.fields(selector),
            None => lp,
        }
    }

    fn watch_params(&self) -> WatchParams {
        let wp = WatchParams::default().timeout(self.watch_timeout_secs);
        match &self.field_selector {
            Some(selector) => wp.fields(selector),
            None => wp,
        }
    }
}

#[async_trait]
impl<K> ResourceSource<K> for KubeSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    async fn list(&self) -> Result<Listing<K>> {
        let list = self.api.list(&self.list_params()).await?;
        let resource_version = list.metadata.resource_version.unwrap_or_default();
        debug!(
            "listed {} objects at resource version {}",
            list.items.len(),
            resource_version
        );

        Ok(Listing {
            items: list.items,
            resource_version,
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<EventStream<K>> {
        let stream = self.api.watch(&self.watch_params(), resource_version).await?;
        Ok(stream.map_err(Error::from).boxed())
    }
}
