use kube::{Resource, ResourceExt};
use std::fmt;

/// Every category of cluster object the cache tracks independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespaces,
    Nodes,
    Pods,
    Services,
    DaemonSets,
    Deployments,
    StatefulSets,
    ReplicaSets,
    PersistentVolumes,
    StorageClasses,
    ConfigMaps,
}

impl ResourceKind {
    pub const ALL: [Self; 11] = [
        Self::Namespaces,
        Self::Nodes,
        Self::Pods,
        Self::Services,
        Self::DaemonSets,
        Self::Deployments,
        Self::StatefulSets,
        Self::ReplicaSets,
        Self::PersistentVolumes,
        Self::StorageClasses,
        Self::ConfigMaps,
    ];

    /// Plural resource name as used in API paths
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Namespaces => "namespaces",
            Self::Nodes => "nodes",
            Self::Pods => "pods",
            Self::Services => "services",
            Self::DaemonSets => "daemonsets",
            Self::Deployments => "deployments",
            Self::StatefulSets => "statefulsets",
            Self::ReplicaSets => "replicasets",
            Self::PersistentVolumes => "persistentvolumes",
            Self::StorageClasses => "storageclasses",
            Self::ConfigMaps => "configmaps",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key for an object: `namespace/name`, or just `name` when cluster-scoped
pub fn object_key<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{}", obj.name_any()),
        _ => obj.name_any(),
    }
}
