use super::nodes::NodeGroups;
use super::quantity::{cpu_millis, memory_bytes};
use crate::error::Result;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;

/// Summed container requests and limits of one pod
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodResources {
    pub request_cpu_millis: i64,
    pub request_memory_bytes: i64,
    pub limit_cpu_millis: i64,
    pub limit_memory_bytes: i64,
}

#[must_use]
pub fn pod_resources(pod: &Pod) -> PodResources {
    let mut total = PodResources::default();
    let containers = pod.spec.iter().flat_map(|spec| spec.containers.iter());
    for container in containers {
        let Some(resources) = container.resources.as_ref() else {
            continue;
        };
        let requests = resources.requests.as_ref();
        let limits = resources.limits.as_ref();
        total.request_cpu_millis += cpu_millis(requests);
        total.request_memory_bytes += memory_bytes(requests);
        total.limit_cpu_millis += cpu_millis(limits);
        total.limit_memory_bytes += memory_bytes(limits);
    }
    total
}

/// Hex SHA-256 digest, used to anonymise names
#[must_use]
pub fn anonymise(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

/// `pods.csv`: one row per pod, sorted by namespace then name
///
/// # Errors
///
/// Returns an error if writing to `out` fails
pub fn write_pods_csv<W: Write>(
    pods: &[Arc<Pod>],
    groups: &NodeGroups,
    hash_names: bool,
    out: W,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "pod_name",
        "node_name",
        "node_group",
        "namespace",
        "owner_kind",
        "owner_name",
        "req_cpu_milli_core",
        "req_mem_byte",
        "limit_cpu_mili_core",
        "limit_mem_bytes",
    ])?;

    let mut pods: Vec<&Arc<Pod>> = pods.iter().collect();
    pods.sort_by_key(|p| (p.namespace().unwrap_or_default(), p.name_any()));

    for pod in pods {
        let owners = pod.owner_references();
        let owner_kinds: Vec<&str> = owners.iter().map(|o| o.kind.as_str()).collect();
        let owner_names: Vec<&str> = owners.iter().map(|o| o.name.as_str()).collect();

        let mut pod_name = pod.name_any();
        let mut owner_name = owner_names.join("|");
        if hash_names {
            pod_name = anonymise(&pod_name);
            owner_name = anonymise(&owner_name);
        }

        let node_name = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.node_name.clone())
            .unwrap_or_default();
        let node_group = groups
            .group_of(&node_name)
            .map(|id| id.to_string())
            .unwrap_or_default();
        let resources = pod_resources(pod);

        writer.write_record([
            pod_name,
            node_name,
            node_group,
            pod.namespace().unwrap_or_default(),
            owner_kinds.join("|"),
            owner_name,
            resources.request_cpu_millis.to_string(),
            resources.request_memory_bytes.to_string(),
            resources.limit_cpu_millis.to_string(),
            resources.limit_memory_bytes.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
