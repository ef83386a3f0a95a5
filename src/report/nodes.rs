use super::quantity::{cpu_millis, memory_bytes};
use crate::error::Result;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

/// Nodes sharing the same set of non-ignored labels
#[derive(Debug, Clone)]
pub struct NodeGroup {
    pub id: usize,
    /// Sorted `key:value` pairs of the non-ignored labels, comma separated
    pub signature: String,
    pub nodes: Vec<Arc<Node>>,
    /// Labels of the group present on every node in the cluster, as `key : value`
    pub common_labels: Vec<String>,
    /// Label keys of the group missing from at least one node in the cluster
    pub unique_labels: Vec<String>,
    /// Label keys of the group excluded from the signature
    pub ignore_labels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeGroups {
    pub groups: Vec<NodeGroup>,
    pub node_to_group: HashMap<String, usize>,
}

impl NodeGroups {
    /// Group id of `node_name`, as written to the pod report
    #[must_use]
    pub fn group_of(&self, node_name: &str) -> Option<usize> {
        self.node_to_group.get(node_name).copied()
    }
}

fn signature(node: &Node, ignore_labels: &[String]) -> String {
    let mut labels: Vec<String> = node
        .labels()
        .iter()
        .filter(|(k, _)| !ignore_labels.contains(*k))
        .map(|(k, v)| format!("{k}:{v}"))
        .collect();
    labels.sort();
    labels.join(",")
}

/// Group `nodes` by label signature; groups are numbered in signature order
#[must_use]
pub fn group_nodes(nodes: &[Arc<Node>], ignore_labels: &[String]) -> NodeGroups {
    let mut label_counts: HashMap<&str, usize> = HashMap::new();
    let mut by_signature: BTreeMap<String, Vec<Arc<Node>>> = BTreeMap::new();

    for node in nodes {
        for key in node.labels().keys() {
            *label_counts.entry(key.as_str()).or_default() += 1;
        }
        by_signature
            .entry(signature(node, ignore_labels))
            .or_default()
            .push(node.clone());
    }

    let mut result = NodeGroups::default();
    for (id, (signature, mut members)) in by_signature.into_iter().enumerate() {
        members.sort_by_key(|n| n.name_any());

        let mut common_labels = Vec::new();
        let mut unique_labels = Vec::new();
        let mut ignored = Vec::new();
        // BTreeMap keys are already sorted
        for (key, value) in members[0].labels() {
            if ignore_labels.contains(key) {
                ignored.push(key.clone());
            }
            if label_counts.get(key.as_str()).copied() == Some(nodes.len()) {
                common_labels.push(format!("{key} : {value}"));
            } else {
                unique_labels.push(key.clone());
            }
        }

        for node in &members {
            result.node_to_group.insert(node.name_any(), id);
        }
        result.groups.push(NodeGroup {
            id,
            signature,
            nodes: members,
            common_labels,
            unique_labels,
            ignore_labels: ignored,
        });
    }

    result
}

fn taints(node: &Node) -> String {
    node.spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .map(|t| {
                    format!(
                        "{}:{}({})",
                        t.key,
                        t.value.as_deref().unwrap_or_default(),
                        t.effect
                    )
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// `node_groups.csv`: one row per group
///
/// # Errors
///
/// Returns an error if writing to `out` fails
pub fn write_groups_csv<W: Write>(groups: &NodeGroups, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["group_id", "number_of_nodes", "unique_labels", "ignore_labels"])?;
    for group in &groups.groups {
        writer.write_record([
            group.id.to_string(),
            group.nodes.len().to_string(),
            group.unique_labels.join(" | "),
            group.ignore_labels.join(" | "),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// `nodes.csv`: one row per node with capacity and allocatable resources
///
/// # Errors
///
/// Returns an error if writing to `out` fails
pub fn write_nodes_csv<W: Write>(groups: &NodeGroups, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "group_id",
        "node_name",
        "taints",
        "cap_cpu_mili_core",
        "cap_memory_byte",
        "alloc_cpu_mili_core",
        "alloc_bytes",
    ])?;

    for group in &groups.groups {
        for node in &group.nodes {
            let status = node.status.as_ref();
            let capacity = status.and_then(|s| s.capacity.as_ref());
            let allocatable = status.and_then(|s| s.allocatable.as_ref());
            writer.write_record([
                group.id.to_string(),
                node.name_any(),
                taints(node),
                cpu_millis(capacity).to_string(),
                memory_bytes(capacity).to_string(),
                cpu_millis(allocatable).to_string(),
                memory_bytes(allocatable).to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Human readable description of every group
///
/// # Errors
///
/// Returns an error if writing to `out` fails
pub fn write_summary<W: Write>(groups: &NodeGroups, out: &mut W) -> Result<()> {
    for group in &groups.groups {
        writeln!(out, "===== Node group: {} ======", group.id)?;
        writeln!(out, " * common labels: {}", group.common_labels.join(","))?;
        writeln!(out, " * ignore labels (not participating in group calculation):")?;
        for key in &group.ignore_labels {
            writeln!(out, "    * {key}")?;
        }
        writeln!(out, " * unique labels:")?;
        for key in &group.unique_labels {
            writeln!(out, "    * {key}")?;
        }
        writeln!(out, "Nodes:")?;
        for node in &group.nodes {
            let taints = taints(node);
            writeln!(
                out,
                " * Name: {}, node taints: {}",
                node.name_any(),
                if taints.is_empty() { "-" } else { taints.as_str() }
            )?;
        }
    }
    Ok(())
}
