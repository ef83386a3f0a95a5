use super::quantity::{cpu_millis, memory_bytes};
use crate::error::Result;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

/// Scheduling-relevant view of a workload controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSummary {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
    /// Desired replicas; daemon sets report the number of scheduled pods
    pub replicas: i32,
    pub selector: Vec<String>,
    pub node_selector: Vec<String>,
    pub has_affinity: bool,
    /// `(container, cpu milli-cores, memory bytes)` requests
    pub containers: Vec<(String, i64, i64)>,
}

fn pairs(map: Option<&BTreeMap<String, String>>) -> Vec<String> {
    map.into_iter()
        .flatten()
        .map(|(k, v)| format!("{k}={v}"))
        .collect()
}

fn selector_terms(selector: &LabelSelector) -> Vec<String> {
    let mut terms = pairs(selector.match_labels.as_ref());
    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.as_deref().unwrap_or_default().join(",");
        terms.push(format!("{} {} [{values}]", expr.key, expr.operator));
    }
    terms
}

fn summarise(
    kind: &'static str,
    meta: &impl ResourceExt,
    replicas: i32,
    selector: &LabelSelector,
    template: &PodTemplateSpec,
) -> WorkloadSummary {
    let spec = template.spec.as_ref();
    let containers = spec
        .map(|s| s.containers.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|c| {
            let requests = c.resources.as_ref().and_then(|r| r.requests.as_ref());
            (c.name.clone(), cpu_millis(requests), memory_bytes(requests))
        })
        .collect();

    WorkloadSummary {
        kind,
        namespace: meta.namespace().unwrap_or_default(),
        name: meta.name_any(),
        replicas,
        selector: selector_terms(selector),
        node_selector: pairs(spec.and_then(|s| s.node_selector.as_ref())),
        has_affinity: spec.is_some_and(|s| s.affinity.is_some()),
        containers,
    }
}

/// Summaries of every daemon set, stateful set and deployment, sorted by kind,
/// namespace and name
#[must_use]
pub fn summarise_workloads(
    daemon_sets: &[Arc<DaemonSet>],
    stateful_sets: &[Arc<StatefulSet>],
    deployments: &[Arc<Deployment>],
) -> Vec<WorkloadSummary> {
    let mut summaries = Vec::new();
    for ds in daemon_sets {
        let Some(spec) = ds.spec.as_ref() else {
            continue;
        };
        let scheduled = ds
            .status
            .as_ref()
            .map_or(0, |s| s.current_number_scheduled);
        summaries.push(summarise(
            "DaemonSet",
            ds.as_ref(),
            scheduled,
            &spec.selector,
            &spec.template,
        ));
    }
    for sts in stateful_sets {
        let Some(spec) = sts.spec.as_ref() else {
            continue;
        };
        summaries.push(summarise(
            "StatefulSet",
            sts.as_ref(),
            spec.replicas.unwrap_or(1),
            &spec.selector,
            &spec.template,
        ));
    }
    for deploy in deployments {
        let Some(spec) = deploy.spec.as_ref() else {
            continue;
        };
        summaries.push(summarise(
            "Deployment",
            deploy.as_ref(),
            spec.replicas.unwrap_or(1),
            &spec.selector,
            &spec.template,
        ));
    }
    summaries.sort_by(|a, b| {
        (a.kind, &a.namespace, &a.name).cmp(&(b.kind, &b.namespace, &b.name))
    });
    summaries
}

/// Human readable workload report
///
/// # Errors
///
/// Returns an error if writing to `out` fails
pub fn write_workloads<W: Write>(summaries: &[WorkloadSummary], out: &mut W) -> Result<()> {
    for w in summaries {
        writeln!(out, "===== {}: {}/{} ======", w.kind, w.namespace, w.name)?;
        writeln!(out, " * replicas: {}", w.replicas)?;
        writeln!(out, " * selector: {}", w.selector.join(", "))?;
        if !w.node_selector.is_empty() {
            writeln!(out, " * node selector: {}", w.node_selector.join(", "))?;
        }
        if w.has_affinity {
            writeln!(out, " * has affinity rules")?;
        }
        for (name, cpu, memory) in &w.containers {
            writeln!(out, "    * {name}: cpu {cpu}m, memory {memory}")?;
        }
    }
    Ok(())
}
