pub mod nodes;
pub mod pods;
pub mod quantity;
pub mod workloads;

use crate::error::Result;
use crate::k8s::cache::ClusterCache;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

pub const NODE_GROUPS_FILE: &str = "node_groups.csv";
pub const NODES_FILE: &str = "nodes.csv";
pub const PODS_FILE: &str = "pods.csv";

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub ignore_labels: Vec<String>,
    pub hash_names: bool,
    pub output_dir: PathBuf,
}

fn create(config: &ReportConfig, name: &str) -> Result<BufWriter<File>> {
    let path = config.output_dir.join(name);
    info!("writing {}", path.display());
    Ok(BufWriter::new(File::create(path)?))
}

/// Write the CSV reports from the current cache contents into
/// `config.output_dir` and the text summaries to `out`
///
/// # Errors
///
/// Returns an error if the output directory or any report cannot be written
pub fn generate<W: Write>(cache: &ClusterCache, config: &ReportConfig, out: &mut W) -> Result<()> {
    std::fs::create_dir_all(&config.output_dir)?;

    let groups = nodes::group_nodes(&cache.get_all_nodes(), &config.ignore_labels);
    nodes::write_groups_csv(&groups, create(config, NODE_GROUPS_FILE)?)?;
    nodes::write_nodes_csv(&groups, create(config, NODES_FILE)?)?;
    pods::write_pods_csv(
        &cache.get_all_pods(),
        &groups,
        config.hash_names,
        create(config, PODS_FILE)?,
    )?;

    nodes::write_summary(&groups, out)?;
    let workloads = workloads::summarise_workloads(
        &cache.get_all_daemon_sets(),
        &cache.get_all_stateful_sets(),
        &cache.get_all_deployments(),
    );
    workloads::write_workloads(&workloads, out)?;
    out.flush()?;

    info!(
        node_groups = groups.groups.len(),
        workloads = workloads.len(),
        "reports generated"
    );
    Ok(())
}
