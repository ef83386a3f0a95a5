use crate::k8s::cache::config::DEFAULT_CONFIG_NAMESPACE;
use crate::k8s::cache::{CacheConfig, WatcherConfig};
use crate::report::ReportConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Node labels that never take part in node grouping by default
pub const DEFAULT_IGNORE_LABELS: [&str; 4] = [
    "kubernetes.io/hostname",
    "topology.kubernetes.io/zone",
    "failure-domain.beta.kubernetes.io/zone",
    "logzio/az",
];

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a kubeconfig file, inferred from the environment when unset
    #[arg(long, env = "KUBECONFIG_PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace whose config maps are cached and watched for changes
    #[arg(long, env = "CLUSTERCACHE_NAMESPACE", default_value = DEFAULT_CONFIG_NAMESPACE)]
    pub config_namespace: String,

    /// Replace pod and owner names with their SHA-256 digest in reports
    #[arg(long, env = "SHOULD_HASH")]
    pub hash_names: bool,

    /// Directory the CSV reports are written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Node label excluded from node grouping (repeatable)
    #[arg(long = "ignore-label", value_name = "LABEL", default_values = DEFAULT_IGNORE_LABELS)]
    pub ignore_labels: Vec<String>,

    /// Keep watching and rewrite the reports every N seconds until interrupted
    #[arg(long, value_name = "SECONDS")]
    pub refresh_secs: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            config_namespace: self.config_namespace.clone(),
            watcher: WatcherConfig::default(),
        }
    }

    #[must_use]
    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            ignore_labels: self.ignore_labels.clone(),
            hash_names: self.hash_names,
            output_dir: self.output_dir.clone(),
        }
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}
