use clap::Parser;
use clustercache::config::Args;
use clustercache::error::Result;
use clustercache::k8s::cache::{ClusterCache, UpdateEvent};
use clustercache::k8s::{USER_AGENT, client};
use clustercache::{report, telemetry};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn log_config_map_change(event: &UpdateEvent<ConfigMap>) {
    let action = match event {
        UpdateEvent::Added(_) => "added",
        UpdateEvent::Modified(_) => "modified",
        UpdateEvent::Deleted(_) => "deleted",
    };
    info!(
        config_map = %event.object().name_any(),
        "config map {action}"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init(args.log_json)?;
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let client = client::new(args.kubeconfig.as_deref(), Some(USER_AGENT)).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("unable to listen for ctrl-c: {e}");
            return;
        }
        info!("interrupted, shutting down");
        on_signal.cancel();
    });

    let cache = ClusterCache::new(client, &args.cache_config(), cancel.clone()).await?;
    cache.set_config_map_update_func(Arc::new(log_config_map_change));
    cache.run();
    for stats in cache.stats() {
        info!(kind = %stats.kind, objects = stats.objects, "cache warm");
    }

    let report_config = args.report_config();
    report::generate(&cache, &report_config, &mut std::io::stdout().lock())?;

    if let Some(interval) = args.refresh_interval() {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {
                    if let Err(e) = report::generate(&cache, &report_config, &mut std::io::stdout().lock()) {
                        error!("report refresh failed: {e}");
                    }
                }
            }
        }
    }

    cache.shutdown().await;
    Ok(())
}
