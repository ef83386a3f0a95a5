// Client creation with custom user-agent support for kube 2.x
use crate::error::Result;
use hyper::http::{HeaderName, HeaderValue};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::{debug, warn};

/// Add a `user-agent` header to `config`, skipping values that are not valid header text
pub fn add_user_agent_header(config: &mut Config, user_agent: Option<&str>) {
    if let Some(user_agent) = user_agent {
        match HeaderValue::from_str(user_agent) {
            Ok(header_value) => {
                config
                    .headers
                    .push((HeaderName::from_static("user-agent"), header_value));
            }
            Err(e) => warn!("Ignoring invalid user agent {:?}: {}", user_agent, e),
        }
    }
}

/// Load the client configuration.
///
/// An explicit kubeconfig path wins; otherwise the config is inferred from the
/// environment (`KUBECONFIG`, `~/.kube/config`, then in-cluster service account).
///
/// # Errors
///
/// Will return `Err` if the kubeconfig cannot be read or no configuration can be inferred
pub async fn load_config(kubeconfig: Option<&Path>) -> Result<Config> {
    if let Some(path) = kubeconfig {
        debug!("📄 Loading Kubernetes configuration from {}", path.display());
        let kubeconfig = Kubeconfig::read_from(path)?;
        return Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?);
    }

    debug!("📄 Inferring Kubernetes configuration");
    Ok(Config::infer().await?)
}

/// Create a new k8s client to interact with k8s cluster api
///
/// # Errors
///
/// Will return `Err` if the configuration cannot be loaded or the client cannot be built
pub async fn new(kubeconfig: Option<&Path>, custom_user_agent: Option<&str>) -> Result<Client> {
    let mut config = load_config(kubeconfig).await?;
    add_user_agent_header(&mut config, custom_user_agent);

    let client = Client::try_from(config)?;

    Ok(client)
}
