//! Kubernetes client wrapper
//!
//! Wraps the kube-rs Client with the API server it talks to.

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;

use crate::config::KubernetesConfig;
use crate::error::{E2eError, E2eResult};

/// Wrapper around kube-rs Client
#[derive(Clone)]
pub struct K8sClient {
    inner: Client,
    api_server: String,
}

impl K8sClient {
    /// Connect as configured: an explicit kubeconfig file, a context of the
    /// default kubeconfig, or whatever kubectl would use
    pub async fn connect(config: &KubernetesConfig) -> E2eResult<Self> {
        match (&config.kubeconfig, &config.context) {
            (Some(path), context) => Self::from_kubeconfig_file(path, context.as_deref()).await,
            (None, Some(context)) => Self::from_context(context).await,
            (None, None) => Self::infer().await,
        }
    }

    /// Create client from a kubeconfig file with optional context
    pub async fn from_kubeconfig_file(path: &Path, context: Option<&str>) -> E2eResult<Self> {
        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
            E2eError::InvalidKubeconfig(format!(
                "Failed to read kubeconfig {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: context.map(String::from),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| E2eError::InvalidKubeconfig(format!("Failed to create config: {}", e)))?;

        Self::from_config(config)
    }

    /// Create client from a context of the default kubeconfig
    pub async fn from_context(context: &str) -> E2eResult<Self> {
        let config = Config::from_kubeconfig(&KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| {
            E2eError::InvalidKubeconfig(format!("Failed to load context {}: {}", context, e))
        })?;

        Self::from_config(config)
    }

    /// Create client the way kubectl would: KUBECONFIG, ~/.kube/config, then in-cluster
    pub async fn infer() -> E2eResult<Self> {
        let config = Config::infer()
            .await
            .map_err(|e| E2eError::InvalidKubeconfig(format!("Failed to infer config: {}", e)))?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> E2eResult<Self> {
        let api_server = config.cluster_url.to_string();

        let client = Client::try_from(config)
            .map_err(|e| E2eError::InvalidKubeconfig(format!("Failed to create client: {}", e)))?;

        tracing::debug!(api_server = %api_server, "Kubernetes client created");

        Ok(Self {
            inner: client,
            api_server,
        })
    }

    /// Get the inner kube-rs Client
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Get API server URL
    pub fn api_server(&self) -> &str {
        &self.api_server
    }
}

impl std::fmt::Debug for K8sClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("K8sClient")
            .field("api_server", &self.api_server)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: e2e
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: e2e
  context:
    cluster: e2e
    user: e2e
current-context: e2e
users:
- name: e2e
  user:
    token: e2e-token
"#;

    fn kubeconfig_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", KUBECONFIG).unwrap();
        file
    }

    #[tokio::test]
    async fn test_connect_with_kubeconfig_and_context() {
        let file = kubeconfig_file();
        let config = KubernetesConfig {
            kubeconfig: Some(file.path().to_path_buf()),
            context: Some("e2e".to_string()),
        };

        let client = K8sClient::connect(&config).await.unwrap();
        assert!(client.api_server().starts_with("https://127.0.0.1:6443"));
    }

    #[tokio::test]
    async fn test_connect_with_unknown_context() {
        let file = kubeconfig_file();
        let config = KubernetesConfig {
            kubeconfig: Some(file.path().to_path_buf()),
            context: Some("missing".to_string()),
        };

        let err = K8sClient::connect(&config).await.unwrap_err();
        assert!(matches!(err, E2eError::InvalidKubeconfig(_)));
    }
}
