//! Configuration for the e2e harness
//!
//! Settings are resolved in this order:
//! 1. Environment variables (highest priority)
//! 2. Configuration file (TOML format)
//! 3. Default values (lowest priority)

use crate::driver::{azurefile::DEFAULT_DRIVER_NAME, AzureFileDriver, Capability};
use crate::logging::LoggingConfig;
use crate::orchestrator::StorageClassSource;
use crate::verifier::PollConfig;
use azurefile_e2e_common::{parse_quantity, StorageAccountTiers};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Rotation used by the multiple-account-type scenario
    pub storage_account_tiers: StorageAccountTiers,
    /// Cluster connection
    pub kubernetes: KubernetesConfig,
    /// CSI driver under test
    pub driver: DriverConfig,
    /// Per-scenario namespaces
    pub namespace: NamespaceConfig,
    /// Polling bounds
    pub timeouts: TimeoutConfig,
    /// Container images for test workloads
    pub images: WorkloadImages,
    /// Scenario inputs for a full run
    pub suite: SuiteConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Cluster connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// Kubeconfig file; inferred like kubectl when unset
    pub kubeconfig: Option<PathBuf>,
    /// Context inside the kubeconfig
    pub context: Option<String>,
}

/// Driver under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// CSI driver name
    pub name: String,
    /// Capabilities the driver is exercised with
    pub capabilities: Vec<Capability>,
    /// Default StorageClass parameters
    pub parameters: BTreeMap<String, String>,
}

/// Inputs of the scenario suite
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Size requested by every claim
    pub claim_size: String,
    /// Run the workloads on Windows nodes
    pub windows: bool,
    /// Existing share for the pre-provisioned scenarios, skipped when unset
    pub pre_provisioned_volume_id: Option<String>,
    pub pre_provisioned_share_name: Option<String>,
}

/// Namespace settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Prefix for generated namespace names
    pub prefix: String,
}

/// Timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub poll_interval_secs: u64,
    pub claim_bound_secs: u64,
    pub pod_completion_secs: u64,
    pub workload_ready_secs: u64,
    pub deletion_secs: u64,
}

/// Images used by test pods
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadImages {
    pub linux: String,
    pub windows: String,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            storage_account_tiers: StorageAccountTiers::default(),
            kubernetes: KubernetesConfig::default(),
            driver: DriverConfig::default(),
            namespace: NamespaceConfig::default(),
            timeouts: TimeoutConfig::default(),
            images: WorkloadImages::default(),
            suite: SuiteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DRIVER_NAME.to_string(),
            capabilities: Capability::all(),
            parameters: AzureFileDriver::default_parameters(),
        }
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            claim_size: "10Gi".to_string(),
            windows: false,
            pre_provisioned_volume_id: None,
            pre_provisioned_share_name: None,
        }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            prefix: "azurefile-".to_string(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            claim_bound_secs: 5 * 60,
            pod_completion_secs: 15 * 60,
            workload_ready_secs: 10 * 60,
            deletion_secs: 5 * 60,
        }
    }
}

impl Default for WorkloadImages {
    fn default() -> Self {
        Self {
            linux: "registry.k8s.io/e2e-test-images/busybox:1.29-4".to_string(),
            windows: "mcr.microsoft.com/windows/servercore:ltsc2019".to_string(),
        }
    }
}

impl DriverConfig {
    /// Build the driver with the configured capability set
    pub fn build(&self) -> AzureFileDriver {
        AzureFileDriver::with_capabilities(self.name.clone(), self.capabilities.clone())
    }

    /// Classes created by the dynamic scenarios carry the configured parameters
    pub fn storage_class_source(&self) -> StorageClassSource {
        StorageClassSource::Create(self.parameters.clone())
    }
}

impl TimeoutConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            claim_bound_timeout: Duration::from_secs(self.claim_bound_secs),
            pod_completion_timeout: Duration::from_secs(self.pod_completion_secs),
            workload_ready_timeout: Duration::from_secs(self.workload_ready_secs),
            deletion_timeout: Duration::from_secs(self.deletion_secs),
        }
    }
}

impl E2eConfig {
    /// Load configuration from environment variables and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("AZUREFILE_E2E_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("./azurefile-e2e.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `AZUREFILE_E2E_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Kubernetes
        if let Some(path) = lookup("AZUREFILE_E2E_KUBECONFIG") {
            self.kubernetes.kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(context) = lookup("AZUREFILE_E2E_CONTEXT") {
            self.kubernetes.context = Some(context);
        }

        // Driver
        if let Some(name) = lookup("AZUREFILE_E2E_DRIVER_NAME") {
            self.driver.name = name;
        }
        if let Some(prefix) = lookup("AZUREFILE_E2E_NAMESPACE_PREFIX") {
            self.namespace.prefix = prefix;
        }

        // Timeouts
        if let Some(value) = lookup("AZUREFILE_E2E_POLL_INTERVAL_SECS") {
            self.timeouts.poll_interval_secs = parse_secs("AZUREFILE_E2E_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("AZUREFILE_E2E_CLAIM_BOUND_TIMEOUT_SECS") {
            self.timeouts.claim_bound_secs =
                parse_secs("AZUREFILE_E2E_CLAIM_BOUND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("AZUREFILE_E2E_POD_TIMEOUT_SECS") {
            self.timeouts.pod_completion_secs = parse_secs("AZUREFILE_E2E_POD_TIMEOUT_SECS", &value)?;
        }

        // Tiers
        if let Some(value) = lookup("AZUREFILE_E2E_STORAGE_ACCOUNT_TIERS") {
            let tiers = value
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from);
            self.storage_account_tiers = StorageAccountTiers::new(tiers)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        // Images
        if let Some(image) = lookup("AZUREFILE_E2E_LINUX_IMAGE") {
            self.images.linux = image;
        }
        if let Some(image) = lookup("AZUREFILE_E2E_WINDOWS_IMAGE") {
            self.images.windows = image;
        }

        // Suite
        if let Some(size) = lookup("AZUREFILE_E2E_CLAIM_SIZE") {
            self.suite.claim_size = size;
        }
        if let Some(value) = lookup("AZUREFILE_E2E_WINDOWS") {
            self.suite.windows = value.parse().map_err(|_| {
                ConfigError::Validation("AZUREFILE_E2E_WINDOWS must be true or false".to_string())
            })?;
        }
        if let Some(volume_id) = lookup("AZUREFILE_E2E_PRE_PROVISIONED_VOLUME_ID") {
            self.suite.pre_provisioned_volume_id = Some(volume_id);
        }
        if let Some(share_name) = lookup("AZUREFILE_E2E_PRE_PROVISIONED_SHARE_NAME") {
            self.suite.pre_provisioned_share_name = Some(share_name);
        }

        // Logging
        if let Some(level) = lookup("AZUREFILE_E2E_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(dir) = lookup("AZUREFILE_E2E_LOG_DIR") {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.name.is_empty() {
            return Err(ConfigError::Validation(
                "Driver name cannot be empty".to_string(),
            ));
        }

        if self.timeouts.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Poll interval cannot be 0".to_string(),
            ));
        }

        if self.storage_account_tiers.is_empty() {
            return Err(ConfigError::Validation(
                "Storage account tier table cannot be empty".to_string(),
            ));
        }

        if let Err(e) = parse_quantity(&self.suite.claim_size) {
            return Err(ConfigError::Validation(format!("Claim size: {}", e)));
        }

        if self.namespace.prefix.is_empty() {
            return Err(ConfigError::Validation(
                "Namespace prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} must be a number of seconds", key)))
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),
    /// Failed to parse configuration
    #[error("Failed to parse config: {0}")]
    Parse(String),
    /// Configuration validation failed
    #[error("Config validation failed: {0}")]
    Validation(String),
}
