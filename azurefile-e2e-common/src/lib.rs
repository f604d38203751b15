//! Declarative volume and workload descriptions shared by the e2e harness

pub mod quantity;

use serde::{Deserialize, Serialize};

pub use quantity::{parse_quantity, QuantityError};

/// Subdirectory mounted by the subpath scenarios
pub const SUBPATH_DIR: &str = "test";

/// Kind used for claims restored from a snapshot
pub const VOLUME_SNAPSHOT_KIND: &str = "VolumeSnapshot";
pub const SNAPSHOT_API_GROUP: &str = "snapshot.storage.k8s.io";
pub const SNAPSHOT_API_VERSION: &str = "snapshot.storage.k8s.io/v1beta1";

/// How a claim exposes its volume to the pod
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum VolumeMode {
    #[default]
    FileSystem,
    Block,
}

impl VolumeMode {
    /// Value of `spec.volumeMode` on claims and volumes
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeMode::FileSystem => "Filesystem",
            VolumeMode::Block => "Block",
        }
    }
}

/// StorageClass `volumeBindingMode`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolumeBindingMode {
    Immediate,
    WaitForFirstConsumer,
}

impl VolumeBindingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeBindingMode::Immediate => "Immediate",
            VolumeBindingMode::WaitForFirstConsumer => "WaitForFirstConsumer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Immediate" => Some(VolumeBindingMode::Immediate),
            "WaitForFirstConsumer" => Some(VolumeBindingMode::WaitForFirstConsumer),
            _ => None,
        }
    }
}

/// PersistentVolume reclaim policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReclaimPolicy {
    Delete,
    Retain,
    Recycle,
}

impl ReclaimPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimPolicy::Delete => "Delete",
            ReclaimPolicy::Retain => "Retain",
            ReclaimPolicy::Recycle => "Recycle",
        }
    }
}

/// Naming template for filesystem mounts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeMountDetails {
    pub name_generate: String,
    pub mount_path_generate: String,
    #[serde(default)]
    pub read_only: bool,
}

impl Default for VolumeMountDetails {
    fn default() -> Self {
        Self {
            name_generate: "test-volume-".to_string(),
            mount_path_generate: "/mnt/test-".to_string(),
            read_only: false,
        }
    }
}

/// Naming template for raw block devices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeDeviceDetails {
    pub name_generate: String,
    pub device_path: String,
}

impl Default for VolumeDeviceDetails {
    fn default() -> Self {
        Self {
            name_generate: "test-block-".to_string(),
            device_path: "/dev/e2e-test".to_string(),
        }
    }
}

/// Snapshot a claim is restored from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSource {
    pub name: String,
}

/// One volume exercised by a scenario
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeDetails {
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub fs_type: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub mount_options: Vec<String>,
    pub claim_size: String,
    #[serde(default)]
    pub reclaim_policy: Option<ReclaimPolicy>,
    /// Absent means Immediate
    #[serde(default)]
    pub volume_binding_mode: Option<VolumeBindingMode>,
    #[serde(default)]
    pub allowed_topology_values: Vec<String>,
    #[serde(default)]
    pub volume_mode: VolumeMode,
    #[serde(default)]
    pub volume_mount: VolumeMountDetails,
    #[serde(default)]
    pub volume_device: VolumeDeviceDetails,
    /// Pre-provisioned volumes only
    #[serde(default)]
    pub volume_id: Option<String>,
    #[serde(default)]
    pub data_source: Option<DataSource>,
    #[serde(default)]
    pub share_name: Option<String>,
    #[serde(default)]
    pub node_stage_secret_ref: Option<String>,
}

impl VolumeDetails {
    /// Filesystem volume of the given size with default naming templates
    pub fn new(claim_size: impl Into<String>) -> Self {
        Self {
            volume_type: String::new(),
            fs_type: String::new(),
            encrypted: false,
            mount_options: Vec::new(),
            claim_size: claim_size.into(),
            reclaim_policy: None,
            volume_binding_mode: None,
            allowed_topology_values: Vec::new(),
            volume_mode: VolumeMode::FileSystem,
            volume_mount: VolumeMountDetails::default(),
            volume_device: VolumeDeviceDetails::default(),
            volume_id: None,
            data_source: None,
            share_name: None,
            node_stage_secret_ref: None,
        }
    }

    /// Volume backed by an existing share identified by `volume_id`
    pub fn pre_provisioned(volume_id: impl Into<String>, claim_size: impl Into<String>) -> Self {
        Self {
            volume_id: Some(volume_id.into()),
            ..Self::new(claim_size)
        }
    }

    pub fn with_binding_mode(mut self, mode: VolumeBindingMode) -> Self {
        self.volume_binding_mode = Some(mode);
        self
    }

    pub fn with_reclaim_policy(mut self, policy: ReclaimPolicy) -> Self {
        self.reclaim_policy = Some(policy);
        self
    }

    pub fn with_volume_mode(mut self, mode: VolumeMode) -> Self {
        self.volume_mode = mode;
        self
    }

    pub fn with_mount(mut self, mount: VolumeMountDetails) -> Self {
        self.volume_mount = mount;
        self
    }

    pub fn with_device(mut self, device: VolumeDeviceDetails) -> Self {
        self.volume_device = device;
        self
    }

    pub fn with_mount_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mount_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data_source(mut self, snapshot_name: impl Into<String>) -> Self {
        self.data_source = Some(DataSource {
            name: snapshot_name.into(),
        });
        self
    }

    pub fn with_share_name(mut self, share_name: impl Into<String>) -> Self {
        self.share_name = Some(share_name.into());
        self
    }

    pub fn with_node_stage_secret_ref(mut self, secret: impl Into<String>) -> Self {
        self.node_stage_secret_ref = Some(secret.into());
        self
    }

    pub fn is_block(&self) -> bool {
        self.volume_mode == VolumeMode::Block
    }

    /// Volume name for position `index` (0-based) in the pod
    pub fn mount_name(&self, index: usize) -> String {
        format!("{}{}", self.volume_mount.name_generate, index + 1)
    }

    pub fn mount_path(&self, index: usize) -> String {
        format!("{}{}", self.volume_mount.mount_path_generate, index + 1)
    }

    pub fn device_name(&self, index: usize) -> String {
        format!("{}{}", self.volume_device.name_generate, index + 1)
    }
}

/// Workload exercising a set of volumes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodDetails {
    pub cmd: String,
    #[serde(default)]
    pub volumes: Vec<VolumeDetails>,
    #[serde(default)]
    pub is_windows: bool,
    /// Run through `cmd /c` instead of PowerShell on Windows
    #[serde(default)]
    pub use_cmd: bool,
}

impl PodDetails {
    pub fn new(cmd: impl Into<String>, volumes: Vec<VolumeDetails>) -> Self {
        Self {
            cmd: cmd.into(),
            volumes,
            is_windows: false,
            use_cmd: false,
        }
    }

    pub fn windows(mut self, use_cmd: bool) -> Self {
        self.is_windows = true;
        self.use_cmd = use_cmd;
        self
    }
}

/// Errors building a tier rotation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierError {
    #[error("storage account tier table cannot be empty")]
    Empty,
}

/// Fixed rotation of storage account SKUs handed out by volume index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct StorageAccountTiers(Vec<String>);

impl StorageAccountTiers {
    pub fn new<I, S>(tiers: I) -> Result<Self, TierError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tiers: Vec<String> = tiers.into_iter().map(Into::into).collect();
        if tiers.is_empty() {
            return Err(TierError::Empty);
        }
        Ok(Self(tiers))
    }

    /// Tier used by the volume at `index`
    pub fn tier_for(&self, index: usize) -> &str {
        &self.0[index % self.0.len()]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for StorageAccountTiers {
    fn default() -> Self {
        Self(
            [
                "Standard_LRS",
                "Premium_LRS",
                "Standard_ZRS",
                "Standard_GRS",
                "Standard_RAGRS",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }
}

impl TryFrom<Vec<String>> for StorageAccountTiers {
    type Error = TierError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StorageAccountTiers> for Vec<String> {
    fn from(tiers: StorageAccountTiers) -> Self {
        tiers.0
    }
}
