//! Test driver abstraction
//!
//! A driver is a set of factories producing the cluster objects a scenario
//! creates. Which factories a driver offers is fixed when it is constructed and
//! exposed as a capability set; the orchestrator checks the capability before
//! touching the cluster.

pub mod azurefile;

use crate::kubernetes::snapshot::VolumeSnapshotClass;
use azurefile_e2e_common::{ReclaimPolicy, VolumeBindingMode};
use k8s_openapi::api::core::v1::PersistentVolume;
use k8s_openapi::api::storage::v1::StorageClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use azurefile::AzureFileDriver;

/// Provisioning strategies a driver can serve
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    DynamicProvision,
    PreProvisioned,
    Snapshot,
}

impl Capability {
    pub fn all() -> Vec<Capability> {
        vec![
            Capability::DynamicProvision,
            Capability::PreProvisioned,
            Capability::Snapshot,
        ]
    }
}

/// Base trait of every test driver
pub trait TestDriver: Send + Sync {
    /// CSI driver name, e.g. `file.csi.azure.com`
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Driver able to dynamically provision volumes through a StorageClass
pub trait DynamicPvTestDriver: TestDriver {
    fn dynamic_provision_storage_class(
        &self,
        parameters: &BTreeMap<String, String>,
        mount_options: &[String],
        reclaim_policy: Option<ReclaimPolicy>,
        binding_mode: Option<VolumeBindingMode>,
        allowed_topology_values: &[String],
        namespace: &str,
    ) -> StorageClass;
}

/// Driver able to describe a PersistentVolume for an existing share
pub trait PreProvisionedVolumeTestDriver: TestDriver {
    #[allow(clippy::too_many_arguments)]
    fn persistent_volume(
        &self,
        volume_id: &str,
        fs_type: &str,
        size: &str,
        reclaim_policy: Option<ReclaimPolicy>,
        namespace: &str,
        attributes: &BTreeMap<String, String>,
        node_stage_secret_ref: Option<&str>,
    ) -> PersistentVolume;
}

/// Driver able to snapshot volumes
pub trait VolumeSnapshotTestDriver: TestDriver {
    fn volume_snapshot_class(&self, namespace: &str) -> VolumeSnapshotClass;
}
