//! Azure File CSI test driver

use super::{
    Capability, DynamicPvTestDriver, PreProvisionedVolumeTestDriver, TestDriver,
    VolumeSnapshotTestDriver,
};
use crate::kubernetes::snapshot::VolumeSnapshotClass;
use azurefile_e2e_common::{ReclaimPolicy, VolumeBindingMode, VolumeMode};
use k8s_openapi::api::core::v1::{
    CSIPersistentVolumeSource, PersistentVolume, PersistentVolumeSpec, SecretReference,
    TopologySelectorLabelRequirement, TopologySelectorTerm,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const DEFAULT_DRIVER_NAME: &str = "file.csi.azure.com";

/// Topology key used for allowed topologies
pub const TOPOLOGY_KEY: &str = "topology.kubernetes.io/zone";

const PROVISIONED_BY_ANNOTATION: &str = "pv.kubernetes.io/provisioned-by";

/// Factories for the Azure File CSI driver
#[derive(Debug, Clone)]
pub struct AzureFileDriver {
    driver_name: String,
    capabilities: Vec<Capability>,
}

impl AzureFileDriver {
    /// Driver with every capability
    pub fn new(driver_name: impl Into<String>) -> Self {
        Self::with_capabilities(driver_name, Capability::all())
    }

    pub fn with_capabilities(driver_name: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            driver_name: driver_name.into(),
            capabilities,
        }
    }

    /// Storage class parameters used when a scenario supplies none
    pub fn default_parameters() -> BTreeMap<String, String> {
        BTreeMap::from([("skuName".to_string(), "Standard_LRS".to_string())])
    }

    fn normalized_provisioner(&self) -> String {
        self.driver_name.replace('/', "-")
    }
}

impl Default for AzureFileDriver {
    fn default() -> Self {
        Self::new(DEFAULT_DRIVER_NAME)
    }
}

impl TestDriver for AzureFileDriver {
    fn name(&self) -> &str {
        &self.driver_name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }
}

impl DynamicPvTestDriver for AzureFileDriver {
    fn dynamic_provision_storage_class(
        &self,
        parameters: &BTreeMap<String, String>,
        mount_options: &[String],
        reclaim_policy: Option<ReclaimPolicy>,
        binding_mode: Option<VolumeBindingMode>,
        allowed_topology_values: &[String],
        namespace: &str,
    ) -> StorageClass {
        let generate_name = format!(
            "{}-{}-dynamic-sc-",
            namespace,
            self.normalized_provisioner()
        );

        let allowed_topologies = if allowed_topology_values.is_empty() {
            None
        } else {
            Some(vec![TopologySelectorTerm {
                match_label_expressions: Some(vec![TopologySelectorLabelRequirement {
                    key: TOPOLOGY_KEY.to_string(),
                    values: allowed_topology_values.to_vec(),
                }]),
            }])
        };

        StorageClass {
            metadata: ObjectMeta {
                generate_name: Some(generate_name),
                ..Default::default()
            },
            provisioner: self.driver_name.clone(),
            parameters: if parameters.is_empty() {
                None
            } else {
                Some(parameters.clone())
            },
            mount_options: if mount_options.is_empty() {
                None
            } else {
                Some(mount_options.to_vec())
            },
            reclaim_policy: Some(
                reclaim_policy
                    .unwrap_or(ReclaimPolicy::Delete)
                    .as_str()
                    .to_string(),
            ),
            volume_binding_mode: Some(
                binding_mode
                    .unwrap_or(VolumeBindingMode::Immediate)
                    .as_str()
                    .to_string(),
            ),
            allowed_topologies,
            ..Default::default()
        }
    }
}

impl PreProvisionedVolumeTestDriver for AzureFileDriver {
    fn persistent_volume(
        &self,
        volume_id: &str,
        fs_type: &str,
        size: &str,
        reclaim_policy: Option<ReclaimPolicy>,
        namespace: &str,
        attributes: &BTreeMap<String, String>,
        node_stage_secret_ref: Option<&str>,
    ) -> PersistentVolume {
        let generate_name = format!(
            "{}-{}-preprovsioned-pv-",
            namespace,
            self.normalized_provisioner()
        );

        // Pre-provisioned shares outlive the test unless told otherwise
        let reclaim_policy = reclaim_policy.unwrap_or(ReclaimPolicy::Retain);

        let node_stage_secret_ref = node_stage_secret_ref
            .filter(|name| !name.is_empty())
            .map(|name| SecretReference {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
            });

        PersistentVolume {
            metadata: ObjectMeta {
                generate_name: Some(generate_name),
                annotations: Some(BTreeMap::from([(
                    PROVISIONED_BY_ANNOTATION.to_string(),
                    self.driver_name.clone(),
                )])),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                capacity: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                persistent_volume_reclaim_policy: Some(reclaim_policy.as_str().to_string()),
                volume_mode: Some(VolumeMode::FileSystem.as_str().to_string()),
                csi: Some(CSIPersistentVolumeSource {
                    driver: self.driver_name.clone(),
                    volume_handle: volume_id.to_string(),
                    fs_type: if fs_type.is_empty() {
                        None
                    } else {
                        Some(fs_type.to_string())
                    },
                    volume_attributes: if attributes.is_empty() {
                        None
                    } else {
                        Some(attributes.clone())
                    },
                    node_stage_secret_ref,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl VolumeSnapshotTestDriver for AzureFileDriver {
    fn volume_snapshot_class(&self, namespace: &str) -> VolumeSnapshotClass {
        let generate_name = format!(
            "{}-{}-dynamic-sc-",
            namespace,
            self.normalized_provisioner()
        );
        VolumeSnapshotClass::new(generate_name, self.driver_name.clone(), "Delete")
    }
}
