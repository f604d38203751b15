//! Resource orchestration
//!
//! Turns a `PodDetails` into live cluster objects in dependency order. Each
//! object that gets created is registered in the caller's `Teardown` before the
//! next step runs, so a failure part way through leaves exactly the created
//! objects behind for release.

use crate::config::WorkloadImages;
use crate::driver::{
    Capability, DynamicPvTestDriver, PreProvisionedVolumeTestDriver, TestDriver,
    VolumeSnapshotTestDriver,
};
use crate::error::{E2eError, E2eResult};
use crate::kubernetes::snapshot::VolumeSnapshotClass;
use crate::kubernetes::{created_name, ClusterApi};
use crate::resources::claim::{
    build_claim, build_pre_provisioned_claim, statefulset_claim_template, STATEFULSET_CLAIM_NAME,
};
use crate::resources::workload::{build_deployment, build_statefulset};
use crate::resources::{ClaimMount, TestDeployment, TestPod, TestStatefulSet, WorkloadCommand};
use crate::teardown::{ResourceHandle, Teardown};
use crate::verifier::{PollConfig, ResultVerifier};
use azurefile_e2e_common::{PodDetails, StorageAccountTiers, VolumeDetails, SUBPATH_DIR};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::api::storage::v1::StorageClass;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Storage class parameter selecting the storage account tier
pub const SKU_NAME_PARAMETER: &str = "skuName";

const SHARE_NAME_ATTRIBUTE: &str = "shareName";

/// Where a dynamically provisioned claim gets its storage class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageClassSource {
    /// Create a class from the driver with these parameters
    Create(BTreeMap<String, String>),
    /// Use a class that already exists; nothing is created or deleted
    Existing(String),
}

impl StorageClassSource {
    pub fn parameters(parameters: BTreeMap<String, String>) -> Self {
        StorageClassSource::Create(parameters)
    }

    pub fn existing(name: impl Into<String>) -> Self {
        StorageClassSource::Existing(name.into())
    }
}

/// How a claim is mounted into the test pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MountStyle {
    Root,
    SubPath,
}

/// A claim created for one volume
#[derive(Debug, Clone)]
pub struct ProvisionedClaim {
    pub claim_name: String,
    /// Class the claim was provisioned from, None for pre-provisioned volumes
    pub storage_class: Option<StorageClass>,
    /// Name of the bound volume, known only once binding was awaited
    pub volume_name: Option<String>,
}

impl ProvisionedClaim {
    pub fn is_bound(&self) -> bool {
        self.volume_name.is_some()
    }
}

/// Builds scenario resources in one namespace
pub struct ResourceOrchestrator<'a> {
    cluster: &'a dyn ClusterApi,
    namespace: String,
    tiers: StorageAccountTiers,
    images: WorkloadImages,
    verifier: ResultVerifier<'a>,
}

impl<'a> ResourceOrchestrator<'a> {
    pub fn new(
        cluster: &'a dyn ClusterApi,
        namespace: impl Into<String>,
        tiers: StorageAccountTiers,
        images: WorkloadImages,
        poll: PollConfig,
    ) -> Self {
        Self {
            cluster,
            namespace: namespace.into(),
            tiers,
            images,
            verifier: ResultVerifier::new(cluster, poll),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn verifier(&self) -> &ResultVerifier<'a> {
        &self.verifier
    }

    pub fn tiers(&self) -> &StorageAccountTiers {
        &self.tiers
    }

    /// One storage class and claim per volume, all mounted into one pod
    pub async fn setup_dynamic(
        &self,
        pod: &PodDetails,
        driver: &dyn DynamicPvTestDriver,
        storage_class: &StorageClassSource,
        teardown: &mut Teardown,
    ) -> E2eResult<TestPod> {
        self.setup_dynamic_volumes(pod, driver, MountStyle::Root, teardown, |_| storage_class.clone())
            .await
    }

    /// Like `setup_dynamic`, but the pod mounts the `test` subdirectory
    pub async fn setup_dynamic_with_subpath(
        &self,
        pod: &PodDetails,
        driver: &dyn DynamicPvTestDriver,
        storage_class: &StorageClassSource,
        teardown: &mut Teardown,
    ) -> E2eResult<TestPod> {
        self.setup_dynamic_volumes(pod, driver, MountStyle::SubPath, teardown, |_| {
            storage_class.clone()
        })
        .await
    }

    /// Volume `i` gets its own class on tier `i mod K`
    pub async fn setup_dynamic_multiple_tiers(
        &self,
        pod: &PodDetails,
        driver: &dyn DynamicPvTestDriver,
        teardown: &mut Teardown,
    ) -> E2eResult<TestPod> {
        let tiers = &self.tiers;
        self.setup_dynamic_volumes(pod, driver, MountStyle::Root, teardown, |index| {
            StorageClassSource::Create(BTreeMap::from([(
                SKU_NAME_PARAMETER.to_string(),
                tiers.tier_for(index).to_string(),
            )]))
        })
        .await
    }

    async fn setup_dynamic_volumes<F>(
        &self,
        pod: &PodDetails,
        driver: &dyn DynamicPvTestDriver,
        style: MountStyle,
        teardown: &mut Teardown,
        class_for: F,
    ) -> E2eResult<TestPod>
    where
        F: Fn(usize) -> StorageClassSource,
    {
        require(driver, Capability::DynamicProvision)?;

        let mut test_pod = TestPod::from_details(&self.namespace, pod, &self.images);
        for (index, volume) in pod.volumes.iter().enumerate() {
            let source = class_for(index);
            let claim = self
                .setup_dynamic_claim(volume, driver, &source, teardown)
                .await?;
            attach(&mut test_pod, volume, index, &claim.claim_name, style);
        }

        Ok(test_pod)
    }

    /// Pre-provisioned volume and a claim bound to it, per volume
    pub async fn setup_pre_provisioned(
        &self,
        pod: &PodDetails,
        driver: &dyn PreProvisionedVolumeTestDriver,
        teardown: &mut Teardown,
    ) -> E2eResult<TestPod> {
        self.setup_pre_provisioned_volumes(pod, driver, MountStyle::Root, teardown)
            .await
    }

    pub async fn setup_pre_provisioned_with_subpath(
        &self,
        pod: &PodDetails,
        driver: &dyn PreProvisionedVolumeTestDriver,
        teardown: &mut Teardown,
    ) -> E2eResult<TestPod> {
        self.setup_pre_provisioned_volumes(pod, driver, MountStyle::SubPath, teardown)
            .await
    }

    async fn setup_pre_provisioned_volumes(
        &self,
        pod: &PodDetails,
        driver: &dyn PreProvisionedVolumeTestDriver,
        style: MountStyle,
        teardown: &mut Teardown,
    ) -> E2eResult<TestPod> {
        require(driver, Capability::PreProvisioned)?;

        let mut test_pod = TestPod::from_details(&self.namespace, pod, &self.images);
        for (index, volume) in pod.volumes.iter().enumerate() {
            let claim = self
                .setup_pre_provisioned_claim(volume, driver, teardown)
                .await?;
            attach(&mut test_pod, volume, index, &claim.claim_name, style);
        }

        Ok(test_pod)
    }

    /// One-replica deployment mounting the pod's first volume
    pub async fn setup_deployment(
        &self,
        pod: &PodDetails,
        driver: &dyn DynamicPvTestDriver,
        storage_class: &StorageClassSource,
        teardown: &mut Teardown,
    ) -> E2eResult<TestDeployment> {
        require(driver, Capability::DynamicProvision)?;
        let volume = first_volume(pod)?;

        let claim = self
            .setup_dynamic_claim(volume, driver, storage_class, teardown)
            .await?;

        info!("setting up the Deployment");
        let mount = ClaimMount {
            claim_name: claim.claim_name,
            volume_name: volume.mount_name(0),
            mount_path: volume.mount_path(0),
            read_only: volume.volume_mount.read_only,
        };
        let manifest = build_deployment(&self.namespace, &self.workload_command(pod), &mount);
        let created = self.cluster.create_deployment(&self.namespace, &manifest).await?;
        let deployment = TestDeployment::new(&self.namespace, created)?;
        teardown.register(ResourceHandle::Deployment {
            namespace: self.namespace.clone(),
            name: deployment.name().to_string(),
        });

        Ok(deployment)
    }

    /// One-replica statefulset provisioning its claim from a template
    pub async fn setup_statefulset(
        &self,
        pod: &PodDetails,
        driver: &dyn DynamicPvTestDriver,
        storage_class: &StorageClassSource,
        teardown: &mut Teardown,
    ) -> E2eResult<TestStatefulSet> {
        require(driver, Capability::DynamicProvision)?;
        let volume = first_volume(pod)?;

        let class = self
            .resolve_storage_class(volume, driver, storage_class, teardown)
            .await?;
        let class_name = created_name("StorageClass", &class.metadata)?;

        info!("setting up the StatefulSet");
        let template = statefulset_claim_template(
            &self.namespace,
            &class_name,
            &volume.claim_size,
            volume.volume_mode,
            volume.data_source.as_ref(),
        );
        let manifest = build_statefulset(
            &self.namespace,
            &self.workload_command(pod),
            template,
            &volume.mount_path(0),
            volume.volume_mount.read_only,
        );
        let created = self.cluster.create_statefulset(&self.namespace, &manifest).await?;
        let statefulset = TestStatefulSet::new(&self.namespace, created)?;
        teardown.register(ResourceHandle::StatefulSet {
            namespace: self.namespace.clone(),
            name: statefulset.name().to_string(),
            claim_template: STATEFULSET_CLAIM_NAME.to_string(),
            replicas: statefulset.replicas(),
        });

        Ok(statefulset)
    }

    pub async fn create_snapshot_class(
        &self,
        driver: &dyn VolumeSnapshotTestDriver,
        teardown: &mut Teardown,
    ) -> E2eResult<VolumeSnapshotClass> {
        require(driver, Capability::Snapshot)?;

        info!("setting up the VolumeSnapshotClass");
        let class = driver.volume_snapshot_class(&self.namespace);
        let created = self.cluster.create_snapshot_class(&class).await?;
        let name = created_name("VolumeSnapshotClass", &created.metadata)?;
        teardown.register(ResourceHandle::SnapshotClass { name });

        Ok(created)
    }

    /// Storage class and claim for one volume
    ///
    /// Binding is awaited and the volume validated only when the class binds
    /// immediately; otherwise the claim stays pending until a consumer exists.
    pub async fn setup_dynamic_claim(
        &self,
        volume: &VolumeDetails,
        driver: &dyn DynamicPvTestDriver,
        storage_class: &StorageClassSource,
        teardown: &mut Teardown,
    ) -> E2eResult<ProvisionedClaim> {
        require(driver, Capability::DynamicProvision)?;

        let class = self
            .resolve_storage_class(volume, driver, storage_class, teardown)
            .await?;
        let class_name = created_name("StorageClass", &class.metadata)?;

        info!("setting up the PVC");
        let requested = build_claim(
            &self.namespace,
            &volume.claim_size,
            volume.volume_mode,
            Some(&class_name),
            volume.data_source.as_ref(),
        );
        let claim_name = self.create_claim(&requested, teardown).await?;

        let mut provisioned = ProvisionedClaim {
            claim_name,
            storage_class: Some(class),
            volume_name: None,
        };
        if binds_immediately(provisioned.storage_class.as_ref()) {
            let volume_name = self
                .await_and_validate(&requested, &provisioned.claim_name, provisioned.storage_class.as_ref())
                .await?;
            provisioned.volume_name = Some(volume_name);
        } else {
            debug!(
                "claim {} waits for its first consumer, not waiting for binding",
                provisioned.claim_name
            );
        }

        Ok(provisioned)
    }

    /// PersistentVolume from the volume id, then a class-less claim bound to it
    pub async fn setup_pre_provisioned_claim(
        &self,
        volume: &VolumeDetails,
        driver: &dyn PreProvisionedVolumeTestDriver,
        teardown: &mut Teardown,
    ) -> E2eResult<ProvisionedClaim> {
        require(driver, Capability::PreProvisioned)?;
        let volume_id = volume
            .volume_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                E2eError::Provisioning("pre-provisioned volume has no volume id".to_string())
            })?;

        let mut attributes = BTreeMap::new();
        if let Some(share) = volume.share_name.as_deref().filter(|s| !s.is_empty()) {
            attributes.insert(SHARE_NAME_ATTRIBUTE.to_string(), share.to_string());
        }

        info!("setting up the PV");
        let mut pv = driver.persistent_volume(
            volume_id,
            &volume.fs_type,
            &volume.claim_size,
            volume.reclaim_policy,
            &self.namespace,
            &attributes,
            volume.node_stage_secret_ref.as_deref(),
        );
        if let Some(spec) = pv.spec.as_mut() {
            spec.volume_mode = Some(volume.volume_mode.as_str().to_string());
            if !volume.mount_options.is_empty() {
                spec.mount_options = Some(volume.mount_options.clone());
            }
        }
        let created = self.cluster.create_volume(&pv).await?;
        let pv_name = created_name("PersistentVolume", &created.metadata)?;
        teardown.register(ResourceHandle::PersistentVolume {
            name: pv_name.clone(),
        });

        info!("setting up the PVC");
        let requested = build_pre_provisioned_claim(
            &self.namespace,
            &volume.claim_size,
            volume.volume_mode,
            &pv_name,
        );
        let claim_name = self.create_claim(&requested, teardown).await?;
        let volume_name = self.await_and_validate(&requested, &claim_name, None).await?;

        Ok(ProvisionedClaim {
            claim_name,
            storage_class: None,
            volume_name: Some(volume_name),
        })
    }

    async fn resolve_storage_class(
        &self,
        volume: &VolumeDetails,
        driver: &dyn DynamicPvTestDriver,
        source: &StorageClassSource,
        teardown: &mut Teardown,
    ) -> E2eResult<StorageClass> {
        match source {
            StorageClassSource::Create(parameters) => {
                info!("setting up the StorageClass");
                let class = driver.dynamic_provision_storage_class(
                    parameters,
                    &volume.mount_options,
                    volume.reclaim_policy,
                    volume.volume_binding_mode,
                    &volume.allowed_topology_values,
                    &self.namespace,
                );
                let created = self.cluster.create_storage_class(&class).await?;
                let name = created_name("StorageClass", &created.metadata)?;
                teardown.register(ResourceHandle::StorageClass { name });
                Ok(created)
            }
            StorageClassSource::Existing(name) => {
                info!("using existing StorageClass {}", name);
                self.cluster.get_storage_class(name).await
            }
        }
    }

    async fn create_claim(
        &self,
        claim: &PersistentVolumeClaim,
        teardown: &mut Teardown,
    ) -> E2eResult<String> {
        let created = self.cluster.create_claim(&self.namespace, claim).await?;
        let name = created_name("PersistentVolumeClaim", &created.metadata)?;
        teardown.register(ResourceHandle::Claim {
            namespace: self.namespace.clone(),
            name: name.clone(),
        });
        Ok(name)
    }

    /// Wait for binding and validate the bound volume; returns its name
    async fn await_and_validate(
        &self,
        requested: &PersistentVolumeClaim,
        claim_name: &str,
        storage_class: Option<&StorageClass>,
    ) -> E2eResult<String> {
        let bound = self
            .verifier
            .wait_for_claim_bound(&self.namespace, claim_name)
            .await?;
        let volume = self.verifier.bound_volume(&bound).await?;

        info!("validating provisioned PV");
        self.verifier
            .validate_provisioned_volume(requested, &bound, &volume, storage_class)?;
        created_name("PersistentVolume", &volume.metadata)
    }

    fn workload_command<'p>(&'p self, pod: &'p PodDetails) -> WorkloadCommand<'p> {
        WorkloadCommand {
            command: &pod.cmd,
            is_windows: pod.is_windows,
            use_cmd: pod.use_cmd,
            images: &self.images,
        }
    }
}

fn require<D: TestDriver + ?Sized>(driver: &D, capability: Capability) -> E2eResult<()> {
    if driver.supports(capability) {
        return Ok(());
    }
    Err(E2eError::UnsupportedCapability {
        driver: driver.name().to_string(),
        capability,
    })
}

fn first_volume(pod: &PodDetails) -> E2eResult<&VolumeDetails> {
    pod.volumes
        .first()
        .ok_or_else(|| E2eError::Provisioning("workload needs at least one volume".to_string()))
}

/// Classes without a binding mode bind immediately
fn binds_immediately(class: Option<&StorageClass>) -> bool {
    class
        .and_then(|c| c.volume_binding_mode.as_deref())
        .map_or(true, |mode| mode != "WaitForFirstConsumer")
}

fn attach(pod: &mut TestPod, volume: &VolumeDetails, index: usize, claim_name: &str, style: MountStyle) {
    let name = volume.mount_name(index);
    let mount_path = volume.mount_path(index);
    let read_only = volume.volume_mount.read_only;

    match style {
        MountStyle::SubPath => {
            pod.setup_volume_mount_with_subpath(claim_name, &name, &mount_path, SUBPATH_DIR, read_only)
        }
        MountStyle::Root if volume.is_block() => pod.setup_raw_block_volume(
            claim_name,
            &volume.device_name(index),
            &volume.volume_device.device_path,
        ),
        MountStyle::Root => pod.setup_volume(claim_name, &name, &mount_path, read_only),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::AzureFileDriver;
    use azurefile_e2e_common::{VolumeBindingMode, VolumeMode};

    #[test]
    fn test_binds_immediately() {
        assert!(binds_immediately(None));
        assert!(binds_immediately(Some(&StorageClass::default())));

        let class = StorageClass {
            volume_binding_mode: Some(VolumeBindingMode::WaitForFirstConsumer.as_str().to_string()),
            ..Default::default()
        };
        assert!(!binds_immediately(Some(&class)));
    }

    #[test]
    fn test_require_capability() {
        let driver = AzureFileDriver::with_capabilities("file.csi.azure.com", vec![Capability::Snapshot]);
        assert!(require(&driver, Capability::Snapshot).is_ok());

        let err = require(&driver, Capability::PreProvisioned).unwrap_err();
        assert!(matches!(
            err,
            E2eError::UnsupportedCapability {
                capability: Capability::PreProvisioned,
                ..
            }
        ));
    }

    #[test]
    fn test_attach_styles() {
        let images = WorkloadImages::default();
        let mut pod = TestPod::new("e2e", "true", false, &images);
        let filesystem = VolumeDetails::new("10Gi");
        let block = VolumeDetails::new("10Gi").with_volume_mode(VolumeMode::Block);

        attach(&mut pod, &filesystem, 0, "pvc-a", MountStyle::Root);
        attach(&mut pod, &block, 1, "pvc-b", MountStyle::Root);
        attach(&mut pod, &block, 2, "pvc-c", MountStyle::SubPath);

        assert_eq!(pod.volume_mounts()[0].mount_path, "/mnt/test-1");
        assert_eq!(pod.volume_devices()[0].name, "test-block-2");
        assert_eq!(pod.volume_devices()[0].device_path, "/dev/e2e-test");
        assert_eq!(pod.volume_mounts()[1].mount_path, "/mnt/test-3");
        assert_eq!(pod.volume_mounts()[1].sub_path.as_deref(), Some("test"));
    }

    #[test]
    fn test_first_volume_required() {
        let pod = PodDetails::new("true", Vec::new());
        assert!(matches!(first_volume(&pod), Err(E2eError::Provisioning(_))));
    }
}
