//! Test pod running a single command against mounted volumes

use crate::config::WorkloadImages;
use azurefile_e2e_common::PodDetails;
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume, VolumeDevice, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const TESTER_GENERATE_NAME: &str = "azurefile-volume-tester-";
pub const TESTER_CONTAINER: &str = "volume-tester";
pub const TESTER_APP_LABEL: &str = "azurefile-volume-tester";

const OS_LABEL: &str = "kubernetes.io/os";

/// Container running `command` through the platform shell
pub(crate) fn tester_container(
    command: &str,
    is_windows: bool,
    use_cmd: bool,
    images: &WorkloadImages,
) -> Container {
    let (image, entrypoint, args) = if is_windows && use_cmd {
        (&images.windows, "cmd", vec!["/c".to_string(), command.to_string()])
    } else if is_windows {
        (
            &images.windows,
            "powershell.exe",
            vec!["-Command".to_string(), command.to_string()],
        )
    } else {
        (&images.linux, "/bin/sh", vec!["-c".to_string(), command.to_string()])
    };

    Container {
        name: TESTER_CONTAINER.to_string(),
        image: Some(image.clone()),
        command: Some(vec![entrypoint.to_string()]),
        args: Some(args),
        volume_mounts: Some(Vec::new()),
        volume_devices: Some(Vec::new()),
        ..Default::default()
    }
}

pub(crate) fn node_selector(is_windows: bool) -> BTreeMap<String, String> {
    let os = if is_windows { "windows" } else { "linux" };
    BTreeMap::from([(OS_LABEL.to_string(), os.to_string())])
}

pub(crate) fn claim_volume(name: &str, claim_name: &str, read_only: bool) -> Volume {
    Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim_name.to_string(),
            read_only: Some(read_only),
        }),
        ..Default::default()
    }
}

/// Pod manifest under construction
///
/// Volumes are attached one by one before the pod is submitted.
#[derive(Debug, Clone)]
pub struct TestPod {
    namespace: String,
    pod: Pod,
}

impl TestPod {
    pub fn new(namespace: &str, command: &str, is_windows: bool, images: &WorkloadImages) -> Self {
        Self::with_shell(namespace, command, is_windows, false, images)
    }

    /// Pod for `details`, without any volumes attached yet
    pub fn from_details(namespace: &str, details: &PodDetails, images: &WorkloadImages) -> Self {
        Self::with_shell(
            namespace,
            &details.cmd,
            details.is_windows,
            details.use_cmd,
            images,
        )
    }

    fn with_shell(
        namespace: &str,
        command: &str,
        is_windows: bool,
        use_cmd: bool,
        images: &WorkloadImages,
    ) -> Self {
        let pod = Pod {
            metadata: ObjectMeta {
                generate_name: Some(TESTER_GENERATE_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_selector: Some(node_selector(is_windows)),
                containers: vec![tester_container(command, is_windows, use_cmd, images)],
                restart_policy: Some("Never".to_string()),
                volumes: Some(Vec::new()),
                ..Default::default()
            }),
            ..Default::default()
        };

        Self {
            namespace: namespace.to_string(),
            pod,
        }
    }

    /// Mount the claim's filesystem at `mount_path`
    pub fn setup_volume(&mut self, claim_name: &str, name: &str, mount_path: &str, read_only: bool) {
        self.push_mount(VolumeMount {
            name: name.to_string(),
            mount_path: mount_path.to_string(),
            read_only: Some(read_only),
            ..Default::default()
        });
        self.push_volume(claim_volume(name, claim_name, read_only));
    }

    /// Expose the claim as a raw block device at `device_path`
    pub fn setup_raw_block_volume(&mut self, claim_name: &str, name: &str, device_path: &str) {
        if let Some(container) = self.container_mut() {
            container
                .volume_devices
                .get_or_insert_with(Vec::new)
                .push(VolumeDevice {
                    name: name.to_string(),
                    device_path: device_path.to_string(),
                });
        }
        self.push_volume(claim_volume(name, claim_name, false));
    }

    /// Mount `sub_path` of the claim's filesystem at `mount_path`
    pub fn setup_volume_mount_with_subpath(
        &mut self,
        claim_name: &str,
        name: &str,
        mount_path: &str,
        sub_path: &str,
        read_only: bool,
    ) {
        self.push_mount(VolumeMount {
            name: name.to_string(),
            mount_path: mount_path.to_string(),
            sub_path: Some(sub_path.to_string()),
            read_only: Some(read_only),
            ..Default::default()
        });
        self.push_volume(claim_volume(name, claim_name, read_only));
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pod(&self) -> &Pod {
        &self.pod
    }

    pub fn volume_mounts(&self) -> &[VolumeMount] {
        self.container()
            .and_then(|c| c.volume_mounts.as_deref())
            .unwrap_or_default()
    }

    pub fn volume_devices(&self) -> &[VolumeDevice] {
        self.container()
            .and_then(|c| c.volume_devices.as_deref())
            .unwrap_or_default()
    }

    pub fn volumes(&self) -> &[Volume] {
        self.pod
            .spec
            .as_ref()
            .and_then(|s| s.volumes.as_deref())
            .unwrap_or_default()
    }

    fn container(&self) -> Option<&Container> {
        self.pod.spec.as_ref().and_then(|s| s.containers.first())
    }

    fn container_mut(&mut self) -> Option<&mut Container> {
        self.pod.spec.as_mut().and_then(|s| s.containers.first_mut())
    }

    fn push_mount(&mut self, mount: VolumeMount) {
        if let Some(container) = self.container_mut() {
            container.volume_mounts.get_or_insert_with(Vec::new).push(mount);
        }
    }

    fn push_volume(&mut self, volume: Volume) {
        if let Some(spec) = self.pod.spec.as_mut() {
            spec.volumes.get_or_insert_with(Vec::new).push(volume);
        }
    }
}
