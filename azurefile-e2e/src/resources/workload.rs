//! Deployment and StatefulSet test workloads

use super::claim::STATEFULSET_CLAIM_NAME;
use super::pod::{claim_volume, node_selector, tester_container, TESTER_APP_LABEL, TESTER_GENERATE_NAME};
use crate::config::WorkloadImages;
use crate::error::E2eResult;
use crate::kubernetes::created_name;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaim, PodSpec, PodTemplateSpec, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

/// Where a workload mounts its claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMount {
    pub claim_name: String,
    pub volume_name: String,
    pub mount_path: String,
    pub read_only: bool,
}

/// Shell command and platform of a workload's single container
#[derive(Debug, Clone)]
pub struct WorkloadCommand<'a> {
    pub command: &'a str,
    pub is_windows: bool,
    pub use_cmd: bool,
    pub images: &'a WorkloadImages,
}

impl WorkloadCommand<'_> {
    fn container(&self, mount: VolumeMount) -> Container {
        let mut container =
            tester_container(self.command, self.is_windows, self.use_cmd, self.images);
        container.volume_mounts = Some(vec![mount]);
        container
    }
}

fn app_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), TESTER_APP_LABEL.to_string())])
}

fn workload_meta(namespace: &str) -> ObjectMeta {
    ObjectMeta {
        generate_name: Some(TESTER_GENERATE_NAME.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// One-replica deployment mounting `mount`
pub fn build_deployment(namespace: &str, command: &WorkloadCommand<'_>, mount: &ClaimMount) -> Deployment {
    let container = command.container(VolumeMount {
        name: mount.volume_name.clone(),
        mount_path: mount.mount_path.clone(),
        read_only: Some(mount.read_only),
        ..Default::default()
    });

    Deployment {
        metadata: workload_meta(namespace),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(app_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    node_selector: Some(node_selector(command.is_windows)),
                    containers: vec![container],
                    restart_policy: Some("Always".to_string()),
                    volumes: Some(vec![claim_volume(
                        &mount.volume_name,
                        &mount.claim_name,
                        mount.read_only,
                    )]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// One-replica statefulset whose pod mounts its per-replica claim at `mount_path`
pub fn build_statefulset(
    namespace: &str,
    command: &WorkloadCommand<'_>,
    claim_template: PersistentVolumeClaim,
    mount_path: &str,
    read_only: bool,
) -> StatefulSet {
    let container = command.container(VolumeMount {
        name: STATEFULSET_CLAIM_NAME.to_string(),
        mount_path: mount_path.to_string(),
        read_only: Some(read_only),
        ..Default::default()
    });

    StatefulSet {
        metadata: workload_meta(namespace),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(app_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    node_selector: Some(node_selector(command.is_windows)),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![claim_template]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Deployment created by the orchestrator
#[derive(Debug, Clone)]
pub struct TestDeployment {
    namespace: String,
    name: String,
    deployment: Deployment,
}

impl TestDeployment {
    /// Wrap the object returned by the API server
    pub fn new(namespace: &str, deployment: Deployment) -> E2eResult<Self> {
        let name = created_name("Deployment", &deployment.metadata)?;
        Ok(Self {
            namespace: namespace.to_string(),
            name,
            deployment,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }
}

/// StatefulSet created by the orchestrator
#[derive(Debug, Clone)]
pub struct TestStatefulSet {
    namespace: String,
    name: String,
    statefulset: StatefulSet,
}

impl TestStatefulSet {
    pub fn new(namespace: &str, statefulset: StatefulSet) -> E2eResult<Self> {
        let name = created_name("StatefulSet", &statefulset.metadata)?;
        Ok(Self {
            namespace: namespace.to_string(),
            name,
            statefulset,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn statefulset(&self) -> &StatefulSet {
        &self.statefulset
    }

    pub fn replicas(&self) -> i32 {
        self.statefulset
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1)
    }

    /// Claims the controller creates from the template, `pvc-<set>-<ordinal>`
    pub fn replica_claim_names(&self) -> Vec<String> {
        replica_claim_names(STATEFULSET_CLAIM_NAME, &self.name, self.replicas())
    }
}

pub(crate) fn replica_claim_names(template: &str, statefulset: &str, replicas: i32) -> Vec<String> {
    (0..replicas.max(0))
        .map(|ordinal| format!("{}-{}-{}", template, statefulset, ordinal))
        .collect()
}
