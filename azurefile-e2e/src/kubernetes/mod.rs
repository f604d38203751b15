//! Kubernetes integration for the e2e harness
//!
//! `ClusterApi` is the seam between orchestration and the cluster: the
//! orchestrator, verifier and teardown only ever talk to it. `K8sClient`
//! implements it over kube-rs.

pub mod client;
pub mod snapshot;
pub mod storage;
pub mod workloads;

use crate::error::{E2eError, E2eResult};
use async_trait::async_trait;
use client::K8sClient;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, PersistentVolume, PersistentVolumeClaim, Pod};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use snapshot::VolumeSnapshotClass;

/// Cluster object API consumed by the harness
///
/// Create calls return the object as stored by the server, so generated names
/// are read from the returned metadata.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create_namespace(&self, generate_name: &str) -> E2eResult<Namespace>;
    async fn delete_namespace(&self, name: &str) -> E2eResult<()>;

    async fn create_storage_class(&self, sc: &StorageClass) -> E2eResult<StorageClass>;
    async fn get_storage_class(&self, name: &str) -> E2eResult<StorageClass>;
    async fn delete_storage_class(&self, name: &str) -> E2eResult<()>;

    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> E2eResult<PersistentVolumeClaim>;
    async fn get_claim(&self, namespace: &str, name: &str) -> E2eResult<PersistentVolumeClaim>;
    async fn delete_claim(&self, namespace: &str, name: &str) -> E2eResult<()>;

    async fn create_volume(&self, pv: &PersistentVolume) -> E2eResult<PersistentVolume>;
    async fn get_volume(&self, name: &str) -> E2eResult<PersistentVolume>;
    async fn delete_volume(&self, name: &str) -> E2eResult<()>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> E2eResult<Pod>;
    async fn get_pod(&self, namespace: &str, name: &str) -> E2eResult<Pod>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> E2eResult<()>;
    async fn pod_logs(&self, namespace: &str, name: &str) -> E2eResult<String>;

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment)
        -> E2eResult<Deployment>;
    async fn get_deployment(&self, namespace: &str, name: &str) -> E2eResult<Deployment>;
    async fn delete_deployment(&self, namespace: &str, name: &str) -> E2eResult<()>;

    async fn create_statefulset(
        &self,
        namespace: &str,
        statefulset: &StatefulSet,
    ) -> E2eResult<StatefulSet>;
    async fn get_statefulset(&self, namespace: &str, name: &str) -> E2eResult<StatefulSet>;
    async fn delete_statefulset(&self, namespace: &str, name: &str) -> E2eResult<()>;

    async fn create_snapshot_class(
        &self,
        class: &VolumeSnapshotClass,
    ) -> E2eResult<VolumeSnapshotClass>;
    async fn delete_snapshot_class(&self, name: &str) -> E2eResult<()>;
}

#[async_trait]
impl ClusterApi for K8sClient {
    async fn create_namespace(&self, generate_name: &str) -> E2eResult<Namespace> {
        workloads::create_namespace(self, generate_name).await
    }

    async fn delete_namespace(&self, name: &str) -> E2eResult<()> {
        workloads::delete_namespace(self, name).await
    }

    async fn create_storage_class(&self, sc: &StorageClass) -> E2eResult<StorageClass> {
        storage::create_storage_class(self, sc).await
    }

    async fn get_storage_class(&self, name: &str) -> E2eResult<StorageClass> {
        storage::get_storage_class(self, name).await
    }

    async fn delete_storage_class(&self, name: &str) -> E2eResult<()> {
        storage::delete_storage_class(self, name).await
    }

    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> E2eResult<PersistentVolumeClaim> {
        storage::create_pvc(self, namespace, claim).await
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> E2eResult<PersistentVolumeClaim> {
        storage::get_pvc(self, namespace, name).await
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> E2eResult<()> {
        storage::delete_pvc(self, namespace, name).await
    }

    async fn create_volume(&self, pv: &PersistentVolume) -> E2eResult<PersistentVolume> {
        storage::create_pv(self, pv).await
    }

    async fn get_volume(&self, name: &str) -> E2eResult<PersistentVolume> {
        storage::get_pv(self, name).await
    }

    async fn delete_volume(&self, name: &str) -> E2eResult<()> {
        storage::delete_pv(self, name).await
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> E2eResult<Pod> {
        workloads::create_pod(self, namespace, pod).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> E2eResult<Pod> {
        workloads::get_pod(self, namespace, name).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> E2eResult<()> {
        workloads::delete_pod(self, namespace, name).await
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> E2eResult<String> {
        workloads::get_pod_logs(self, namespace, name).await
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> E2eResult<Deployment> {
        workloads::create_deployment(self, namespace, deployment).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> E2eResult<Deployment> {
        workloads::get_deployment(self, namespace, name).await
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> E2eResult<()> {
        workloads::delete_deployment(self, namespace, name).await
    }

    async fn create_statefulset(
        &self,
        namespace: &str,
        statefulset: &StatefulSet,
    ) -> E2eResult<StatefulSet> {
        workloads::create_statefulset(self, namespace, statefulset).await
    }

    async fn get_statefulset(&self, namespace: &str, name: &str) -> E2eResult<StatefulSet> {
        workloads::get_statefulset(self, namespace, name).await
    }

    async fn delete_statefulset(&self, namespace: &str, name: &str) -> E2eResult<()> {
        workloads::delete_statefulset(self, namespace, name).await
    }

    async fn create_snapshot_class(
        &self,
        class: &VolumeSnapshotClass,
    ) -> E2eResult<VolumeSnapshotClass> {
        snapshot::create_snapshot_class(self, class).await
    }

    async fn delete_snapshot_class(&self, name: &str) -> E2eResult<()> {
        snapshot::delete_snapshot_class(self, name).await
    }
}

/// Name the server assigned to a created object
pub(crate) fn created_name(kind: &str, meta: &ObjectMeta) -> E2eResult<String> {
    meta.name
        .clone()
        .ok_or_else(|| E2eError::Provisioning(format!("created {} has no name", kind)))
}
