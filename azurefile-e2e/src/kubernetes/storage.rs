//! StorageClass, PersistentVolumeClaim and PersistentVolume operations

use crate::error::E2eResult;
use crate::kubernetes::client::K8sClient;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, PostParams};

// ============================================================================
// StorageClass Operations
// ============================================================================

/// Create a StorageClass
pub async fn create_storage_class(client: &K8sClient, sc: &StorageClass) -> E2eResult<StorageClass> {
    let scs: Api<StorageClass> = Api::all(client.inner().clone());
    Ok(scs.create(&PostParams::default(), sc).await?)
}

/// Get a specific StorageClass
pub async fn get_storage_class(client: &K8sClient, name: &str) -> E2eResult<StorageClass> {
    let scs: Api<StorageClass> = Api::all(client.inner().clone());
    Ok(scs.get(name).await?)
}

/// Delete a StorageClass
pub async fn delete_storage_class(client: &K8sClient, name: &str) -> E2eResult<()> {
    let scs: Api<StorageClass> = Api::all(client.inner().clone());
    scs.delete(name, &DeleteParams::default()).await?;

    Ok(())
}

// ============================================================================
// PersistentVolumeClaim Operations
// ============================================================================

/// Create a PVC
pub async fn create_pvc(
    client: &K8sClient,
    namespace: &str,
    pvc: &PersistentVolumeClaim,
) -> E2eResult<PersistentVolumeClaim> {
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.inner().clone(), namespace);
    Ok(pvcs.create(&PostParams::default(), pvc).await?)
}

/// Get a specific PVC
pub async fn get_pvc(
    client: &K8sClient,
    namespace: &str,
    name: &str,
) -> E2eResult<PersistentVolumeClaim> {
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.inner().clone(), namespace);
    Ok(pvcs.get(name).await?)
}

/// Delete a PVC
pub async fn delete_pvc(client: &K8sClient, namespace: &str, name: &str) -> E2eResult<()> {
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.inner().clone(), namespace);
    pvcs.delete(name, &DeleteParams::default()).await?;

    Ok(())
}

// ============================================================================
// PersistentVolume Operations
// ============================================================================

/// Create a PV
pub async fn create_pv(client: &K8sClient, pv: &PersistentVolume) -> E2eResult<PersistentVolume> {
    let pvs: Api<PersistentVolume> = Api::all(client.inner().clone());
    Ok(pvs.create(&PostParams::default(), pv).await?)
}

/// Get a specific PV
pub async fn get_pv(client: &K8sClient, name: &str) -> E2eResult<PersistentVolume> {
    let pvs: Api<PersistentVolume> = Api::all(client.inner().clone());
    Ok(pvs.get(name).await?)
}

/// Delete a PV
pub async fn delete_pv(client: &K8sClient, name: &str) -> E2eResult<()> {
    let pvs: Api<PersistentVolume> = Api::all(client.inner().clone());
    pvs.delete(name, &DeleteParams::default()).await?;

    Ok(())
}
