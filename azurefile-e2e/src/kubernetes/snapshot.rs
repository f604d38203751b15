//! VolumeSnapshotClass resource and operations
//!
//! The snapshot CRDs are not part of k8s-openapi, so the class is described
//! here and wired into kube through a hand-written `Resource` impl.

use crate::error::E2eResult;
use crate::kubernetes::client::K8sClient;
use azurefile_e2e_common::{SNAPSHOT_API_GROUP, SNAPSHOT_API_VERSION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ClusterResourceScope;
use kube::Resource;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

pub const VOLUME_SNAPSHOT_CLASS_KIND: &str = "VolumeSnapshotClass";

/// `snapshot.storage.k8s.io/v1beta1` VolumeSnapshotClass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotClass {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub driver: String,
    pub deletion_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
}

impl VolumeSnapshotClass {
    pub fn new(
        generate_name: impl Into<String>,
        driver: impl Into<String>,
        deletion_policy: impl Into<String>,
    ) -> Self {
        Self {
            api_version: SNAPSHOT_API_VERSION.to_string(),
            kind: VOLUME_SNAPSHOT_CLASS_KIND.to_string(),
            metadata: ObjectMeta {
                generate_name: Some(generate_name.into()),
                ..Default::default()
            },
            driver: driver.into(),
            deletion_policy: deletion_policy.into(),
            parameters: None,
        }
    }
}

impl Resource for VolumeSnapshotClass {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(VOLUME_SNAPSHOT_CLASS_KIND)
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(SNAPSHOT_API_GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed("v1beta1")
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed("volumesnapshotclasses")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Create a VolumeSnapshotClass
pub async fn create_snapshot_class(
    client: &K8sClient,
    class: &VolumeSnapshotClass,
) -> E2eResult<VolumeSnapshotClass> {
    use kube::api::{Api, PostParams};

    let classes: Api<VolumeSnapshotClass> = Api::all(client.inner().clone());
    Ok(classes.create(&PostParams::default(), class).await?)
}

/// Delete a VolumeSnapshotClass
pub async fn delete_snapshot_class(client: &K8sClient, name: &str) -> E2eResult<()> {
    use kube::api::{Api, DeleteParams};

    let classes: Api<VolumeSnapshotClass> = Api::all(client.inner().clone());
    classes.delete(name, &DeleteParams::default()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_paths() {
        assert_eq!(VolumeSnapshotClass::api_version(&()), SNAPSHOT_API_VERSION);
        assert_eq!(
            VolumeSnapshotClass::url_path(&(), None),
            "/apis/snapshot.storage.k8s.io/v1beta1/volumesnapshotclasses"
        );
    }

    #[test]
    fn test_wire_format() {
        let class = VolumeSnapshotClass::new("e2e-sc-", "file.csi.azure.com", "Delete");
        let value = serde_json::to_value(&class).unwrap();

        assert_eq!(value["apiVersion"], SNAPSHOT_API_VERSION);
        assert_eq!(value["kind"], "VolumeSnapshotClass");
        assert_eq!(value["metadata"]["generateName"], "e2e-sc-");
        assert_eq!(value["deletionPolicy"], "Delete");
        assert!(value.get("parameters").is_none());
    }
}
