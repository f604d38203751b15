//! PersistentVolumeClaim manifests

use azurefile_e2e_common::{DataSource, VolumeMode, SNAPSHOT_API_GROUP, VOLUME_SNAPSHOT_KIND};
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, TypedLocalObjectReference,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const CLAIM_GENERATE_NAME: &str = "pvc-";

/// Claim template name used by statefulsets; also the pod volume name
pub const STATEFULSET_CLAIM_NAME: &str = "pvc";

pub const ACCESS_MODE: &str = "ReadWriteOnce";

/// Claim for `claim_size` against `storage_class`
///
/// A `None` class renders as the empty class name, which only binds to
/// class-less volumes.
pub fn build_claim(
    namespace: &str,
    claim_size: &str,
    volume_mode: VolumeMode,
    storage_class: Option<&str>,
    data_source: Option<&DataSource>,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            generate_name: Some(CLAIM_GENERATE_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(claim_spec(claim_size, volume_mode, storage_class, data_source)),
        ..Default::default()
    }
}

/// Claim that binds to the pre-provisioned volume `volume_name`
pub fn build_pre_provisioned_claim(
    namespace: &str,
    claim_size: &str,
    volume_mode: VolumeMode,
    volume_name: &str,
) -> PersistentVolumeClaim {
    let mut claim = build_claim(namespace, claim_size, volume_mode, None, None);
    if let Some(spec) = claim.spec.as_mut() {
        spec.volume_name = Some(volume_name.to_string());
    }
    claim
}

/// Per-replica claim template rendered into a statefulset
pub fn statefulset_claim_template(
    namespace: &str,
    storage_class: &str,
    claim_size: &str,
    volume_mode: VolumeMode,
    data_source: Option<&DataSource>,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(STATEFULSET_CLAIM_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(claim_spec(
            claim_size,
            volume_mode,
            Some(storage_class),
            data_source,
        )),
        ..Default::default()
    }
}

fn claim_spec(
    claim_size: &str,
    volume_mode: VolumeMode,
    storage_class: Option<&str>,
    data_source: Option<&DataSource>,
) -> PersistentVolumeClaimSpec {
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), Quantity(claim_size.to_string()));

    PersistentVolumeClaimSpec {
        access_modes: Some(vec![ACCESS_MODE.to_string()]),
        storage_class_name: Some(storage_class.unwrap_or_default().to_string()),
        resources: Some(VolumeResourceRequirements {
            requests: Some(requests),
            limits: None,
        }),
        volume_mode: Some(volume_mode.as_str().to_string()),
        data_source: data_source.map(|source| TypedLocalObjectReference {
            api_group: Some(SNAPSHOT_API_GROUP.to_string()),
            kind: VOLUME_SNAPSHOT_KIND.to_string(),
            name: source.name.clone(),
        }),
        ..Default::default()
    }
}

/// Requested storage of a claim
pub fn requested_size(claim: &PersistentVolumeClaim) -> Option<&str> {
    claim
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .map(|q| q.0.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_claim() {
        let claim = build_claim("e2e", "10Gi", VolumeMode::FileSystem, Some("sc-abc"), None);
        let spec = claim.spec.as_ref().unwrap();

        assert_eq!(claim.metadata.generate_name.as_deref(), Some("pvc-"));
        assert_eq!(spec.storage_class_name.as_deref(), Some("sc-abc"));
        assert_eq!(spec.volume_mode.as_deref(), Some("Filesystem"));
        assert!(spec.data_source.is_none());
        assert_eq!(requested_size(&claim), Some("10Gi"));
    }

    #[test]
    fn test_snapshot_data_source() {
        let source = DataSource {
            name: "snap-1".to_string(),
        };
        let claim = build_claim("e2e", "10Gi", VolumeMode::Block, Some("sc"), Some(&source));
        let data_source = claim.spec.unwrap().data_source.unwrap();

        assert_eq!(data_source.kind, "VolumeSnapshot");
        assert_eq!(data_source.api_group.as_deref(), Some("snapshot.storage.k8s.io"));
        assert_eq!(data_source.name, "snap-1");
    }

    #[test]
    fn test_pre_provisioned_claim_binds_by_name() {
        let claim = build_pre_provisioned_claim("e2e", "5Gi", VolumeMode::FileSystem, "pv-123");
        let spec = claim.spec.unwrap();

        assert_eq!(spec.volume_name.as_deref(), Some("pv-123"));
        assert_eq!(spec.storage_class_name.as_deref(), Some(""));
    }

    #[test]
    fn test_statefulset_template_is_named() {
        let claim = statefulset_claim_template("e2e", "sc", "1Gi", VolumeMode::FileSystem, None);
        assert_eq!(claim.metadata.name.as_deref(), Some(STATEFULSET_CLAIM_NAME));
        assert!(claim.metadata.generate_name.is_none());
    }
}
