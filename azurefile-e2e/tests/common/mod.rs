//! Common test utilities and helpers
//!
//! `FakeCluster` is an in-memory `ClusterApi` that behaves enough like an API
//! server for the orchestrator: generated names, claim binding, dependency
//! checks on delete, injected failures and a log of every call.

#![allow(dead_code)]

use async_trait::async_trait;
use azurefile_e2e::kubernetes::snapshot::VolumeSnapshotClass;
use azurefile_e2e::{ClusterApi, E2eError, E2eResult, PollConfig, ScenarioSettings};
use azurefile_e2e::common::StorageAccountTiers;
use azurefile_e2e::config::WorkloadImages;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus, StatefulSet, StatefulSetStatus};
use k8s_openapi::api::core::v1::{
    Namespace, ObjectReference, PersistentVolume, PersistentVolumeClaim,
    PersistentVolumeClaimStatus, PersistentVolumeSpec, PersistentVolumeStatus, Pod, PodSpec,
    PodStatus,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_NAMESPACE: &str = "e2e-test";

type Key = (String, String);

#[derive(Default)]
struct State {
    counter: u32,
    namespaces: BTreeSet<String>,
    storage_classes: BTreeMap<String, StorageClass>,
    claims: BTreeMap<Key, PersistentVolumeClaim>,
    volumes: BTreeMap<String, PersistentVolume>,
    pods: BTreeMap<Key, Pod>,
    deployments: BTreeMap<Key, Deployment>,
    statefulsets: BTreeMap<Key, StatefulSet>,
    snapshot_classes: BTreeMap<String, VolumeSnapshotClass>,
    calls: Vec<String>,
    failing: HashSet<String>,
    never_bind: bool,
    pod_phase: Option<String>,
    pod_logs: String,
    workloads_ready: bool,
    provisioned_capacity: Option<String>,
}

/// In-memory cluster
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        FakeCluster {
            state: Mutex::new(State {
                pod_phase: Some("Succeeded".to_string()),
                workloads_ready: true,
                ..Default::default()
            }),
        }
    }

    /// Cluster with `TEST_NAMESPACE` already present
    pub fn with_namespace() -> Self {
        let cluster = Self::new();
        cluster.state().namespaces.insert(TEST_NAMESPACE.to_string());
        cluster
    }

    /// Every call to `operation` fails
    pub fn fail_on(&self, operation: &str) {
        self.state().failing.insert(operation.to_string());
    }

    /// Claims are never bound
    pub fn never_bind(&self) {
        self.state().never_bind = true;
    }

    /// Phase test pods report; None leaves them Pending forever
    pub fn set_pod_phase(&self, phase: Option<&str>) {
        self.state().pod_phase = phase.map(String::from);
    }

    pub fn set_pod_logs(&self, logs: &str) {
        self.state().pod_logs = logs.to_string();
    }

    pub fn set_workloads_ready(&self, ready: bool) {
        self.state().workloads_ready = ready;
    }

    /// Capacity given to dynamically provisioned volumes instead of the request
    pub fn set_provisioned_capacity(&self, capacity: &str) {
        self.state().provisioned_capacity = Some(capacity.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn storage_classes(&self) -> Vec<StorageClass> {
        self.state().storage_classes.values().cloned().collect()
    }

    pub fn claims(&self) -> Vec<PersistentVolumeClaim> {
        self.state().claims.values().cloned().collect()
    }

    pub fn volumes(&self) -> Vec<PersistentVolume> {
        self.state().volumes.values().cloned().collect()
    }

    pub fn pods(&self) -> Vec<Pod> {
        self.state().pods.values().cloned().collect()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state().namespaces.iter().cloned().collect()
    }

    pub fn snapshot_class_count(&self) -> usize {
        self.state().snapshot_classes.len()
    }

    pub fn deployment_count(&self) -> usize {
        self.state().deployments.len()
    }

    pub fn statefulset_count(&self) -> usize {
        self.state().statefulsets.len()
    }

    /// Nothing left apart from pre-existing namespaces and classes
    pub fn is_clean(&self) -> bool {
        let state = self.state();
        state.claims.is_empty()
            && state.volumes.is_empty()
            && state.pods.is_empty()
            && state.deployments.is_empty()
            && state.statefulsets.is_empty()
            && state.snapshot_classes.is_empty()
    }

    /// Add a storage class that the harness did not create
    pub fn insert_storage_class(&self, name: &str, binding_mode: &str) {
        let class = StorageClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            provisioner: "file.csi.azure.com".to_string(),
            reclaim_policy: Some("Delete".to_string()),
            volume_binding_mode: Some(binding_mode.to_string()),
            ..Default::default()
        };
        self.state().storage_classes.insert(name.to_string(), class);
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record the call and apply injected failures
    fn enter(&self, operation: &str, target: &str) -> E2eResult<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(format!("{}:{}", operation, target));
        if state.failing.contains(operation) {
            return Err(E2eError::Provisioning(format!("injected failure in {}", operation)));
        }
        Ok(state)
    }
}

impl State {
    fn assign_name(&mut self, meta: &ObjectMeta) -> String {
        self.counter += 1;
        match &meta.name {
            Some(name) => name.clone(),
            None => format!("{}{}", meta.generate_name.clone().unwrap_or_default(), self.counter),
        }
    }

    fn require_namespace(&self, namespace: &str) -> E2eResult<()> {
        if self.namespaces.contains(namespace) {
            Ok(())
        } else {
            Err(E2eError::not_found("Namespace", "", namespace))
        }
    }

    /// Bind a pending claim, provisioning a volume when it names none
    fn bind(&mut self, key: &Key) {
        if self.never_bind {
            return;
        }
        let Some(claim) = self.claims.get(key).cloned() else {
            return;
        };
        if claim_phase(&claim) == Some("Bound") {
            return;
        }
        let spec = claim.spec.clone().unwrap_or_default();
        let requested = spec
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get("storage"))
            .cloned()
            .unwrap_or_else(|| Quantity("0".to_string()));

        let volume_name = match spec.volume_name.clone().filter(|v| !v.is_empty()) {
            Some(name) => name,
            None => {
                let class_name = spec.storage_class_name.clone().unwrap_or_default();
                let Some(class) = self.storage_classes.get(&class_name).cloned() else {
                    return;
                };
                self.counter += 1;
                let name = format!("pvc-volume-{}", self.counter);
                let capacity = self
                    .provisioned_capacity
                    .clone()
                    .map(Quantity)
                    .unwrap_or_else(|| requested.clone());
                let volume = PersistentVolume {
                    metadata: ObjectMeta {
                        name: Some(name.clone()),
                        ..Default::default()
                    },
                    spec: Some(PersistentVolumeSpec {
                        capacity: Some(BTreeMap::from([("storage".to_string(), capacity)])),
                        access_modes: spec.access_modes.clone(),
                        persistent_volume_reclaim_policy: Some(
                            class.reclaim_policy.clone().unwrap_or_else(|| "Delete".to_string()),
                        ),
                        mount_options: class.mount_options.clone(),
                        storage_class_name: Some(class_name),
                        volume_mode: spec.volume_mode.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                self.volumes.insert(name.clone(), volume);
                name
            }
        };

        let Some(volume) = self.volumes.get_mut(&volume_name) else {
            return;
        };
        if let Some(pv_spec) = volume.spec.as_mut() {
            pv_spec.claim_ref = Some(ObjectReference {
                kind: Some("PersistentVolumeClaim".to_string()),
                name: Some(key.1.clone()),
                namespace: Some(key.0.clone()),
                ..Default::default()
            });
        }
        volume.status = Some(PersistentVolumeStatus {
            phase: Some("Bound".to_string()),
            ..Default::default()
        });
        let capacity = volume.spec.as_ref().and_then(|s| s.capacity.clone());

        if let Some(claim) = self.claims.get_mut(key) {
            if let Some(claim_spec) = claim.spec.as_mut() {
                claim_spec.volume_name = Some(volume_name);
            }
            claim.status = Some(PersistentVolumeClaimStatus {
                phase: Some("Bound".to_string()),
                capacity,
                access_modes: spec.access_modes,
                ..Default::default()
            });
        }
    }

    fn binds_immediately(&self, claim: &PersistentVolumeClaim) -> bool {
        let spec = claim.spec.clone().unwrap_or_default();
        if spec.volume_name.map_or(false, |v| !v.is_empty()) {
            return true;
        }
        let class_name = spec.storage_class_name.unwrap_or_default();
        self.storage_classes
            .get(&class_name)
            .and_then(|c| c.volume_binding_mode.clone())
            .map_or(true, |mode| mode != "WaitForFirstConsumer")
    }

    /// First consumer scheduled: bind the claims it references
    fn bind_consumed(&mut self, namespace: &str, pod_spec: Option<&PodSpec>) {
        for claim in referenced_claims(pod_spec) {
            self.bind(&(namespace.to_string(), claim));
        }
    }

    fn claim_in_use(&self, namespace: &str, name: &str) -> bool {
        let uses = |spec: Option<&PodSpec>| referenced_claims(spec).iter().any(|c| c == name);

        self.pods
            .iter()
            .any(|((ns, _), pod)| ns == namespace && uses(pod.spec.as_ref()))
            || self.deployments.iter().any(|((ns, _), d)| {
                ns == namespace && uses(d.spec.as_ref().and_then(|s| s.template.spec.as_ref()))
            })
    }
}

fn claim_phase(claim: &PersistentVolumeClaim) -> Option<&str> {
    claim.status.as_ref().and_then(|s| s.phase.as_deref())
}

fn referenced_claims(spec: Option<&PodSpec>) -> Vec<String> {
    spec.and_then(|s| s.volumes.as_ref())
        .map(|volumes| {
            volumes
                .iter()
                .filter_map(|v| v.persistent_volume_claim.as_ref())
                .map(|c| c.claim_name.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn in_use(kind: &str, name: &str, by: &str) -> E2eError {
    E2eError::Provisioning(format!("{} {} is still in use by {}", kind, name, by))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn create_namespace(&self, generate_name: &str) -> E2eResult<Namespace> {
        let mut state = self.enter("create_namespace", generate_name)?;
        let meta = ObjectMeta {
            generate_name: Some(generate_name.to_string()),
            ..Default::default()
        };
        let name = state.assign_name(&meta);
        state.namespaces.insert(name.clone());
        Ok(Namespace {
            metadata: ObjectMeta {
                name: Some(name),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn delete_namespace(&self, name: &str) -> E2eResult<()> {
        let mut state = self.enter("delete_namespace", name)?;
        if !state.namespaces.contains(name) {
            return Err(E2eError::not_found("Namespace", "", name));
        }
        let occupied = state.claims.keys().any(|(ns, _)| ns == name)
            || state.pods.keys().any(|(ns, _)| ns == name)
            || state.deployments.keys().any(|(ns, _)| ns == name)
            || state.statefulsets.keys().any(|(ns, _)| ns == name);
        if occupied {
            return Err(in_use("Namespace", name, "namespaced objects"));
        }
        state.namespaces.remove(name);
        Ok(())
    }

    async fn create_storage_class(&self, sc: &StorageClass) -> E2eResult<StorageClass> {
        let mut state = self.enter("create_storage_class", "")?;
        let name = state.assign_name(&sc.metadata);
        let mut created = sc.clone();
        created.metadata.name = Some(name.clone());
        state.storage_classes.insert(name, created.clone());
        Ok(created)
    }

    async fn get_storage_class(&self, name: &str) -> E2eResult<StorageClass> {
        let state = self.enter("get_storage_class", name)?;
        state
            .storage_classes
            .get(name)
            .cloned()
            .ok_or_else(|| E2eError::not_found("StorageClass", "", name))
    }

    async fn delete_storage_class(&self, name: &str) -> E2eResult<()> {
        let mut state = self.enter("delete_storage_class", name)?;
        let used = state.claims.values().any(|c| {
            c.spec.as_ref().and_then(|s| s.storage_class_name.as_deref()) == Some(name)
        });
        if used {
            return Err(in_use("StorageClass", name, "a claim"));
        }
        state
            .storage_classes
            .remove(name)
            .map(drop)
            .ok_or_else(|| E2eError::not_found("StorageClass", "", name))
    }

    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> E2eResult<PersistentVolumeClaim> {
        let mut state = self.enter("create_claim", namespace)?;
        state.require_namespace(namespace)?;
        let name = state.assign_name(&claim.metadata);
        let mut created = claim.clone();
        created.metadata.name = Some(name.clone());
        created.status = Some(PersistentVolumeClaimStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });
        let immediate = state.binds_immediately(&created);
        state.claims.insert(key(namespace, &name), created.clone());
        if immediate {
            state.bind(&key(namespace, &name));
        }
        Ok(created)
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> E2eResult<PersistentVolumeClaim> {
        let state = self.enter("get_claim", name)?;
        state
            .claims
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| E2eError::not_found("PersistentVolumeClaim", namespace, name))
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> E2eResult<()> {
        let mut state = self.enter("delete_claim", name)?;
        if state.claim_in_use(namespace, name) {
            return Err(in_use("PersistentVolumeClaim", name, "a workload"));
        }
        let claim = state
            .claims
            .remove(&key(namespace, name))
            .ok_or_else(|| E2eError::not_found("PersistentVolumeClaim", namespace, name))?;

        // Dynamically provisioned volumes follow their class's reclaim policy
        let volume_name = claim.spec.and_then(|s| s.volume_name);
        if let Some(volume_name) = volume_name {
            let reclaim = state
                .volumes
                .get(&volume_name)
                .and_then(|v| v.spec.as_ref())
                .and_then(|s| s.persistent_volume_reclaim_policy.clone());
            let dynamic = volume_name.starts_with("pvc-volume-");
            if dynamic && reclaim.as_deref() == Some("Delete") {
                state.volumes.remove(&volume_name);
            } else if let Some(volume) = state.volumes.get_mut(&volume_name) {
                volume.status = Some(PersistentVolumeStatus {
                    phase: Some("Released".to_string()),
                    ..Default::default()
                });
            }
        }
        Ok(())
    }

    async fn create_volume(&self, pv: &PersistentVolume) -> E2eResult<PersistentVolume> {
        let mut state = self.enter("create_volume", "")?;
        let name = state.assign_name(&pv.metadata);
        let mut created = pv.clone();
        created.metadata.name = Some(name.clone());
        created.status = Some(PersistentVolumeStatus {
            phase: Some("Available".to_string()),
            ..Default::default()
        });
        state.volumes.insert(name, created.clone());
        Ok(created)
    }

    async fn get_volume(&self, name: &str) -> E2eResult<PersistentVolume> {
        let state = self.enter("get_volume", name)?;
        state
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| E2eError::not_found("PersistentVolume", "", name))
    }

    async fn delete_volume(&self, name: &str) -> E2eResult<()> {
        let mut state = self.enter("delete_volume", name)?;
        let bound = state.claims.values().any(|c| {
            c.spec.as_ref().and_then(|s| s.volume_name.as_deref()) == Some(name)
        });
        if bound {
            return Err(in_use("PersistentVolume", name, "a bound claim"));
        }
        state
            .volumes
            .remove(name)
            .map(drop)
            .ok_or_else(|| E2eError::not_found("PersistentVolume", "", name))
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> E2eResult<Pod> {
        let mut state = self.enter("create_pod", namespace)?;
        state.require_namespace(namespace)?;
        let name = state.assign_name(&pod.metadata);
        let mut created = pod.clone();
        created.metadata.name = Some(name.clone());
        state.bind_consumed(namespace, created.spec.as_ref());

        // A pod only runs once all of its claims are bound
        let all_bound = referenced_claims(created.spec.as_ref()).iter().all(|claim| {
            state
                .claims
                .get(&key(namespace, claim))
                .map_or(false, |c| claim_phase(c) == Some("Bound"))
        });
        let phase = if all_bound {
            state.pod_phase.clone()
        } else {
            Some("Pending".to_string())
        };
        created.status = Some(PodStatus {
            phase,
            ..Default::default()
        });
        state.pods.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> E2eResult<Pod> {
        let state = self.enter("get_pod", name)?;
        state
            .pods
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| E2eError::not_found("Pod", namespace, name))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> E2eResult<()> {
        let mut state = self.enter("delete_pod", name)?;
        state
            .pods
            .remove(&key(namespace, name))
            .map(drop)
            .ok_or_else(|| E2eError::not_found("Pod", namespace, name))
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> E2eResult<String> {
        let state = self.enter("pod_logs", name)?;
        if !state.pods.contains_key(&key(namespace, name)) {
            return Err(E2eError::not_found("Pod", namespace, name));
        }
        Ok(state.pod_logs.clone())
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> E2eResult<Deployment> {
        let mut state = self.enter("create_deployment", namespace)?;
        state.require_namespace(namespace)?;
        let name = state.assign_name(&deployment.metadata);
        let mut created = deployment.clone();
        created.metadata.name = Some(name.clone());
        let template = created.spec.as_ref().and_then(|s| s.template.spec.clone());
        state.bind_consumed(namespace, template.as_ref());

        let replicas = created.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        created.status = Some(DeploymentStatus {
            ready_replicas: Some(if state.workloads_ready { replicas } else { 0 }),
            ..Default::default()
        });
        state.deployments.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> E2eResult<Deployment> {
        let state = self.enter("get_deployment", name)?;
        state
            .deployments
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| E2eError::not_found("Deployment", namespace, name))
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> E2eResult<()> {
        let mut state = self.enter("delete_deployment", name)?;
        state
            .deployments
            .remove(&key(namespace, name))
            .map(drop)
            .ok_or_else(|| E2eError::not_found("Deployment", namespace, name))
    }

    async fn create_statefulset(
        &self,
        namespace: &str,
        statefulset: &StatefulSet,
    ) -> E2eResult<StatefulSet> {
        let mut state = self.enter("create_statefulset", namespace)?;
        state.require_namespace(namespace)?;
        let name = state.assign_name(&statefulset.metadata);
        let mut created = statefulset.clone();
        created.metadata.name = Some(name.clone());

        // The controller creates one claim per replica from each template
        let replicas = created.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let templates = created
            .spec
            .as_ref()
            .and_then(|s| s.volume_claim_templates.clone())
            .unwrap_or_default();
        for template in templates {
            let template_name = template.metadata.name.clone().unwrap_or_default();
            for ordinal in 0..replicas {
                let claim_name = format!("{}-{}-{}", template_name, name, ordinal);
                let mut claim = template.clone();
                claim.metadata.name = Some(claim_name.clone());
                claim.metadata.namespace = Some(namespace.to_string());
                state.claims.insert(key(namespace, &claim_name), claim);
                state.bind(&key(namespace, &claim_name));
            }
        }

        created.status = Some(StatefulSetStatus {
            replicas,
            ready_replicas: Some(if state.workloads_ready { replicas } else { 0 }),
            ..Default::default()
        });
        state.statefulsets.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn get_statefulset(&self, namespace: &str, name: &str) -> E2eResult<StatefulSet> {
        let state = self.enter("get_statefulset", name)?;
        state
            .statefulsets
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| E2eError::not_found("StatefulSet", namespace, name))
    }

    async fn delete_statefulset(&self, namespace: &str, name: &str) -> E2eResult<()> {
        let mut state = self.enter("delete_statefulset", name)?;
        state
            .statefulsets
            .remove(&key(namespace, name))
            .map(drop)
            .ok_or_else(|| E2eError::not_found("StatefulSet", namespace, name))
    }

    async fn create_snapshot_class(
        &self,
        class: &VolumeSnapshotClass,
    ) -> E2eResult<VolumeSnapshotClass> {
        let mut state = self.enter("create_snapshot_class", "")?;
        let name = state.assign_name(&class.metadata);
        let mut created = class.clone();
        created.metadata.name = Some(name.clone());
        state.snapshot_classes.insert(name, created.clone());
        Ok(created)
    }

    async fn delete_snapshot_class(&self, name: &str) -> E2eResult<()> {
        let mut state = self.enter("delete_snapshot_class", name)?;
        state
            .snapshot_classes
            .remove(name)
            .map(drop)
            .ok_or_else(|| E2eError::not_found("VolumeSnapshotClass", "", name))
    }
}

/// Fast polling so timeouts resolve in milliseconds
pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(1),
        claim_bound_timeout: Duration::from_millis(50),
        pod_completion_timeout: Duration::from_millis(50),
        workload_ready_timeout: Duration::from_millis(50),
        deletion_timeout: Duration::from_millis(50),
    }
}

pub fn fast_settings() -> ScenarioSettings {
    ScenarioSettings {
        namespace_prefix: "azurefile-".to_string(),
        tiers: StorageAccountTiers::default(),
        images: WorkloadImages::default(),
        poll: fast_poll(),
    }
}

/// Position of the first call starting with `prefix`
pub fn call_index(calls: &[String], prefix: &str) -> Option<usize> {
    calls.iter().position(|c| c.starts_with(prefix))
}
