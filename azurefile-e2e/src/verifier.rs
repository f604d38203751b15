//! Result verification
//!
//! Bounded polling for claims, pods and workloads, plus validation of the
//! volume a claim ends up bound to.

use crate::error::{E2eError, E2eResult};
use crate::kubernetes::{created_name, ClusterApi};
use crate::resources::TestPod;
use crate::teardown::{ResourceHandle, Teardown};
use azurefile_e2e_common::parse_quantity;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use k8s_openapi::api::storage::v1::StorageClass;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Polling interval and per-condition bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub claim_bound_timeout: Duration,
    pub pod_completion_timeout: Duration,
    pub workload_ready_timeout: Duration,
    pub deletion_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        crate::config::TimeoutConfig::default().poll_config()
    }
}

/// Run `check` every `interval` until it yields a value or `limit` passes
///
/// `Ok(None)` means the time ran out. Errors from `check` end polling at once.
pub(crate) async fn poll_until<T, F, Fut>(
    interval: Duration,
    limit: Duration,
    mut check: F,
) -> E2eResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Option<T>>>,
{
    let polling = async {
        loop {
            if let Some(value) = check().await? {
                return Ok::<T, E2eError>(value);
            }
            tokio::time::sleep(interval).await;
        }
    };

    match tokio::time::timeout(limit, polling).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}

/// Terminal phase of a test pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PodOutcome {
    Succeeded,
    Failed,
}

/// Checks scenario results against the cluster
pub struct ResultVerifier<'a> {
    cluster: &'a dyn ClusterApi,
    poll: PollConfig,
}

impl<'a> ResultVerifier<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, poll: PollConfig) -> Self {
        Self { cluster, poll }
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Poll until the claim reports phase Bound
    pub async fn wait_for_claim_bound(
        &self,
        namespace: &str,
        name: &str,
    ) -> E2eResult<PersistentVolumeClaim> {
        info!("waiting for PersistentVolumeClaim {}/{} to be bound", namespace, name);
        let cluster = self.cluster;

        let bound = poll_until(self.poll.interval, self.poll.claim_bound_timeout, move || async move {
            let claim = cluster.get_claim(namespace, name).await?;
            let phase = claim.status.as_ref().and_then(|s| s.phase.as_deref());
            debug!("claim {}/{} phase: {:?}", namespace, name, phase);
            Ok::<_, E2eError>((phase == Some("Bound")).then_some(claim))
        })
        .await?;

        bound.ok_or_else(|| E2eError::Timeout {
            kind: "PersistentVolumeClaim".to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            condition: "Bound".to_string(),
            timeout: self.poll.claim_bound_timeout,
        })
    }

    /// Fetch the volume a bound claim points at
    pub async fn bound_volume(&self, claim: &PersistentVolumeClaim) -> E2eResult<PersistentVolume> {
        let claim_name = claim.metadata.name.clone().unwrap_or_default();
        let volume_name = claim
            .spec
            .as_ref()
            .and_then(|s| s.volume_name.as_deref())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| E2eError::VolumeMismatch {
                claim: claim_name,
                reason: "claim is not bound to a volume".to_string(),
            })?;

        self.cluster.get_volume(volume_name).await
    }

    /// Compare a bound claim and its volume against what was requested
    ///
    /// Sizes compare by byte value, so `10Gi` matches `10737418240`.
    pub fn validate_provisioned_volume(
        &self,
        requested: &PersistentVolumeClaim,
        bound: &PersistentVolumeClaim,
        volume: &PersistentVolume,
        storage_class: Option<&StorageClass>,
    ) -> E2eResult<()> {
        let claim_name = bound.metadata.name.clone().unwrap_or_default();
        let mismatch = |reason: String| E2eError::VolumeMismatch {
            claim: claim_name.clone(),
            reason,
        };

        let requested_size = crate::resources::claim::requested_size(requested)
            .ok_or_else(|| mismatch("claim requests no storage".to_string()))?;
        let expected_bytes = parse_quantity(requested_size)?;

        let claim_capacity = bound
            .status
            .as_ref()
            .and_then(|s| s.capacity.as_ref())
            .and_then(|c| c.get("storage"))
            .ok_or_else(|| mismatch("bound claim reports no capacity".to_string()))?;
        if parse_quantity(&claim_capacity.0)? != expected_bytes {
            return Err(mismatch(format!(
                "claim capacity {} does not match requested {}",
                claim_capacity.0, requested_size
            )));
        }

        let volume_spec = volume
            .spec
            .as_ref()
            .ok_or_else(|| mismatch("volume has no spec".to_string()))?;
        let volume_capacity = volume_spec
            .capacity
            .as_ref()
            .and_then(|c| c.get("storage"))
            .ok_or_else(|| mismatch("volume reports no capacity".to_string()))?;
        if parse_quantity(&volume_capacity.0)? != expected_bytes {
            return Err(mismatch(format!(
                "volume capacity {} does not match requested {}",
                volume_capacity.0, requested_size
            )));
        }

        let requested_modes = requested.spec.as_ref().and_then(|s| s.access_modes.as_ref());
        if volume_spec.access_modes.as_ref() != requested_modes {
            return Err(mismatch(format!(
                "volume access modes {:?} do not match requested {:?}",
                volume_spec.access_modes, requested_modes
            )));
        }

        let claim_ref = volume_spec
            .claim_ref
            .as_ref()
            .ok_or_else(|| mismatch("volume has no claimRef".to_string()))?;
        if claim_ref.name.as_deref() != bound.metadata.name.as_deref()
            || claim_ref.namespace.as_deref() != bound.metadata.namespace.as_deref()
        {
            return Err(mismatch(format!(
                "volume claimRef {:?}/{:?} points at another claim",
                claim_ref.namespace, claim_ref.name
            )));
        }

        if let Some(class) = storage_class {
            let expected_policy = class.reclaim_policy.as_deref().unwrap_or("Delete");
            let actual_policy = volume_spec
                .persistent_volume_reclaim_policy
                .as_deref()
                .unwrap_or_default();
            if actual_policy != expected_policy {
                return Err(mismatch(format!(
                    "volume reclaim policy {} does not match class {}",
                    actual_policy, expected_policy
                )));
            }

            let expected_options = class.mount_options.clone().unwrap_or_default();
            let actual_options = volume_spec.mount_options.clone().unwrap_or_default();
            if actual_options != expected_options {
                return Err(mismatch(format!(
                    "volume mount options {:?} do not match class {:?}",
                    actual_options, expected_options
                )));
            }
        }

        Ok(())
    }

    /// Create the pod, register it, and wait for it to succeed
    ///
    /// Returns the created pod's name.
    pub async fn run_pod(&self, pod: &TestPod, teardown: &mut Teardown) -> E2eResult<String> {
        let namespace = pod.namespace();
        info!("creating test pod in namespace {}", namespace);
        let created = self.cluster.create_pod(namespace, pod.pod()).await?;
        let name = created_name("Pod", &created.metadata)?;
        teardown.register(ResourceHandle::Pod {
            namespace: namespace.to_string(),
            name: name.clone(),
        });

        self.wait_for_pod_success(namespace, &name).await?;
        Ok(name)
    }

    /// Wait for phase Succeeded; Failed carries the pod logs
    pub async fn wait_for_pod_success(&self, namespace: &str, name: &str) -> E2eResult<()> {
        info!("waiting for pod {}/{} to complete", namespace, name);
        let cluster = self.cluster;

        let outcome = poll_until(self.poll.interval, self.poll.pod_completion_timeout, move || async move {
            let pod = cluster.get_pod(namespace, name).await?;
            let phase = pod_phase(&pod);
            debug!("pod {}/{} phase: {:?}", namespace, name, phase);
            Ok::<_, E2eError>(match phase {
                Some("Succeeded") => Some(PodOutcome::Succeeded),
                Some("Failed") => Some(PodOutcome::Failed),
                _ => None,
            })
        })
        .await?;

        match outcome {
            Some(PodOutcome::Succeeded) => Ok(()),
            Some(PodOutcome::Failed) => {
                let output = match self.cluster.pod_logs(namespace, name).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!("failed to fetch logs of pod {}/{}: {}", namespace, name, e);
                        String::new()
                    }
                };
                error!("pod {}/{} failed, output:\n{}", namespace, name, output);
                Err(E2eError::Execution {
                    pod: name.to_string(),
                    message: "pod phase is Failed".to_string(),
                    output,
                })
            }
            None => {
                if let Ok(pod) = self.cluster.get_pod(namespace, name).await {
                    if let Ok(status) = serde_yaml::to_string(&pod.status) {
                        debug!("pod {}/{} status at timeout:\n{}", namespace, name, status);
                    }
                }
                Err(E2eError::Timeout {
                    kind: "Pod".to_string(),
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    condition: "Succeeded".to_string(),
                    timeout: self.poll.pod_completion_timeout,
                })
            }
        }
    }

    /// The pod's logs contain `expected` as a whole line
    pub async fn expect_log_line(&self, namespace: &str, pod: &str, expected: &str) -> E2eResult<()> {
        let output = self.cluster.pod_logs(namespace, pod).await?;
        if output.lines().any(|line| line.trim_end() == expected) {
            return Ok(());
        }

        Err(E2eError::Execution {
            pod: pod.to_string(),
            message: format!("expected output line {:?} not found", expected),
            output,
        })
    }

    /// Poll until ready replicas reach the desired count
    pub async fn wait_for_deployment_ready(&self, namespace: &str, name: &str) -> E2eResult<()> {
        info!("waiting for Deployment {}/{} to be ready", namespace, name);
        let cluster = self.cluster;

        let ready = poll_until(self.poll.interval, self.poll.workload_ready_timeout, move || async move {
            let deployment = cluster.get_deployment(namespace, name).await?;
            let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            let ready = deployment
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0);
            debug!("deployment {}/{} ready {}/{}", namespace, name, ready, desired);
            Ok::<_, E2eError>((ready >= desired).then_some(()))
        })
        .await?;

        ready.ok_or_else(|| workload_timeout("Deployment", namespace, name, &self.poll))
    }

    pub async fn wait_for_statefulset_ready(&self, namespace: &str, name: &str) -> E2eResult<()> {
        info!("waiting for StatefulSet {}/{} to be ready", namespace, name);
        let cluster = self.cluster;

        let ready = poll_until(self.poll.interval, self.poll.workload_ready_timeout, move || async move {
            let statefulset = cluster.get_statefulset(namespace, name).await?;
            let desired = statefulset.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            let ready = statefulset
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0);
            debug!("statefulset {}/{} ready {}/{}", namespace, name, ready, desired);
            Ok::<_, E2eError>((ready >= desired).then_some(()))
        })
        .await?;

        ready.ok_or_else(|| workload_timeout("StatefulSet", namespace, name, &self.poll))
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

fn workload_timeout(kind: &str, namespace: &str, name: &str, poll: &PollConfig) -> E2eError {
    E2eError::Timeout {
        kind: kind.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        condition: "Ready".to_string(),
        timeout: poll.workload_ready_timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_poll_until_returns_value() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = poll_until(Duration::from_millis(1), Duration::from_secs(5), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, E2eError>((n >= 2).then_some(n))
        })
        .await
        .unwrap();

        assert_eq!(result, Some(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let result: Option<()> = poll_until(Duration::from_millis(5), Duration::from_millis(30), || async {
            Ok::<_, E2eError>(None)
        })
        .await
        .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_poll_until_stops_on_error() {
        let result: E2eResult<Option<()>> =
            poll_until(Duration::from_millis(1), Duration::from_secs(5), || async {
                Err(E2eError::Provisioning("boom".to_string()))
            })
            .await;

        assert!(matches!(result, Err(E2eError::Provisioning(_))));
    }

    #[test]
    fn test_default_poll_config() {
        let poll = PollConfig::default();
        assert_eq!(poll.interval, Duration::from_secs(2));
        assert_eq!(poll.claim_bound_timeout, Duration::from_secs(300));
    }
}
