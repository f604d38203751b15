//! Ordered teardown of scenario resources
//!
//! Every successful creation appends one handle. Release walks the list in
//! reverse so dependents (pods, workloads) go before what they depend on
//! (claims, volumes, classes).

use crate::error::{E2eError, E2eResult};
use crate::kubernetes::ClusterApi;
use crate::resources::workload::replica_claim_names;
use crate::verifier::{poll_until, PollConfig};
use std::fmt;
use tracing::{debug, error, info, warn};

/// A created object that must be deleted when the scenario ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceHandle {
    Namespace {
        name: String,
    },
    StorageClass {
        name: String,
    },
    PersistentVolume {
        name: String,
    },
    Claim {
        namespace: String,
        name: String,
    },
    Pod {
        namespace: String,
        name: String,
    },
    Deployment {
        namespace: String,
        name: String,
    },
    /// Also removes the claims the controller created from `claim_template`
    StatefulSet {
        namespace: String,
        name: String,
        claim_template: String,
        replicas: i32,
    },
    SnapshotClass {
        name: String,
    },
}

impl ResourceHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceHandle::Namespace { .. } => "Namespace",
            ResourceHandle::StorageClass { .. } => "StorageClass",
            ResourceHandle::PersistentVolume { .. } => "PersistentVolume",
            ResourceHandle::Claim { .. } => "PersistentVolumeClaim",
            ResourceHandle::Pod { .. } => "Pod",
            ResourceHandle::Deployment { .. } => "Deployment",
            ResourceHandle::StatefulSet { .. } => "StatefulSet",
            ResourceHandle::SnapshotClass { .. } => "VolumeSnapshotClass",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceHandle::Namespace { name }
            | ResourceHandle::StorageClass { name }
            | ResourceHandle::PersistentVolume { name }
            | ResourceHandle::Claim { name, .. }
            | ResourceHandle::Pod { name, .. }
            | ResourceHandle::Deployment { name, .. }
            | ResourceHandle::StatefulSet { name, .. }
            | ResourceHandle::SnapshotClass { name } => name,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            ResourceHandle::Claim { namespace, .. }
            | ResourceHandle::Pod { namespace, .. }
            | ResourceHandle::Deployment { namespace, .. }
            | ResourceHandle::StatefulSet { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    /// Delete the object; an object that is already gone counts as released
    pub async fn release(&self, cluster: &dyn ClusterApi, poll: &PollConfig) -> E2eResult<()> {
        self.delete_and_wait(cluster, poll).await?;

        if let ResourceHandle::StatefulSet {
            namespace,
            name,
            claim_template,
            replicas,
        } = self
        {
            for claim in replica_claim_names(claim_template, name, *replicas) {
                ResourceHandle::Claim {
                    namespace: namespace.clone(),
                    name: claim,
                }
                .delete_and_wait(cluster, poll)
                .await?;
            }
        }

        Ok(())
    }

    async fn delete_and_wait(&self, cluster: &dyn ClusterApi, poll: &PollConfig) -> E2eResult<()> {
        info!("deleting {}", self);
        let result = match self {
            ResourceHandle::Namespace { name } => cluster.delete_namespace(name).await,
            ResourceHandle::StorageClass { name } => cluster.delete_storage_class(name).await,
            ResourceHandle::PersistentVolume { name } => cluster.delete_volume(name).await,
            ResourceHandle::Claim { namespace, name } => cluster.delete_claim(namespace, name).await,
            ResourceHandle::Pod { namespace, name } => cluster.delete_pod(namespace, name).await,
            ResourceHandle::Deployment { namespace, name } => {
                cluster.delete_deployment(namespace, name).await
            }
            ResourceHandle::StatefulSet {
                namespace, name, ..
            } => cluster.delete_statefulset(namespace, name).await,
            ResourceHandle::SnapshotClass { name } => cluster.delete_snapshot_class(name).await,
        };

        match result {
            Ok(()) => self.wait_until_gone(cluster, poll).await,
            Err(e) if e.is_not_found() => {
                debug!("{} already gone", self);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Block until a deleted pod, claim or workload has disappeared
    async fn wait_until_gone(&self, cluster: &dyn ClusterApi, poll: &PollConfig) -> E2eResult<()> {
        let waits = matches!(
            self,
            ResourceHandle::Pod { .. }
                | ResourceHandle::Claim { .. }
                | ResourceHandle::Deployment { .. }
                | ResourceHandle::StatefulSet { .. }
        );
        if !waits {
            return Ok(());
        }

        let gone = poll_until(poll.interval, poll.deletion_timeout, move || self.is_gone(cluster)).await?;
        gone.ok_or_else(|| E2eError::Timeout {
            kind: self.kind().to_string(),
            name: self.name().to_string(),
            namespace: self.namespace().unwrap_or_default().to_string(),
            condition: "deleted".to_string(),
            timeout: poll.deletion_timeout,
        })
    }

    async fn is_gone(&self, cluster: &dyn ClusterApi) -> E2eResult<Option<()>> {
        let lookup = match self {
            ResourceHandle::Pod { namespace, name } => cluster.get_pod(namespace, name).await.map(drop),
            ResourceHandle::Claim { namespace, name } => {
                cluster.get_claim(namespace, name).await.map(drop)
            }
            ResourceHandle::Deployment { namespace, name } => {
                cluster.get_deployment(namespace, name).await.map(drop)
            }
            ResourceHandle::StatefulSet {
                namespace, name, ..
            } => cluster.get_statefulset(namespace, name).await.map(drop),
            _ => return Ok(Some(())),
        };

        match lookup {
            Ok(()) => Ok(None),
            Err(e) if e.is_not_found() => Ok(Some(())),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(namespace) => write!(f, "{} {}/{}", self.kind(), namespace, self.name()),
            None => write!(f, "{} {}", self.kind(), self.name()),
        }
    }
}

/// Handles registered by one scenario, in creation order
#[derive(Debug, Default)]
pub struct Teardown {
    handles: Vec<ResourceHandle>,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: ResourceHandle) {
        debug!("registered {} for teardown", handle);
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> &[ResourceHandle] {
        &self.handles
    }

    /// Release every handle, newest first
    ///
    /// A failed release is logged and the rest still run. The list is empty
    /// afterwards; the failures are returned.
    pub async fn release_all(&mut self, cluster: &dyn ClusterApi, poll: &PollConfig) -> Vec<E2eError> {
        let mut failures = Vec::new();

        while let Some(handle) = self.handles.pop() {
            if let Err(e) = handle.release(cluster, poll).await {
                error!("failed to delete {}: {}", handle, e);
                failures.push(e);
            }
        }

        if !failures.is_empty() {
            warn!("teardown finished with {} failure(s)", failures.len());
        }
        failures
    }
}
