//! Error types for the e2e harness
//!
//! Every failure is fatal to the scenario it happens in. `kind()` sorts errors
//! into provisioning failures and workload execution failures.

use crate::driver::Capability;
use azurefile_e2e_common::QuantityError;
use std::time::Duration;
use thiserror::Error;

/// Harness errors
#[derive(Debug, Error)]
pub enum E2eError {
    /// Kubernetes resource not found
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    ResourceNotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Error from kube-rs client, passed through unchanged
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid kubeconfig
    #[error("Invalid kubeconfig: {0}")]
    InvalidKubeconfig(String),

    /// A creation step failed
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Bounded polling ran out of time
    #[error("Timed out after {timeout:?} waiting for {kind}/{name} in namespace {namespace} to become {condition}")]
    Timeout {
        kind: String,
        name: String,
        namespace: String,
        condition: String,
        timeout: Duration,
    },

    /// Bound volume does not match the requested claim
    #[error("Volume validation failed for claim {claim}: {reason}")]
    VolumeMismatch { claim: String, reason: String },

    /// Driver was built without a capability the setup needs
    #[error("Driver '{driver}' does not support {capability:?}")]
    UnsupportedCapability {
        driver: String,
        capability: Capability,
    },

    /// Workload ran but did not succeed
    #[error("Execution error in pod {pod}: {message}")]
    Execution {
        pod: String,
        message: String,
        output: String,
    },

    #[error("Invalid quantity: {0}")]
    Quantity(#[from] QuantityError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A scenario body panicked
    #[error("Scenario panicked: {0}")]
    Panicked(String),
}

/// The two failure classes a scenario can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Provisioning,
    Execution,
}

impl E2eError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            E2eError::Execution { .. } | E2eError::Panicked(_) => ErrorKind::Execution,
            _ => ErrorKind::Provisioning,
        }
    }

    /// True for 404 responses and locally detected missing objects
    pub fn is_not_found(&self) -> bool {
        match self {
            E2eError::ResourceNotFound { .. } => true,
            E2eError::KubeError(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }

    pub fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        E2eError::ResourceNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

/// Result type alias for harness operations
pub type E2eResult<T> = std::result::Result<T, E2eError>;
