//! End-to-end orchestration harness for the Azure File CSI driver
//!
//! Scenarios provision storage classes, claims and pre-provisioned volumes,
//! mount them into test workloads, verify the results and tear everything
//! down again in reverse creation order.

pub mod config;
pub mod driver;
pub mod error;
pub mod kubernetes;
pub mod logging;
pub mod orchestrator;
pub mod resources;
pub mod teardown;
pub mod testsuites;
pub mod verifier;

pub use config::{ConfigError, E2eConfig};
pub use driver::{
    AzureFileDriver, Capability, DynamicPvTestDriver, PreProvisionedVolumeTestDriver, TestDriver,
    VolumeSnapshotTestDriver,
};
pub use error::{E2eError, E2eResult, ErrorKind};
pub use kubernetes::{client::K8sClient, ClusterApi};
pub use orchestrator::{ProvisionedClaim, ResourceOrchestrator, StorageClassSource};
pub use teardown::{ResourceHandle, Teardown};
pub use testsuites::{
    run_scenario, run_suite, Scenario, ScenarioOutcome, ScenarioSettings, SuiteReport,
};
pub use verifier::{PollConfig, ResultVerifier};

pub use azurefile_e2e_common as common;
