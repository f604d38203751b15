//! Manifests for the objects a scenario creates
//!
//! Builders here never talk to the cluster; the orchestrator submits what
//! they produce.

pub mod claim;
pub mod pod;
pub mod workload;

pub use pod::TestPod;
pub use workload::{ClaimMount, TestDeployment, TestStatefulSet, WorkloadCommand};
