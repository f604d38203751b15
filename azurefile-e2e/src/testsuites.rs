//! End-to-end scenarios
//!
//! Each scenario composes setup, workload creation and verification. They
//! run through `run_scenario`, which gives every scenario its own namespace
//! and always releases what was created, whether the body returns an error,
//! succeeds, or panics.

use crate::config::{E2eConfig, WorkloadImages};
use crate::driver::{Capability, DynamicPvTestDriver, PreProvisionedVolumeTestDriver, TestDriver};
use crate::error::{E2eError, E2eResult};
use crate::kubernetes::{created_name, ClusterApi};
use crate::orchestrator::{ResourceOrchestrator, StorageClassSource};
use crate::resources::TestPod;
use crate::teardown::{ResourceHandle, Teardown};
use crate::verifier::PollConfig;
use async_trait::async_trait;
use azurefile_e2e_common::{PodDetails, StorageAccountTiers, VolumeDetails};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

/// A scenario body, run against an orchestrator bound to a fresh namespace
#[async_trait(?Send)]
pub trait Scenario {
    fn name(&self) -> &str;

    async fn run(
        &self,
        orchestrator: &ResourceOrchestrator<'_>,
        teardown: &mut Teardown,
    ) -> E2eResult<()>;
}

/// Settings shared by every scenario of a run
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    pub namespace_prefix: String,
    pub tiers: StorageAccountTiers,
    pub images: WorkloadImages,
    pub poll: PollConfig,
}

impl ScenarioSettings {
    pub fn from_config(config: &E2eConfig) -> Self {
        Self {
            namespace_prefix: config.namespace.prefix.clone(),
            tiers: config.storage_account_tiers.clone(),
            images: config.images.clone(),
            poll: config.timeouts.poll_config(),
        }
    }
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self::from_config(&E2eConfig::default())
    }
}

/// Create a namespace for one scenario and register it for teardown
pub async fn create_test_namespace(
    cluster: &dyn ClusterApi,
    prefix: &str,
    teardown: &mut Teardown,
) -> E2eResult<String> {
    let namespace = cluster.create_namespace(prefix).await?;
    let name = created_name("Namespace", &namespace.metadata)?;
    info!("created test namespace {}", name);
    teardown.register(ResourceHandle::Namespace { name: name.clone() });
    Ok(name)
}

/// Run `scenario` in its own namespace and release everything it created
///
/// A panic in the body is reported as `E2eError::Panicked` after teardown.
/// When the body succeeds but teardown does not, the first teardown failure
/// is returned.
pub async fn run_scenario(
    scenario: &dyn Scenario,
    cluster: &dyn ClusterApi,
    settings: &ScenarioSettings,
) -> E2eResult<()> {
    info!("running scenario {}", scenario.name());
    let mut teardown = Teardown::new();

    let outcome = match create_test_namespace(cluster, &settings.namespace_prefix, &mut teardown).await
    {
        Ok(namespace) => {
            let orchestrator = ResourceOrchestrator::new(
                cluster,
                namespace,
                settings.tiers.clone(),
                settings.images.clone(),
                settings.poll.clone(),
            );
            AssertUnwindSafe(scenario.run(&orchestrator, &mut teardown))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(E2eError::Panicked(panic_message(payload))))
        }
        Err(e) => Err(e),
    };

    if let Err(e) = &outcome {
        error!("scenario {} failed ({:?}): {}", scenario.name(), e.kind(), e);
    }

    let mut failures = teardown.release_all(cluster, &settings.poll).await;
    if !failures.is_empty() {
        warn!(
            "scenario {} left {} resource(s) behind",
            scenario.name(),
            failures.len()
        );
    }

    match outcome {
        Ok(()) if !failures.is_empty() => Err(failures.remove(0)),
        other => other,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

/// Submit the pod, wait for success and check its output
async fn run_test_pod(
    orchestrator: &ResourceOrchestrator<'_>,
    pod: &TestPod,
    expected_output: Option<&str>,
    teardown: &mut Teardown,
) -> E2eResult<()> {
    if let Ok(manifest) = serde_yaml::to_string(pod.pod()) {
        tracing::debug!("test pod manifest:\n{}", manifest);
    }

    info!("deploying the pod");
    let verifier = orchestrator.verifier();
    let name = verifier.run_pod(pod, teardown).await?;

    if let Some(expected) = expected_output {
        info!("checking pod output");
        verifier
            .expect_log_line(orchestrator.namespace(), &name, expected)
            .await?;
    }
    Ok(())
}

/// Dynamically provisioned volumes exercised by a single command
pub struct DynamicallyProvisionedCmdVolumeTest<'d> {
    pub driver: &'d dyn DynamicPvTestDriver,
    pub pod: PodDetails,
    pub storage_class: StorageClassSource,
    pub expected_output: Option<String>,
}

#[async_trait(?Send)]
impl Scenario for DynamicallyProvisionedCmdVolumeTest<'_> {
    fn name(&self) -> &str {
        "dynamically provisioned cmd volume"
    }

    async fn run(
        &self,
        orchestrator: &ResourceOrchestrator<'_>,
        teardown: &mut Teardown,
    ) -> E2eResult<()> {
        let pod = orchestrator
            .setup_dynamic(&self.pod, self.driver, &self.storage_class, teardown)
            .await?;
        run_test_pod(orchestrator, &pod, self.expected_output.as_deref(), teardown).await
    }
}

/// Dynamically provisioned volumes mounted through the `test` subdirectory
pub struct DynamicallyProvisionedVolumeSubpathTest<'d> {
    pub driver: &'d dyn DynamicPvTestDriver,
    pub pod: PodDetails,
    pub storage_class: StorageClassSource,
}

#[async_trait(?Send)]
impl Scenario for DynamicallyProvisionedVolumeSubpathTest<'_> {
    fn name(&self) -> &str {
        "dynamically provisioned volume subpath"
    }

    async fn run(
        &self,
        orchestrator: &ResourceOrchestrator<'_>,
        teardown: &mut Teardown,
    ) -> E2eResult<()> {
        let pod = orchestrator
            .setup_dynamic_with_subpath(&self.pod, self.driver, &self.storage_class, teardown)
            .await?;
        run_test_pod(orchestrator, &pod, None, teardown).await
    }
}

/// One class per volume, cycling through the storage account tiers
pub struct DynamicallyProvisionedMultipleTiersTest<'d> {
    pub driver: &'d dyn DynamicPvTestDriver,
    pub pod: PodDetails,
}

#[async_trait(?Send)]
impl Scenario for DynamicallyProvisionedMultipleTiersTest<'_> {
    fn name(&self) -> &str {
        "dynamically provisioned volumes across storage account tiers"
    }

    async fn run(
        &self,
        orchestrator: &ResourceOrchestrator<'_>,
        teardown: &mut Teardown,
    ) -> E2eResult<()> {
        let pod = orchestrator
            .setup_dynamic_multiple_tiers(&self.pod, self.driver, teardown)
            .await?;
        run_test_pod(orchestrator, &pod, None, teardown).await
    }
}

/// Existing shares exposed through pre-provisioned volumes
pub struct PreProvisionedVolumeTest<'d> {
    pub driver: &'d dyn PreProvisionedVolumeTestDriver,
    pub pod: PodDetails,
    pub expected_output: Option<String>,
}

#[async_trait(?Send)]
impl Scenario for PreProvisionedVolumeTest<'_> {
    fn name(&self) -> &str {
        "pre-provisioned volume"
    }

    async fn run(
        &self,
        orchestrator: &ResourceOrchestrator<'_>,
        teardown: &mut Teardown,
    ) -> E2eResult<()> {
        let pod = orchestrator
            .setup_pre_provisioned(&self.pod, self.driver, teardown)
            .await?;
        run_test_pod(orchestrator, &pod, self.expected_output.as_deref(), teardown).await
    }
}

pub struct PreProvisionedVolumeSubpathTest<'d> {
    pub driver: &'d dyn PreProvisionedVolumeTestDriver,
    pub pod: PodDetails,
}

#[async_trait(?Send)]
impl Scenario for PreProvisionedVolumeSubpathTest<'_> {
    fn name(&self) -> &str {
        "pre-provisioned volume subpath"
    }

    async fn run(
        &self,
        orchestrator: &ResourceOrchestrator<'_>,
        teardown: &mut Teardown,
    ) -> E2eResult<()> {
        let pod = orchestrator
            .setup_pre_provisioned_with_subpath(&self.pod, self.driver, teardown)
            .await?;
        run_test_pod(orchestrator, &pod, None, teardown).await
    }
}

/// Long-running deployment on a dynamically provisioned volume
pub struct DynamicallyProvisionedDeploymentTest<'d> {
    pub driver: &'d dyn DynamicPvTestDriver,
    pub pod: PodDetails,
    pub storage_class: StorageClassSource,
}

#[async_trait(?Send)]
impl Scenario for DynamicallyProvisionedDeploymentTest<'_> {
    fn name(&self) -> &str {
        "dynamically provisioned deployment"
    }

    async fn run(
        &self,
        orchestrator: &ResourceOrchestrator<'_>,
        teardown: &mut Teardown,
    ) -> E2eResult<()> {
        let deployment = orchestrator
            .setup_deployment(&self.pod, self.driver, &self.storage_class, teardown)
            .await?;
        orchestrator
            .verifier()
            .wait_for_deployment_ready(deployment.namespace(), deployment.name())
            .await
    }
}

/// StatefulSet provisioning its claim from a template
pub struct DynamicallyProvisionedStatefulSetTest<'d> {
    pub driver: &'d dyn DynamicPvTestDriver,
    pub pod: PodDetails,
    pub storage_class: StorageClassSource,
}

#[async_trait(?Send)]
impl Scenario for DynamicallyProvisionedStatefulSetTest<'_> {
    fn name(&self) -> &str {
        "dynamically provisioned statefulset"
    }

    async fn run(
        &self,
        orchestrator: &ResourceOrchestrator<'_>,
        teardown: &mut Teardown,
    ) -> E2eResult<()> {
        let statefulset = orchestrator
            .setup_statefulset(&self.pod, self.driver, &self.storage_class, teardown)
            .await?;
        orchestrator
            .verifier()
            .wait_for_statefulset_ready(statefulset.namespace(), statefulset.name())
            .await
    }
}

/// How one scenario of a suite run ended
#[derive(Debug)]
pub enum ScenarioOutcome {
    Passed,
    Failed(E2eError),
    Skipped(String),
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: ScenarioOutcome,
}

/// Results of `run_suite`, in run order
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Skipped(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&ScenarioOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Shell commands run by the suite's workloads
struct SuiteCommands {
    write_and_print: &'static str,
    write_and_check: &'static str,
    write_and_wait: &'static str,
}

impl SuiteCommands {
    fn for_os(is_windows: bool) -> Self {
        if is_windows {
            Self {
                write_and_print: "echo 'hello world' | Out-File -FilePath C:\\mnt\\test-1\\data.txt; Get-Content C:\\mnt\\test-1\\data.txt",
                write_and_check: "echo 'hello world' | Out-File -FilePath C:\\mnt\\test-1\\data.txt; if (!(Select-String -Path C:\\mnt\\test-1\\data.txt -Pattern 'hello world')) { exit 1 }",
                write_and_wait: "echo 'hello world' | Out-File -Append -FilePath C:\\mnt\\test-1\\data.txt; while ($true) { Start-Sleep 1 }",
            }
        } else {
            Self {
                write_and_print: "echo 'hello world' > /mnt/test-1/data && cat /mnt/test-1/data",
                write_and_check: "echo 'hello world' > /mnt/test-1/data && grep 'hello world' /mnt/test-1/data",
                write_and_wait: "echo 'hello world' >> /mnt/test-1/data && while true; do sleep 1; done",
            }
        }
    }
}

fn boxed<'a, S: Scenario + 'a>(scenario: S) -> Box<dyn Scenario + 'a> {
    Box::new(scenario)
}

/// Run every scenario the configured driver supports, one after another
///
/// A failing scenario does not stop the run. The pre-provisioned scenarios
/// are skipped unless an existing share is configured.
pub async fn run_suite(
    cluster: &dyn ClusterApi,
    config: &E2eConfig,
    settings: &ScenarioSettings,
) -> SuiteReport {
    let driver = config.driver.build();
    let storage_class = config.driver.storage_class_source();
    let suite = &config.suite;
    let commands = SuiteCommands::for_os(suite.windows);

    let pod = |command: &str, volumes: Vec<VolumeDetails>| {
        let pod = PodDetails::new(command, volumes);
        if suite.windows {
            pod.windows(false)
        } else {
            pod
        }
    };
    let volume = || VolumeDetails::new(suite.claim_size.clone());

    let dynamic_skip = (!driver.supports(Capability::DynamicProvision))
        .then(|| format!("driver {} cannot provision dynamically", driver.name()));

    let pre_provisioned_volume = match &suite.pre_provisioned_volume_id {
        Some(volume_id) => {
            let volume = VolumeDetails::pre_provisioned(volume_id.clone(), suite.claim_size.clone());
            match &suite.pre_provisioned_share_name {
                Some(share_name) => volume.with_share_name(share_name.clone()),
                None => volume,
            }
        }
        None => volume(),
    };
    let pre_provisioned_skip = if !driver.supports(Capability::PreProvisioned) {
        Some(format!("driver {} cannot use pre-provisioned volumes", driver.name()))
    } else if suite.pre_provisioned_volume_id.is_none() {
        Some("no pre-provisioned volume id configured".to_string())
    } else {
        None
    };

    let planned: Vec<(Box<dyn Scenario + '_>, Option<String>)> = vec![
        (
            boxed(DynamicallyProvisionedCmdVolumeTest {
                driver: &driver,
                pod: pod(commands.write_and_print, vec![volume()]),
                storage_class: storage_class.clone(),
                expected_output: Some("hello world".to_string()),
            }),
            dynamic_skip.clone(),
        ),
        (
            boxed(DynamicallyProvisionedVolumeSubpathTest {
                driver: &driver,
                pod: pod(commands.write_and_check, vec![volume()]),
                storage_class: storage_class.clone(),
            }),
            dynamic_skip.clone(),
        ),
        (
            boxed(DynamicallyProvisionedMultipleTiersTest {
                driver: &driver,
                pod: pod(commands.write_and_check, vec![volume(); settings.tiers.len()]),
            }),
            dynamic_skip.clone(),
        ),
        (
            boxed(PreProvisionedVolumeTest {
                driver: &driver,
                pod: pod(commands.write_and_print, vec![pre_provisioned_volume.clone()]),
                expected_output: Some("hello world".to_string()),
            }),
            pre_provisioned_skip.clone(),
        ),
        (
            boxed(PreProvisionedVolumeSubpathTest {
                driver: &driver,
                pod: pod(commands.write_and_check, vec![pre_provisioned_volume]),
            }),
            pre_provisioned_skip,
        ),
        (
            boxed(DynamicallyProvisionedDeploymentTest {
                driver: &driver,
                pod: pod(commands.write_and_wait, vec![volume()]),
                storage_class: storage_class.clone(),
            }),
            dynamic_skip.clone(),
        ),
        (
            boxed(DynamicallyProvisionedStatefulSetTest {
                driver: &driver,
                pod: pod(commands.write_and_wait, vec![volume()]),
                storage_class,
            }),
            dynamic_skip,
        ),
    ];

    let mut report = SuiteReport::default();
    for (scenario, skip) in planned {
        let name = scenario.name().to_string();
        let outcome = match skip {
            Some(reason) => {
                info!("skipping scenario {}: {}", name, reason);
                ScenarioOutcome::Skipped(reason)
            }
            None => match run_scenario(scenario.as_ref(), cluster, settings).await {
                Ok(()) => {
                    info!("scenario {} passed", name);
                    ScenarioOutcome::Passed
                }
                Err(e) => ScenarioOutcome::Failed(e),
            },
        };
        report.results.push(ScenarioResult { name, outcome });
    }

    info!(
        "suite finished: {} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("formatted 7".to_string())), "formatted 7");
        assert_eq!(panic_message(Box::new(7u8)), "non-string panic payload");
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = E2eConfig::default();
        config.namespace.prefix = "files-".to_string();
        config.timeouts.poll_interval_secs = 1;

        let settings = ScenarioSettings::from_config(&config);
        assert_eq!(settings.namespace_prefix, "files-");
        assert_eq!(settings.poll.interval, std::time::Duration::from_secs(1));
        assert_eq!(settings.tiers.len(), 5);
    }

    #[test]
    fn test_suite_commands_mount_first_volume() {
        let linux = SuiteCommands::for_os(false);
        assert!(linux.write_and_print.contains("/mnt/test-1/data"));
        assert!(linux.write_and_wait.starts_with("echo 'hello world' >>"));

        let windows = SuiteCommands::for_os(true);
        assert!(windows.write_and_print.contains("C:\\mnt\\test-1\\data.txt"));
    }
}
