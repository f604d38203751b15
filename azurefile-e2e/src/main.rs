use azurefile_e2e::{run_suite, E2eConfig, K8sClient, ScenarioOutcome, ScenarioSettings};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::args().any(|arg| arg == "--sample-config") {
        print!("{}", E2eConfig::generate_sample());
        return ExitCode::SUCCESS;
    }

    // Load configuration
    let config = match E2eConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging, the guard flushes the log file on exit
    let _log_guard = match config.logging.init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = match K8sClient::connect(&config.kubernetes).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to the cluster: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        api_server = %client.api_server(),
        driver = %config.driver.name,
        "Starting e2e suite"
    );

    let settings = ScenarioSettings::from_config(&config);
    let report = run_suite(&client, &config, &settings).await;

    for result in &report.results {
        match &result.outcome {
            ScenarioOutcome::Passed => info!("PASS {}", result.name),
            ScenarioOutcome::Skipped(reason) => warn!("SKIP {}: {}", result.name, reason),
            ScenarioOutcome::Failed(e) => error!("FAIL {} ({:?}): {}", result.name, e.kind(), e),
        }
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
