mod setup;

use std::env;
use std::process::ExitCode;

use gridagent_core::constants::DEFAULT_POD_ID;
use gridagent_core::AgentConfig;
use gridagent_infra::init_telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let pod_id = env::var("MY_POD_NAME").unwrap_or_else(|_| DEFAULT_POD_ID.to_string());

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load agent config: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = init_telemetry(config.xray_enabled()) {
        eprintln!("failed to initialize telemetry: {}", e);
        return ExitCode::from(1);
    }

    match setup::run_agent(config, pod_id.clone()).await {
        Ok(()) => {
            tracing::info!(pod_id = %pod_id, "agent stopped gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = ?e, pod_id = %pod_id, "agent event loop failed");
            ExitCode::from(1)
        }
    }
}
