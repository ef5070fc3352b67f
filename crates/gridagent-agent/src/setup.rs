//! Agent assembly: build the clients, wire the lifecycle components, and
//! run the supervisor until shutdown.

use std::env;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::time::{sleep, Duration};

use gridagent_core::constants::{POST_AGENT_COUNTERS, PRE_AGENT_COUNTERS};
use gridagent_core::{AgentConfig, EventsCounter};
use gridagent_db::{DynamoStatusStore, StatusStore};
use gridagent_infra::performance_tracker_initializer;
use gridagent_storage::create_artifact_store;
use gridagent_worker::{
    spawn_shutdown_listener, CompletionCommitter, ComputeRuntime, ExecutionDriver,
    ExecutionVariant, LambdaRuntime, LeaseRenewer, SqsTaskQueue, Supervisor, TaskAcquirer,
    TaskQueue,
};

pub async fn run_agent(config: AgentConfig, pod_id: String) -> Result<()> {
    // Spread fleet cold starts so a thousand pods do not hit the queue and
    // the store in the same second.
    let startup_delay_sec = {
        let mut rng = rand::rng();
        rng.random_range(5..=15)
    };
    tracing::info!(
        pod_id = %pod_id,
        delay_sec = startup_delay_sec,
        "startup delay before connecting"
    );
    sleep(Duration::from_secs(startup_delay_sec)).await;

    let queue: Arc<dyn TaskQueue> = Arc::new(SqsTaskQueue::new(&config).await?);
    let store: Arc<dyn StatusStore> = Arc::new(DynamoStatusStore::new(&config).await);
    let artifacts = create_artifact_store(&config).await?;

    let counters_pre = Arc::new(EventsCounter::new(&PRE_AGENT_COUNTERS));
    let counters_post = Arc::new(EventsCounter::new(&POST_AGENT_COUNTERS));
    let perf_pre = Arc::new(performance_tracker_initializer(
        &config.metrics_are_enabled,
        &config.metrics_pre_agent_connection_string,
        &config.metrics_grafana_private_ip,
    ));
    let perf_post = Arc::new(performance_tracker_initializer(
        &config.metrics_are_enabled,
        &config.metrics_post_agent_connection_string,
        &config.metrics_grafana_private_ip,
    ));

    // The remote runtime is wired through the environment; without it the
    // agent runs tasks as local subprocesses.
    let runtime: Option<Arc<dyn ComputeRuntime>> = match env::var("LAMBDA_ENDPOINT_URL") {
        Ok(endpoint_url) => {
            let function_name = env::var("LAMBDA_FONCTION_NAME")
                .context("LAMBDA_FONCTION_NAME must be set when LAMBDA_ENDPOINT_URL is")?;
            Some(Arc::new(
                LambdaRuntime::new(&config, endpoint_url, function_name).await,
            ))
        }
        Err(_) => None,
    };

    let committer = Arc::new(CompletionCommitter::new(
        store.clone(),
        queue.clone(),
        artifacts.clone(),
        counters_post.clone(),
        perf_post.clone(),
        pod_id.clone(),
    ));

    let variant = match &runtime {
        Some(runtime) => ExecutionVariant::Remote(runtime.clone()),
        None => ExecutionVariant::Subprocess,
    };
    let driver = ExecutionDriver::new(
        variant,
        artifacts,
        committer,
        counters_pre.clone(),
        counters_post.clone(),
        perf_pre,
        config.work_proc_status_pull_interval_sec,
        config.external_input(),
    );

    let acquirer = TaskAcquirer::new(
        queue,
        store.clone(),
        counters_pre,
        pod_id.clone(),
        config.agent_sqs_visibility_timeout_sec,
        config.task_ttl_refresh_interval_sec,
        config.task_ttl_expiration_offset_sec,
    );

    let renewer = LeaseRenewer::new(
        store,
        counters_post,
        perf_post,
        config.work_proc_status_pull_interval_sec,
        pod_id,
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_shutdown_listener(shutdown.clone());

    let supervisor = Supervisor::new(
        acquirer,
        driver,
        renewer,
        runtime,
        config.empty_task_queue_backoff_timeout_sec,
        shutdown,
    );
    supervisor.run().await
}
