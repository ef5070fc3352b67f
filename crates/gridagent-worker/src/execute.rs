//! Execution driver.
//!
//! Runs the claimed task to completion, either as a local subprocess or as
//! one synchronous invocation of the remote function runtime, then hands
//! the result to the completion committer. The driver shares the task slot
//! with the lease renewer: both variants suspend at least once per pull
//! interval so the renewer can land heartbeat updates.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::{sleep, Duration};

use gridagent_core::clock::now_ms;
use gridagent_core::constants::{
    BOOTSTRAP_FAILURE_MARKER, COMPUTE_ENGINE_BIN, CTR_BOOTSTRAP_FAILURE, CTR_TASK_EXEC_TIME_MS,
    CTR_USER_CODE_RET_CODE_FAILED, STAGE2_SUBMITTER_BEFORE_BATCH_WRITE, STAGE3_ACQUIRED_IN_STORE,
    STAGE4_USER_CODE_FINISHED,
};
use gridagent_core::EventsCounter;
use gridagent_infra::PerformanceTracker;
use gridagent_storage::ArtifactStore;

use crate::commit::CompletionCommitter;
use crate::context::TaskContext;
use crate::runtime::ComputeRuntime;

/// Where the committed stdout artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutSource {
    /// Subprocess variant: the redirected stdout file.
    File(PathBuf),
    /// Remote variant: the decoded response payload.
    Inline(String),
}

/// Which execution body this deployment runs.
pub enum ExecutionVariant {
    Subprocess,
    Remote(Arc<dyn ComputeRuntime>),
}

/// The task definition document carried by the payload.
#[derive(Debug, Deserialize)]
struct TaskDefinition {
    #[serde(default)]
    worker_arguments: Vec<String>,
}

pub struct ExecutionDriver {
    variant: ExecutionVariant,
    artifacts: Arc<dyn ArtifactStore>,
    committer: Arc<CompletionCommitter>,
    counters_pre: Arc<EventsCounter>,
    counters_post: Arc<EventsCounter>,
    perf_pre: Arc<PerformanceTracker>,
    pull_interval: Duration,
    external_input: bool,
}

impl ExecutionDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        variant: ExecutionVariant,
        artifacts: Arc<dyn ArtifactStore>,
        committer: Arc<CompletionCommitter>,
        counters_pre: Arc<EventsCounter>,
        counters_post: Arc<EventsCounter>,
        perf_pre: Arc<PerformanceTracker>,
        pull_interval_sec: u64,
        external_input: bool,
    ) -> Self {
        Self {
            variant,
            artifacts,
            committer,
            counters_pre,
            counters_post,
            perf_pre,
            pull_interval: Duration::from_secs(pull_interval_sec),
            external_input,
        }
    }

    pub async fn run(&self, ctx: &TaskContext) -> Result<()> {
        tracing::info!(task_id = %ctx.task_id, "running task");

        let payload = self.prepare_execution_payload(ctx).await?;
        let task_def: serde_json::Value =
            serde_json::from_slice(&payload).context("task definition is not valid JSON")?;

        self.submit_pre_agent_measurements(ctx).await;

        match &self.variant {
            ExecutionVariant::Subprocess => self.run_subprocess(ctx, &task_def).await,
            ExecutionVariant::Remote(runtime) => self.run_remote(ctx, runtime, &task_def).await,
        }
    }

    /// Resolve the payload bytes: inline from the message, or fetched from
    /// the artifact store when the submitter externalized it.
    async fn prepare_execution_payload(&self, ctx: &TaskContext) -> Result<Vec<u8>> {
        if self.external_input {
            let stored = self.artifacts.get_input(&ctx.task_id).await?;
            let decoded = BASE64
                .decode(&stored)
                .context("externalized payload is not valid base64")?;
            Ok(decoded)
        } else {
            Ok(ctx.task.lock().unwrap().task_definition.clone().into_bytes())
        }
    }

    async fn run_subprocess(&self, ctx: &TaskContext, task_def: &serde_json::Value) -> Result<()> {
        let definition: TaskDefinition =
            serde_json::from_value(task_def.clone()).context("malformed task definition")?;
        if definition.worker_arguments.len() < 3 {
            bail!(
                "task definition carries {} worker arguments, need 3",
                definition.worker_arguments.len()
            );
        }

        let fname_stdout = PathBuf::from(format!("./stdout-{}.log", ctx.task_id));
        let fname_stderr = PathBuf::from(format!("./stderr-{}.log", ctx.task_id));
        let f_stdout = std::fs::File::create(&fname_stdout)
            .with_context(|| format!("cannot create {}", fname_stdout.display()))?;
        let f_stderr = std::fs::File::create(&fname_stderr)
            .with_context(|| format!("cannot create {}", fname_stderr.display()))?;

        let mut child = Command::new(COMPUTE_ENGINE_BIN)
            .args(&definition.worker_arguments[0..3])
            .stdout(Stdio::from(f_stdout))
            .stderr(Stdio::from(f_stderr))
            .spawn()
            .with_context(|| format!("failed to spawn {}", COMPUTE_ENGINE_BIN))?;

        let status = loop {
            match child.try_wait().context("subprocess wait failed")? {
                Some(status) => break status,
                None => sleep(self.pull_interval).await,
            }
        };

        ctx.mark_execution_done();
        ctx.stamp(STAGE4_USER_CODE_FINISHED, now_ms());
        tracing::info!(
            task_id = %ctx.task_id,
            retcode = ?status.code(),
            "user code finished"
        );
        if !status.success() {
            self.counters_post.increment(CTR_USER_CODE_RET_CODE_FAILED);
        }

        self.committer
            .commit(ctx, StdoutSource::File(fname_stdout))
            .await
    }

    async fn run_remote(
        &self,
        ctx: &TaskContext,
        runtime: &Arc<dyn ComputeRuntime>,
        task_def: &serde_json::Value,
    ) -> Result<()> {
        let t_start_ms = now_ms();
        let payload = serde_json::to_vec(task_def).context("cannot serialize task definition")?;

        let response = runtime.invoke(payload).await?;
        ctx.mark_execution_done();

        if let Some(log_tail) = &response.log_tail {
            tracing::info!(task_id = %ctx.task_id, logs = %log_tail, "invocation log tail");
        }

        if response.payload.contains(BOOTSTRAP_FAILURE_MARKER) {
            // No commit: the lease will lapse, the watchdog reclaims, and
            // the queue redelivers to a healthy pod.
            self.counters_post.increment(CTR_BOOTSTRAP_FAILURE);
            tracing::warn!(task_id = %ctx.task_id, "runtime bootstrap failure");
            return Ok(());
        }

        self.counters_post
            .increment_by(CTR_TASK_EXEC_TIME_MS, now_ms() - t_start_ms);
        ctx.stamp(STAGE4_USER_CODE_FINISHED, now_ms());

        self.committer
            .commit(ctx, StdoutSource::Inline(response.payload))
            .await
    }

    /// Submit the pre-agent measurement window (submission pipeline to
    /// store claim).
    async fn submit_pre_agent_measurements(&self, ctx: &TaskContext) {
        self.perf_pre.add_metric_sample(
            &ctx.stats_snapshot(),
            &self.counters_pre,
            STAGE2_SUBMITTER_BEFORE_BATCH_WRITE,
            STAGE3_ACQUIRED_IN_STORE,
        );
        self.perf_pre.submit_measurements().await;
    }
}
