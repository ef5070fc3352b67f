//! Completion commit.
//!
//! Ordering is load-bearing: the stdout artifact is persisted first, the
//! conditional finish write second, and the queue delete last, and only
//! after the finish write succeeded. Deleting the message when the store
//! refused the completion would strand the task: redelivery plus the lease
//! handoff are what make execution at-least-once.

use std::sync::Arc;

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use gridagent_core::clock::now_ms;
use gridagent_core::constants::{
    CTR_AGENT_TOTAL_TIME_MS, CTR_SET_FINISHED_FAILED, CTR_SET_FINISHED_SUCCEEDED, CTR_STR_POD_ID,
    STAGE3_ACQUIRED_IN_STORE, STAGE4_STDOUT_DELIVERED,
};
use gridagent_core::EventsCounter;
use gridagent_db::StatusStore;
use gridagent_infra::PerformanceTracker;
use gridagent_storage::ArtifactStore;

use crate::context::TaskContext;
use crate::execute::StdoutSource;
use crate::queue::TaskQueue;

pub struct CompletionCommitter {
    store: Arc<dyn StatusStore>,
    queue: Arc<dyn TaskQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    counters_post: Arc<EventsCounter>,
    perf_post: Arc<PerformanceTracker>,
    pod_id: String,
}

impl CompletionCommitter {
    pub fn new(
        store: Arc<dyn StatusStore>,
        queue: Arc<dyn TaskQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        counters_post: Arc<EventsCounter>,
        perf_post: Arc<PerformanceTracker>,
        pod_id: String,
    ) -> Self {
        Self {
            store,
            queue,
            artifacts,
            counters_post,
            perf_post,
            pod_id,
        }
    }

    pub async fn commit(&self, ctx: &TaskContext, stdout: StdoutSource) -> Result<()> {
        match &stdout {
            StdoutSource::Inline(payload) => {
                let encoded = BASE64.encode(payload.as_bytes());
                self.artifacts
                    .put_output_from_bytes(&ctx.task_id, encoded.as_bytes())
                    .await?;
            }
            StdoutSource::File(path) => {
                self.artifacts
                    .put_output_from_file(&ctx.task_id, path)
                    .await?;
            }
        }
        ctx.stamp(STAGE4_STDOUT_DELIVERED, now_ms());

        let finished = self.mark_finished_with_retry(ctx).await?;

        if finished {
            self.counters_post.increment(CTR_SET_FINISHED_SUCCEEDED);
            tracing::info!(
                task_id = %ctx.task_id,
                "task marked finished in store, deleting queue message"
            );
            self.queue.delete_message(&ctx.receipt).await?;
        } else {
            // The watchdog reclaimed the task; whoever owns it now will run
            // it again off the redelivered message. Keep the message.
            self.counters_post.increment(CTR_SET_FINISHED_FAILED);
            tracing::info!(task_id = %ctx.task_id, "could not set completion time to finished");
        }

        let total_ms = now_ms() - ctx.acquired_at_ms;
        tracing::info!(task_id = %ctx.task_id, total_ms = total_ms, "agent iteration complete");
        self.counters_post
            .increment_by(CTR_AGENT_TOTAL_TIME_MS, total_ms);
        self.counters_post.set_label(CTR_STR_POD_ID, &self.pod_id);

        submit_post_agent_measurements(&self.perf_post, &self.counters_post, ctx).await;
        Ok(())
    }

    /// Conditional finish write, retried indefinitely across throttling.
    /// A condition violation means the watchdog took the task over.
    async fn mark_finished_with_retry(&self, ctx: &TaskContext) -> Result<bool> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started_ms = now_ms();
            match self
                .store
                .mark_finished(&ctx.task_id, &self.pod_id, now_ms())
                .await
            {
                Ok(()) => return Ok(true),
                Err(e) if e.is_throttled() => {
                    tracing::warn!(
                        task_id = %ctx.task_id,
                        attempt = attempt,
                        elapsed_ms = now_ms() - started_ms,
                        "finish write throttled"
                    );
                    continue;
                }
                Err(e) if e.is_condition_failed() => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Submit the post-agent measurement window (store claim to artifact
/// delivery). Also invoked by the lease renewer when the lease is lost.
pub(crate) async fn submit_post_agent_measurements(
    perf_post: &PerformanceTracker,
    counters_post: &EventsCounter,
    ctx: &TaskContext,
) {
    perf_post.add_metric_sample(
        &ctx.stats_snapshot(),
        counters_post,
        STAGE3_ACQUIRED_IN_STORE,
        STAGE4_STDOUT_DELIVERED,
    );
    perf_post.submit_measurements().await;
}
