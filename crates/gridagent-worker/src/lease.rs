//! Lease renewal.
//!
//! While the execution body runs, this loop keeps the status row's
//! heartbeat expiration ahead of wall clock. Losing the lease is not fatal
//! to the agent: the watchdog reclaims the task and the completion write's
//! ownership predicate turns the loss into a skipped queue delete.

use std::sync::Arc;

use tokio::time::{sleep, Duration};

use gridagent_core::clock::now_ms;
use gridagent_core::constants::CTR_UPDATE_TTL_FAILED;
use gridagent_core::EventsCounter;
use gridagent_db::StatusStore;
use gridagent_infra::PerformanceTracker;

use crate::commit::submit_post_agent_measurements;
use crate::context::TaskContext;

pub struct LeaseRenewer {
    store: Arc<dyn StatusStore>,
    counters_post: Arc<EventsCounter>,
    perf_post: Arc<PerformanceTracker>,
    pull_interval_sec: u64,
    pod_id: String,
}

impl LeaseRenewer {
    pub fn new(
        store: Arc<dyn StatusStore>,
        counters_post: Arc<EventsCounter>,
        perf_post: Arc<PerformanceTracker>,
        pull_interval_sec: u64,
        pod_id: String,
    ) -> Self {
        Self {
            store,
            counters_post,
            perf_post,
            pull_interval_sec,
            pod_id,
        }
    }

    /// Renew until the execution latch is raised. Returns false when the
    /// lease could not be extended; the task then belongs to the watchdog.
    pub async fn run(&self, ctx: &TaskContext) -> bool {
        tracing::debug!(task_id = %ctx.task_id, "lease renewal loop started");
        while !ctx.execution_done() {
            if !self.update_ttl_if_required(ctx).await {
                self.counters_post.increment(CTR_UPDATE_TTL_FAILED);
                tracing::warn!(
                    task_id = %ctx.task_id,
                    "could not extend heartbeat expiration, lease lost"
                );
                submit_post_agent_measurements(&self.perf_post, &self.counters_post, ctx).await;
                return false;
            }
            sleep(Duration::from_secs(self.pull_interval_sec)).await;
        }
        true
    }

    /// Refresh the heartbeat when due. Throttling retries forever and
    /// regenerates the TTL on each attempt, so a renewal delayed by N
    /// seconds of pushback still lands a lease that outlives the next
    /// planned refresh.
    async fn update_ttl_if_required(&self, ctx: &TaskContext) -> bool {
        let due = ctx
            .ttl
            .lock()
            .unwrap()
            .refresh_due(self.pull_interval_sec as i64);
        if !due {
            return true;
        }

        tracing::debug!(task_id = %ctx.task_id, "extending heartbeat expiration");
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let heartbeat_expiration = ctx.ttl.lock().unwrap().generate_next_ttl();
            let started_ms = now_ms();

            match self
                .store
                .refresh_heartbeat(&ctx.task_id, &self.pod_id, heartbeat_expiration)
                .await
            {
                Ok(()) => return true,
                Err(e) if e.is_throttled() => {
                    tracing::warn!(
                        task_id = %ctx.task_id,
                        attempt = attempt,
                        elapsed_ms = now_ms() - started_ms,
                        "heartbeat refresh throttled"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        task_id = %ctx.task_id,
                        "heartbeat refresh failed"
                    );
                    return false;
                }
            }
        }
    }
}
