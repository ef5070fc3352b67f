//! Task acquisition.
//!
//! The conditional claim on the status row is the single synchronization
//! point of the protocol: whoever lands the `pending -> processing` write
//! owns the task. Losing the claim is normal under contention; the queue's
//! visibility timeout redelivers the message to some agent later.

use std::sync::Arc;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::time::{sleep, Duration};

use gridagent_core::clock::now_ms;
use gridagent_core::constants::{
    CTR_FAILED_TO_CLAIM, CTR_NO_MESSAGES, CTR_SUCCESSFUL_ACQUIRE, STAGE3_ACQUIRED_FROM_QUEUE,
    STAGE3_ACQUIRED_IN_STORE,
};
use gridagent_core::models::Task;
use gridagent_core::{EventsCounter, TtlExpirationGenerator};
use gridagent_db::StatusStore;

use crate::context::TaskContext;
use crate::queue::TaskQueue;

pub struct TaskAcquirer {
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn StatusStore>,
    counters_pre: Arc<EventsCounter>,
    pod_id: String,
    visibility_timeout_sec: i32,
    ttl_refresh_interval_sec: i64,
    ttl_expiration_offset_sec: i64,
}

impl TaskAcquirer {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn StatusStore>,
        counters_pre: Arc<EventsCounter>,
        pod_id: String,
        visibility_timeout_sec: i32,
        ttl_refresh_interval_sec: i64,
        ttl_expiration_offset_sec: i64,
    ) -> Self {
        Self {
            queue,
            store,
            counters_pre,
            pod_id,
            visibility_timeout_sec,
            ttl_refresh_interval_sec,
            ttl_expiration_offset_sec,
        }
    }

    /// Pull one message and try to claim its task. `None` means no work this
    /// iteration: empty queue, lost claim, or cancelled task.
    pub async fn try_acquire(&self) -> Result<Option<TaskContext>> {
        tracing::debug!("waiting for queue message");
        let Some(message) = self.queue.receive_one().await? else {
            self.counters_pre.increment(CTR_NO_MESSAGES);
            return Ok(None);
        };

        let picked_up_from_queue_ms = now_ms();

        let mut task =
            Task::from_message_body(&message.body).context("failed to decode task message")?;
        task.sqs_handle_id = Some(message.receipt_handle.clone());
        tracing::info!(task_id = %task.task_id, "received task from queue");

        let mut ttl = TtlExpirationGenerator::new(
            self.ttl_refresh_interval_sec,
            self.ttl_expiration_offset_sec,
        );
        let heartbeat_expiration = ttl.generate_next_ttl();

        let claim = self
            .store
            .claim_task(
                &task.task_id,
                &self.pod_id,
                &message.receipt_handle,
                heartbeat_expiration,
            )
            .await;

        match claim {
            Ok(()) => {}
            Err(e) if e.is_condition_failed() => {
                self.counters_pre.increment(CTR_FAILED_TO_CLAIM);

                if self.task_has_been_cancelled(&task.task_id).await? {
                    tracing::info!(
                        task_id = %task.task_id,
                        "task has already been cancelled, deleting message"
                    );
                    self.queue.delete_message(&message.receipt_handle).await?;
                    return Ok(None);
                }

                // Small randomized sleep so two agents racing on the same
                // redelivered message do not re-poll in lockstep.
                let pause = {
                    let mut rng = rand::rng();
                    rng.random_range(1..=3)
                };
                tracing::info!(
                    task_id = %task.task_id,
                    pause_sec = pause,
                    "claim lost to another owner, releasing message"
                );
                sleep(Duration::from_secs(pause)).await;
                return Ok(None);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    task_id = %task.task_id,
                    "releasing message after failed acquisition"
                );
                return Err(e.into());
            }
        }

        self.queue
            .change_visibility(&message.receipt_handle, self.visibility_timeout_sec)
            .await?;

        task.stamp(STAGE3_ACQUIRED_FROM_QUEUE, picked_up_from_queue_ms);
        task.stamp(STAGE3_ACQUIRED_IN_STORE, now_ms());
        self.counters_pre.increment(CTR_SUCCESSFUL_ACQUIRE);
        tracing::info!(task_id = %task.task_id, owner = %self.pod_id, "task acquired");

        Ok(Some(TaskContext::new(
            task,
            message.receipt_handle,
            picked_up_from_queue_ms,
            ttl,
        )))
    }

    /// A claim can fail because the client cancelled the task before any
    /// agent picked it up; such a message will never become runnable.
    async fn task_has_been_cancelled(&self, task_id: &str) -> Result<bool> {
        let row = self.store.read_row(task_id).await?;
        tracing::debug!(task_id = %task_id, row = ?row, "cancellation probe");
        Ok(row.map(|r| r.task_status.is_cancelled()).unwrap_or(false))
    }
}
