//! Per-task execution context.
//!
//! One `TaskContext` exists per claimed task and is shared by the execution
//! driver, the lease renewer, and the completion committer for the task's
//! lifetime. `execution_done` is a monotonic latch: raised once by the
//! driver, observed by the renewer to exit its loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use gridagent_core::models::Task;
use gridagent_core::TtlExpirationGenerator;

pub struct TaskContext {
    /// The claimed task; locked for stage-stamp writes and stats reads.
    pub task: Mutex<Task>,
    pub task_id: String,
    /// Queue receipt handle for the message this task came from.
    pub receipt: String,
    /// Epoch ms at which the message was taken off the queue; anchor for the
    /// end-to-end agent time measurement.
    pub acquired_at_ms: i64,
    /// Lease generator seeded by the claim; the renewer continues it.
    pub ttl: Mutex<TtlExpirationGenerator>,
    execution_done: AtomicBool,
}

impl TaskContext {
    pub fn new(
        task: Task,
        receipt: String,
        acquired_at_ms: i64,
        ttl: TtlExpirationGenerator,
    ) -> Self {
        let task_id = task.task_id.clone();
        Self {
            task: Mutex::new(task),
            task_id,
            receipt,
            acquired_at_ms,
            ttl: Mutex::new(ttl),
            execution_done: AtomicBool::new(false),
        }
    }

    pub fn mark_execution_done(&self) {
        self.execution_done.store(true, Ordering::SeqCst);
    }

    pub fn execution_done(&self) -> bool {
        self.execution_done.load(Ordering::SeqCst)
    }

    pub fn stamp(&self, stage: &str, tstmp_ms: i64) {
        self.task.lock().unwrap().stamp(stage, tstmp_ms);
    }

    /// Snapshot of the task's stage stamps for measurement submission.
    pub fn stats_snapshot(
        &self,
    ) -> std::collections::HashMap<String, gridagent_core::models::StageStamp> {
        self.task.lock().unwrap().stats.clone()
    }
}
