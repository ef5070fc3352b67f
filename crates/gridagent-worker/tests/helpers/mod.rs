//! In-memory fakes of the agent's external collaborators.
//!
//! The status store reproduces the metadata store's linearizable
//! conditional-write semantics under a mutex, and supports scripted fault
//! injection for the throttling and takeover scenarios.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use gridagent_core::clock::now_sec;
use gridagent_core::constants::{OWNER_NONE, POST_AGENT_COUNTERS, PRE_AGENT_COUNTERS};
use gridagent_core::models::{StatusRow, TaskStatus};
use gridagent_core::{EventsCounter, StorageBackend};
use gridagent_db::{StatusStore, StoreError};
use gridagent_infra::{performance_tracker_initializer, PerformanceTracker};
use gridagent_storage::{ArtifactStore, StorageError, StorageResult};
use gridagent_worker::{
    CompletionCommitter, ComputeRuntime, ExecutionDriver, ExecutionVariant, InvokeResponse,
    LeaseRenewer, QueueMessage, TaskAcquirer, TaskQueue,
};

pub const POD_ID: &str = "htc-agent-test-pod";
pub const TTL_REFRESH_SEC: i64 = 0;
pub const TTL_OFFSET_SEC: i64 = 30;
pub const VISIBILITY_TIMEOUT_SEC: i32 = 600;

pub fn throttled() -> StoreError {
    StoreError::Throttled("ThrottlingException".to_string())
}

pub fn pending_row(task_id: &str) -> StatusRow {
    StatusRow {
        task_id: task_id.to_string(),
        task_status: TaskStatus::Pending,
        task_owner: OWNER_NONE.to_string(),
        heartbeat_expiration_timestamp: 0,
        retries: 0,
        sqs_handler_id: String::new(),
        task_completion_timestamp: 0,
    }
}

pub fn task_message(task_id: &str) -> QueueMessage {
    QueueMessage {
        body: format!(
            r#"{{"task_id": "{}", "task_definition": "{{\"worker_arguments\": [\"1000\", \"1\", \"120\"]}}", "stats": {{}}}}"#,
            task_id
        ),
        receipt_handle: format!("receipt-{}", task_id),
    }
}

// ---------------------------------------------------------------------------
// Status store

#[derive(Default)]
pub struct InMemoryStatusStore {
    rows: Mutex<HashMap<String, StatusRow>>,
    refresh_faults: Mutex<VecDeque<StoreError>>,
    finish_faults: Mutex<VecDeque<StoreError>>,
    pub refresh_attempts: AtomicUsize,
    pub refresh_successes: AtomicUsize,
}

impl InMemoryStatusStore {
    pub fn with_rows(rows: impl IntoIterator<Item = StatusRow>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.rows.lock().unwrap();
            for row in rows {
                map.insert(row.task_id.clone(), row);
            }
        }
        Arc::new(store)
    }

    pub fn row(&self, task_id: &str) -> Option<StatusRow> {
        self.rows.lock().unwrap().get(task_id).cloned()
    }

    /// Simulate a watchdog takeover: ownership moves away from the agent.
    pub fn steal_ownership(&self, task_id: &str, new_owner: &str) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(task_id) {
            row.task_owner = new_owner.to_string();
            row.task_status = TaskStatus::processing(new_owner);
        }
    }

    pub fn push_refresh_fault(&self, fault: StoreError) {
        self.refresh_faults.lock().unwrap().push_back(fault);
    }

    pub fn push_finish_fault(&self, fault: StoreError) {
        self.finish_faults.lock().unwrap().push_back(fault);
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn claim_task(
        &self,
        task_id: &str,
        owner: &str,
        receipt: &str,
        heartbeat_expiration: i64,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(task_id) else {
            return Err(StoreError::ConditionFailed);
        };
        if row.task_owner != OWNER_NONE || row.task_status != TaskStatus::Pending {
            return Err(StoreError::ConditionFailed);
        }
        row.task_owner = owner.to_string();
        row.task_status = TaskStatus::processing(owner);
        row.heartbeat_expiration_timestamp = heartbeat_expiration;
        row.sqs_handler_id = receipt.to_string();
        row.retries += 1;
        Ok(())
    }

    async fn refresh_heartbeat(
        &self,
        task_id: &str,
        owner: &str,
        heartbeat_expiration: i64,
    ) -> Result<(), StoreError> {
        self.refresh_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.refresh_faults.lock().unwrap().pop_front() {
            return Err(fault);
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(task_id) {
            Some(row) if row.task_owner == owner => {
                row.heartbeat_expiration_timestamp = heartbeat_expiration;
                self.refresh_successes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(StoreError::ConditionFailed),
        }
    }

    async fn mark_finished(
        &self,
        task_id: &str,
        owner: &str,
        completion_timestamp_ms: i64,
    ) -> Result<(), StoreError> {
        if let Some(fault) = self.finish_faults.lock().unwrap().pop_front() {
            return Err(fault);
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(task_id) {
            Some(row) if row.task_owner == owner => {
                row.task_status = TaskStatus::Finished;
                row.task_completion_timestamp = completion_timestamp_ms;
                Ok(())
            }
            _ => Err(StoreError::ConditionFailed),
        }
    }

    async fn read_row(&self, task_id: &str) -> Result<Option<StatusRow>, StoreError> {
        Ok(self.row(task_id))
    }
}

// ---------------------------------------------------------------------------
// Queue

#[derive(Default)]
pub struct InMemoryQueue {
    messages: Mutex<VecDeque<QueueMessage>>,
    pub deleted: Mutex<Vec<String>>,
    pub visibility_changes: Mutex<Vec<(String, i32)>>,
}

impl InMemoryQueue {
    pub fn with_messages(messages: impl IntoIterator<Item = QueueMessage>) -> Arc<Self> {
        let queue = Self::default();
        queue.messages.lock().unwrap().extend(messages);
        Arc::new(queue)
    }

    pub fn deleted_receipts(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn receive_one(&self) -> Result<Option<QueueMessage>> {
        Ok(self.messages.lock().unwrap().pop_front())
    }

    async fn change_visibility(&self, receipt_handle: &str, timeout_sec: i32) -> Result<()> {
        self.visibility_changes
            .lock()
            .unwrap()
            .push((receipt_handle.to_string(), timeout_sec));
        Ok(())
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push(receipt_handle.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Artifact store

#[derive(Default)]
pub struct RecordingArtifactStore {
    pub outputs: Mutex<HashMap<String, Vec<u8>>>,
    pub inputs: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingArtifactStore {
    pub fn output(&self, task_id: &str) -> Option<Vec<u8>> {
        self.outputs.lock().unwrap().get(task_id).cloned()
    }
}

#[async_trait]
impl ArtifactStore for RecordingArtifactStore {
    async fn put_output_from_bytes(&self, task_id: &str, data: &[u8]) -> StorageResult<()> {
        self.outputs
            .lock()
            .unwrap()
            .insert(task_id.to_string(), data.to_vec());
        Ok(())
    }

    async fn put_output_from_file(&self, task_id: &str, file: &Path) -> StorageResult<()> {
        let data = tokio::fs::read(file).await?;
        self.outputs
            .lock()
            .unwrap()
            .insert(task_id.to_string(), data);
        Ok(())
    }

    async fn get_input(&self, task_id: &str) -> StorageResult<Vec<u8>> {
        self.inputs
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(task_id.to_string()))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

// ---------------------------------------------------------------------------
// Compute runtime

#[derive(Default)]
pub struct ScriptedRuntime {
    responses: Mutex<VecDeque<InvokeResponse>>,
    pub invocations: Mutex<Vec<Vec<u8>>>,
    pub stopped: AtomicBool,
}

impl ScriptedRuntime {
    pub fn with_responses(responses: impl IntoIterator<Item = InvokeResponse>) -> Arc<Self> {
        let runtime = Self::default();
        runtime.responses.lock().unwrap().extend(responses);
        Arc::new(runtime)
    }

    pub fn payload_response(payload: &str) -> InvokeResponse {
        InvokeResponse {
            payload: payload.to_string(),
            log_tail: None,
        }
    }
}

#[async_trait]
impl ComputeRuntime for ScriptedRuntime {
    async fn invoke(&self, payload: Vec<u8>) -> Result<InvokeResponse> {
        self.invocations.lock().unwrap().push(payload);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Self::payload_response("")))
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness

pub struct Harness {
    pub queue: Arc<InMemoryQueue>,
    pub store: Arc<InMemoryStatusStore>,
    pub artifacts: Arc<RecordingArtifactStore>,
    pub runtime: Arc<ScriptedRuntime>,
    pub counters_pre: Arc<EventsCounter>,
    pub counters_post: Arc<EventsCounter>,
    pub perf_post: Arc<PerformanceTracker>,
    pub acquirer: TaskAcquirer,
    pub driver: ExecutionDriver,
    pub renewer: LeaseRenewer,
    pub committer: Arc<CompletionCommitter>,
}

impl Harness {
    pub fn new(
        queue: Arc<InMemoryQueue>,
        store: Arc<InMemoryStatusStore>,
        runtime: Arc<ScriptedRuntime>,
    ) -> Self {
        let artifacts = Arc::new(RecordingArtifactStore::default());
        let counters_pre = Arc::new(EventsCounter::new(&PRE_AGENT_COUNTERS));
        let counters_post = Arc::new(EventsCounter::new(&POST_AGENT_COUNTERS));
        let perf_pre = Arc::new(performance_tracker_initializer("0", "", ""));
        let perf_post = Arc::new(performance_tracker_initializer("0", "", ""));

        let committer = Arc::new(CompletionCommitter::new(
            store.clone(),
            queue.clone(),
            artifacts.clone(),
            counters_post.clone(),
            perf_post.clone(),
            POD_ID.to_string(),
        ));

        let driver = ExecutionDriver::new(
            ExecutionVariant::Remote(runtime.clone()),
            artifacts.clone(),
            committer.clone(),
            counters_pre.clone(),
            counters_post.clone(),
            perf_pre,
            0,
            false,
        );

        let acquirer = TaskAcquirer::new(
            queue.clone(),
            store.clone(),
            counters_pre.clone(),
            POD_ID.to_string(),
            VISIBILITY_TIMEOUT_SEC,
            TTL_REFRESH_SEC,
            TTL_OFFSET_SEC,
        );

        let renewer = LeaseRenewer::new(
            store.clone(),
            counters_post.clone(),
            perf_post.clone(),
            0,
            POD_ID.to_string(),
        );

        Self {
            queue,
            store,
            artifacts,
            runtime,
            counters_pre,
            counters_post,
            perf_post,
            acquirer,
            driver,
            renewer,
            committer,
        }
    }
}

/// Sanity anchor for heartbeat assertions.
pub fn heartbeat_is_fresh(row: &StatusRow, offset_sec: i64) -> bool {
    let remaining = row.heartbeat_expiration_timestamp - now_sec();
    remaining > 0 && remaining <= offset_sec + 1
}
