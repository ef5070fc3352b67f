//! The task wire model.
//!
//! A task is materialized from a queue message body, mutated locally with
//! stage stamps and the queue receipt, and discarded after commit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One stage timestamp in the task's latency trace, epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageStamp {
    pub tstmp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub parent_session_id: String,
    /// Inline payload, or a size marker when the payload is externalized to
    /// the artifact store.
    #[serde(default)]
    pub task_definition: String,
    #[serde(default)]
    pub worker_arguments: Vec<String>,
    /// Queue receipt handle, attached when the message is received.
    #[serde(default)]
    pub sqs_handle_id: Option<String>,
    #[serde(default)]
    pub stats: HashMap<String, StageStamp>,
}

impl Task {
    pub fn from_message_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Record a stage timestamp (epoch ms) under the given key.
    pub fn stamp(&mut self, stage: &str, tstmp_ms: i64) {
        self.stats
            .insert(stage.to_string(), StageStamp { tstmp: tstmp_ms });
    }

    pub fn stat(&self, stage: &str) -> Option<i64> {
        self.stats.get(stage).map(|s| s.tstmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{STAGE3_ACQUIRED_FROM_QUEUE, STAGE3_ACQUIRED_IN_STORE};

    const SAMPLE_BODY: &str = r#"{
        "task_id": "bd88ea18-part007_9",
        "session_id": "bd88ea18-part007",
        "parent_session_id": "bd88ea18-part007",
        "task_definition": "passed_via_storage_size_75_bytes",
        "worker_arguments": ["1000", "1", "120"],
        "stats": {
            "stage2_sbmtlmba_02_before_batch_write_tstmp": {"tstmp": 1612276891690}
        }
    }"#;

    #[test]
    fn test_decodes_message_body() {
        let task = Task::from_message_body(SAMPLE_BODY).unwrap();
        assert_eq!(task.task_id, "bd88ea18-part007_9");
        assert_eq!(task.worker_arguments.len(), 3);
        assert_eq!(task.sqs_handle_id, None);
        assert_eq!(
            task.stat("stage2_sbmtlmba_02_before_batch_write_tstmp"),
            Some(1612276891690)
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let body = r#"{"task_id": "t", "submission_timestamp": 123}"#;
        let task = Task::from_message_body(body).unwrap();
        assert_eq!(task.task_id, "t");
        assert!(task.stats.is_empty());
    }

    #[test]
    fn test_decode_requires_task_id() {
        assert!(Task::from_message_body("{}").is_err());
    }

    #[test]
    fn test_stamp_and_stat() {
        let mut task = Task::from_message_body(SAMPLE_BODY).unwrap();
        task.stamp(STAGE3_ACQUIRED_FROM_QUEUE, 100);
        task.stamp(STAGE3_ACQUIRED_IN_STORE, 200);
        assert_eq!(task.stat(STAGE3_ACQUIRED_FROM_QUEUE), Some(100));
        assert_eq!(task.stat(STAGE3_ACQUIRED_IN_STORE), Some(200));
        assert_eq!(task.stat("missing"), None);
    }

    #[test]
    fn test_stamps_serialize_with_tstmp_shape() {
        let mut task = Task::from_message_body(r#"{"task_id": "t"}"#).unwrap();
        task.stamp(STAGE3_ACQUIRED_FROM_QUEUE, 42);
        let round = serde_json::to_value(&task).unwrap();
        assert_eq!(round["stats"][STAGE3_ACQUIRED_FROM_QUEUE]["tstmp"], 42);
    }
}
