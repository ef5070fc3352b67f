//! The shared status row and its wire-level status strings.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Task status as stored in the metadata table.
///
/// `Processing` and `Cancelled` carry a suffix on the wire
/// (`processing-<owner>`, `cancelled-<reason>`); a claim always writes the
/// claiming pod's id as the processing suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing(String),
    Finished,
    Cancelled(String),
    Failed,
}

impl TaskStatus {
    pub fn processing(owner: &str) -> Self {
        TaskStatus::Processing(owner.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskStatus::Cancelled(_))
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing(suffix) => write!(f, "processing-{}", suffix),
            TaskStatus::Finished => write!(f, "finished"),
            TaskStatus::Cancelled(suffix) if suffix.is_empty() => write!(f, "cancelled"),
            TaskStatus::Cancelled(suffix) => write!(f, "cancelled-{}", suffix),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "finished" => Ok(TaskStatus::Finished),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled(String::new())),
            _ => {
                if let Some(suffix) = s.strip_prefix("processing-") {
                    Ok(TaskStatus::Processing(suffix.to_string()))
                } else if let Some(suffix) = s.strip_prefix("cancelled-") {
                    Ok(TaskStatus::Cancelled(suffix.to_string()))
                } else {
                    Err(anyhow::anyhow!("Invalid task status: {}", s))
                }
            }
        }
    }
}

/// The ownership record shared between agents and the watchdog, keyed by
/// `task_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRow {
    pub task_id: String,
    pub task_status: TaskStatus,
    /// Owning pod id, or `OWNER_NONE`.
    pub task_owner: String,
    /// Epoch second after which ownership lapses.
    pub heartbeat_expiration_timestamp: i64,
    pub retries: i64,
    pub sqs_handler_id: String,
    /// Epoch ms; 0 until the task finishes.
    pub task_completion_timestamp: i64,
}
