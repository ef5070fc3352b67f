//! Conditional operations on the task-status table.
//!
//! The table is keyed by `task_id`. A claim requires the row to be
//! unowned and pending; every later write by the owner carries the
//! `task_owner = self` predicate, so a watchdog takeover makes this agent's
//! subsequent writes fail with a condition violation instead of clobbering
//! the new owner.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

use gridagent_core::constants::OWNER_NONE;
use gridagent_core::models::{StatusRow, TaskStatus};
use gridagent_core::AgentConfig;

use crate::error::{StoreError, CONDITION_FAILED_CODE, THROTTLING_CODES};

/// Seam the lifecycle engine talks through; the production implementation
/// is [`DynamoStatusStore`].
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Atomically transfer ownership of a pending, unowned row to `owner`.
    /// Sets `task_status = processing-<owner>`, records the queue receipt,
    /// writes the heartbeat expiration, and increments `retries`.
    async fn claim_task(
        &self,
        task_id: &str,
        owner: &str,
        receipt: &str,
        heartbeat_expiration: i64,
    ) -> Result<(), StoreError>;

    /// Extend the lease of a row this agent owns.
    async fn refresh_heartbeat(
        &self,
        task_id: &str,
        owner: &str,
        heartbeat_expiration: i64,
    ) -> Result<(), StoreError>;

    /// Transition an owned row to `finished` with the completion timestamp
    /// (epoch ms).
    async fn mark_finished(
        &self,
        task_id: &str,
        owner: &str,
        completion_timestamp_ms: i64,
    ) -> Result<(), StoreError>;

    /// Point read of the row, if it exists.
    async fn read_row(&self, task_id: &str) -> Result<Option<StatusRow>, StoreError>;
}

/// Retry profile applied to a store call. Claims always use the standard
/// profile; renew and finish switch to the adaptive profile when congestion
/// control is enabled, letting the SDK pace the agent fleet under
/// provisioned-capacity pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryProfile {
    Standard,
    Adaptive,
}

pub struct DynamoStatusStore {
    standard: Client,
    adaptive: Client,
    table: String,
    use_congestion_control: bool,
}

impl DynamoStatusStore {
    pub async fn new(config: &AgentConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let standard_conf = aws_sdk_dynamodb::config::Builder::from(&shared)
            .retry_config(RetryConfig::standard().with_max_attempts(5))
            .build();
        let adaptive_conf = aws_sdk_dynamodb::config::Builder::from(&shared)
            .retry_config(
                RetryConfig::standard()
                    .with_max_attempts(10)
                    .with_retry_mode(RetryMode::Adaptive),
            )
            .build();

        Self {
            standard: Client::from_conf(standard_conf),
            adaptive: Client::from_conf(adaptive_conf),
            table: config.ddb_status_table.clone(),
            use_congestion_control: config.agent_use_congestion_control,
        }
    }

    fn client_for(&self, profile: RetryProfile) -> &Client {
        match profile {
            RetryProfile::Standard => &self.standard,
            RetryProfile::Adaptive if self.use_congestion_control => &self.adaptive,
            RetryProfile::Adaptive => &self.standard,
        }
    }
}

/// Map an SDK error onto the store taxonomy via its error-code metadata.
fn classify<E>(err: E) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    match code.as_deref() {
        Some(CONDITION_FAILED_CODE) => StoreError::ConditionFailed,
        Some(code) if THROTTLING_CODES.contains(&code) => StoreError::Throttled(code.to_string()),
        _ => StoreError::Other(Box::new(err)),
    }
}

fn item_str(item: &HashMap<String, AttributeValue>, name: &str) -> Option<String> {
    item.get(name).and_then(|v| v.as_s().ok()).cloned()
}

fn item_num(item: &HashMap<String, AttributeValue>, name: &str) -> Result<i64, StoreError> {
    match item.get(name) {
        None => Ok(0),
        Some(v) => v
            .as_n()
            .ok()
            .and_then(|n| n.parse::<i64>().ok())
            .ok_or_else(|| StoreError::Malformed(format!("non-numeric attribute {}", name))),
    }
}

pub(crate) fn parse_status_row(
    item: &HashMap<String, AttributeValue>,
) -> Result<StatusRow, StoreError> {
    let task_id = item_str(item, "task_id")
        .ok_or_else(|| StoreError::Malformed("missing task_id".to_string()))?;
    let status_raw = item_str(item, "task_status")
        .ok_or_else(|| StoreError::Malformed("missing task_status".to_string()))?;
    let task_status = TaskStatus::from_str(&status_raw)
        .map_err(|e| StoreError::Malformed(e.to_string()))?;

    Ok(StatusRow {
        task_id,
        task_status,
        task_owner: item_str(item, "task_owner").unwrap_or_else(|| OWNER_NONE.to_string()),
        heartbeat_expiration_timestamp: item_num(item, "heartbeat_expiration_timestamp")?,
        retries: item_num(item, "retries")?,
        sqs_handler_id: item_str(item, "sqs_handler_id").unwrap_or_default(),
        task_completion_timestamp: item_num(item, "task_completion_timestamp")?,
    })
}

#[async_trait]
impl StatusStore for DynamoStatusStore {
    #[tracing::instrument(skip(self, receipt), fields(table = %self.table))]
    async fn claim_task(
        &self,
        task_id: &str,
        owner: &str,
        receipt: &str,
        heartbeat_expiration: i64,
    ) -> Result<(), StoreError> {
        self.client_for(RetryProfile::Standard)
            .update_item()
            .table_name(&self.table)
            .key("task_id", AttributeValue::S(task_id.to_string()))
            .condition_expression("task_owner = :owner_none AND task_status = :pending")
            .update_expression(
                "SET task_status = :status, task_owner = :owner, \
                 heartbeat_expiration_timestamp = :expiration, \
                 sqs_handler_id = :receipt ADD retries :one",
            )
            .expression_attribute_values(":owner_none", AttributeValue::S(OWNER_NONE.to_string()))
            .expression_attribute_values(
                ":pending",
                AttributeValue::S(TaskStatus::Pending.to_string()),
            )
            .expression_attribute_values(
                ":status",
                AttributeValue::S(TaskStatus::processing(owner).to_string()),
            )
            .expression_attribute_values(":owner", AttributeValue::S(owner.to_string()))
            .expression_attribute_values(
                ":expiration",
                AttributeValue::N(heartbeat_expiration.to_string()),
            )
            .expression_attribute_values(":receipt", AttributeValue::S(receipt.to_string()))
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn refresh_heartbeat(
        &self,
        task_id: &str,
        owner: &str,
        heartbeat_expiration: i64,
    ) -> Result<(), StoreError> {
        self.client_for(RetryProfile::Adaptive)
            .update_item()
            .table_name(&self.table)
            .key("task_id", AttributeValue::S(task_id.to_string()))
            .condition_expression("task_owner = :owner")
            .update_expression("SET heartbeat_expiration_timestamp = :expiration")
            .expression_attribute_values(":owner", AttributeValue::S(owner.to_string()))
            .expression_attribute_values(
                ":expiration",
                AttributeValue::N(heartbeat_expiration.to_string()),
            )
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn mark_finished(
        &self,
        task_id: &str,
        owner: &str,
        completion_timestamp_ms: i64,
    ) -> Result<(), StoreError> {
        self.client_for(RetryProfile::Adaptive)
            .update_item()
            .table_name(&self.table)
            .key("task_id", AttributeValue::S(task_id.to_string()))
            .condition_expression("task_owner = :owner")
            .update_expression(
                "SET task_status = :finished, task_completion_timestamp = :completed",
            )
            .expression_attribute_values(":owner", AttributeValue::S(owner.to_string()))
            .expression_attribute_values(
                ":finished",
                AttributeValue::S(TaskStatus::Finished.to_string()),
            )
            .expression_attribute_values(
                ":completed",
                AttributeValue::N(completion_timestamp_ms.to_string()),
            )
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn read_row(&self, task_id: &str) -> Result<Option<StatusRow>, StoreError> {
        let output = self
            .client_for(RetryProfile::Standard)
            .get_item()
            .table_name(&self.table)
            .key("task_id", AttributeValue::S(task_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(classify)?;

        match output.item() {
            Some(item) => Ok(Some(parse_status_row(item)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> HashMap<String, AttributeValue> {
        HashMap::from([
            (
                "task_id".to_string(),
                AttributeValue::S("t-1".to_string()),
            ),
            (
                "task_status".to_string(),
                AttributeValue::S("processing-pod-3".to_string()),
            ),
            (
                "task_owner".to_string(),
                AttributeValue::S("pod-3".to_string()),
            ),
            (
                "heartbeat_expiration_timestamp".to_string(),
                AttributeValue::N("1612277256".to_string()),
            ),
            ("retries".to_string(), AttributeValue::N("1".to_string())),
            (
                "sqs_handler_id".to_string(),
                AttributeValue::S("AQEB19gk".to_string()),
            ),
            (
                "task_completion_timestamp".to_string(),
                AttributeValue::N("0".to_string()),
            ),
        ])
    }

    #[test]
    fn test_parse_full_row() {
        let row = parse_status_row(&sample_item()).unwrap();
        assert_eq!(row.task_id, "t-1");
        assert_eq!(row.task_status, TaskStatus::processing("pod-3"));
        assert_eq!(row.task_owner, "pod-3");
        assert_eq!(row.heartbeat_expiration_timestamp, 1612277256);
        assert_eq!(row.retries, 1);
        assert_eq!(row.sqs_handler_id, "AQEB19gk");
        assert_eq!(row.task_completion_timestamp, 0);
    }

    #[test]
    fn test_parse_defaults_optional_attributes() {
        let item = HashMap::from([
            ("task_id".to_string(), AttributeValue::S("t-2".to_string())),
            (
                "task_status".to_string(),
                AttributeValue::S("pending".to_string()),
            ),
        ]);
        let row = parse_status_row(&item).unwrap();
        assert_eq!(row.task_owner, OWNER_NONE);
        assert_eq!(row.retries, 0);
        assert_eq!(row.sqs_handler_id, "");
    }

    #[test]
    fn test_parse_rejects_missing_status() {
        let item = HashMap::from([(
            "task_id".to_string(),
            AttributeValue::S("t-3".to_string()),
        )]);
        let err = parse_status_row(&item).unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_status_string() {
        let mut item = sample_item();
        item.insert(
            "task_status".to_string(),
            AttributeValue::S("exploded".to_string()),
        );
        assert!(parse_status_row(&item).is_err());
    }
}
