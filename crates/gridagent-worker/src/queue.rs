//! Task queue access.
//!
//! The queue delivers at-least-once; a message stays invisible to other
//! agents for its visibility window and reappears unless deleted. Deletion
//! and visibility extension both require the receipt handle issued with the
//! received message.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;

use gridagent_core::AgentConfig;

/// Long-poll wait applied to every receive.
const RECEIVE_WAIT_TIME_SEC: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: String,
    pub receipt_handle: String,
}

/// Seam the acquirer and committer talk through; the production
/// implementation is [`SqsTaskQueue`].
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Long-poll for at most one message.
    async fn receive_one(&self) -> Result<Option<QueueMessage>>;

    /// Extend how long the received message stays invisible to other agents.
    async fn change_visibility(&self, receipt_handle: &str, timeout_sec: i32) -> Result<()>;

    /// Remove the message permanently. Only called once the task outcome is
    /// recorded (or the task is known to be cancelled).
    async fn delete_message(&self, receipt_handle: &str) -> Result<()>;
}

pub struct SqsTaskQueue {
    client: Client,
    queue_url: String,
}

impl SqsTaskQueue {
    pub async fn new(config: &AgentConfig) -> Result<Self> {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let conf = aws_sdk_sqs::config::Builder::from(&shared)
            .endpoint_url(&config.sqs_endpoint)
            .build();
        let client = Client::from_conf(conf);

        let queue_url = client
            .get_queue_url()
            .queue_name(&config.sqs_queue)
            .send()
            .await
            .with_context(|| format!("failed to resolve queue {}", config.sqs_queue))?
            .queue_url()
            .context("queue url missing from response")?
            .to_string();

        Ok(Self { client, queue_url })
    }
}

#[async_trait]
impl TaskQueue for SqsTaskQueue {
    async fn receive_one(&self) -> Result<Option<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(RECEIVE_WAIT_TIME_SEC)
            .send()
            .await
            .context("queue receive failed")?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };

        let body = message.body().context("queue message without body")?;
        let receipt_handle = message
            .receipt_handle()
            .context("queue message without receipt handle")?;

        Ok(Some(QueueMessage {
            body: body.to_string(),
            receipt_handle: receipt_handle.to_string(),
        }))
    }

    async fn change_visibility(&self, receipt_handle: &str, timeout_sec: i32) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(timeout_sec)
            .send()
            .await
            .context("visibility change failed")?;
        Ok(())
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .context("queue delete failed")?;
        Ok(())
    }
}
