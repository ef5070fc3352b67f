//! Remote function runtime access.
//!
//! The remote-invoke execution variant submits the serialized task
//! definition as one synchronous request-response invocation. At shutdown
//! the agent posts a best-effort stop request to the runtime endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{InvocationType, LogType};
use aws_sdk_lambda::Client;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use gridagent_core::AgentConfig;

/// Function invocations run as long as the user code does; the HTTP timeout
/// must not cut them short.
const INVOKE_TIMEOUT_SEC: u64 = 2000;

#[derive(Debug, Clone)]
pub struct InvokeResponse {
    /// Decoded response payload.
    pub payload: String,
    /// Tail of the invocation log, when the runtime returned one.
    pub log_tail: Option<String>,
}

/// Seam the execution driver and supervisor talk through; the production
/// implementation is [`LambdaRuntime`].
#[async_trait]
pub trait ComputeRuntime: Send + Sync {
    async fn invoke(&self, payload: Vec<u8>) -> Result<InvokeResponse>;

    /// Ask the runtime to stop; issued once after the main loop exits.
    async fn stop(&self) -> Result<()>;
}

pub struct LambdaRuntime {
    client: Client,
    function_name: String,
    endpoint_url: String,
    http: reqwest::Client,
}

impl LambdaRuntime {
    pub async fn new(config: &AgentConfig, endpoint_url: String, function_name: String) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let timeout = TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(INVOKE_TIMEOUT_SEC))
            .operation_timeout(Duration::from_secs(INVOKE_TIMEOUT_SEC))
            .build();

        let conf = aws_sdk_lambda::config::Builder::from(&shared)
            .endpoint_url(&endpoint_url)
            .retry_config(RetryConfig::standard().with_max_attempts(3))
            .timeout_config(timeout)
            .build();

        Self {
            client: Client::from_conf(conf),
            function_name,
            endpoint_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ComputeRuntime for LambdaRuntime {
    #[tracing::instrument(skip(self, payload), fields(function = %self.function_name))]
    async fn invoke(&self, payload: Vec<u8>) -> Result<InvokeResponse> {
        let output = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::RequestResponse)
            .log_type(LogType::Tail)
            .payload(Blob::new(payload))
            .send()
            .await
            .context("function invocation failed")?;

        let payload = output
            .payload()
            .map(|blob| String::from_utf8_lossy(blob.as_ref()).into_owned())
            .unwrap_or_default();

        let log_tail = output.log_result().and_then(|encoded| {
            BASE64
                .decode(encoded)
                .ok()
                .map(|raw| String::from_utf8_lossy(&raw).into_owned())
        });

        Ok(InvokeResponse { payload, log_tail })
    }

    async fn stop(&self) -> Result<()> {
        let url = format!("{}/2018-06-01/stop", self.endpoint_url);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("stop request to {} failed", url))?;

        if response.status().as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("runtime stop rejected: {}", body);
        }
        Ok(())
    }
}
