//! Store error taxonomy.
//!
//! Callers branch on three outcomes: the predicate of a conditional write
//! was violated (contention, recovered locally), the store throttled the
//! request (retried by the caller), or anything else (fatal).

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conditional write rejected")]
    ConditionFailed,

    #[error("store throttled the request: {0}")]
    Throttled(String),

    #[error("malformed status row: {0}")]
    Malformed(String),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, StoreError::ConditionFailed)
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, StoreError::Throttled(_))
    }
}

/// Error codes the metadata store uses to signal capacity pressure.
pub(crate) const THROTTLING_CODES: [&str; 2] =
    ["ThrottlingException", "ProvisionedThroughputExceededException"];

pub(crate) const CONDITION_FAILED_CODE: &str = "ConditionalCheckFailedException";
