//! Shared constants: sentinels, stage-stamp keys, and counter names.

/// Owner value of a status row that nobody has claimed.
pub const OWNER_NONE: &str = "none";

/// Pod id used when `MY_POD_NAME` is not set (local runs).
pub const DEFAULT_POD_ID: &str = "1234";

/// Config file path used when `AGENT_CONFIG_FILE` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/agent/Agent_config.tfvars.json";

/// Binary executed by the local subprocess variant.
pub const COMPUTE_ENGINE_BIN: &str = "./mock_compute_engine";

/// Literal the remote runtime returns when its bootstrap failed.
pub const BOOTSTRAP_FAILURE_MARKER: &str = "BOOTSTRAP ERROR";

// Stage-stamp keys. Assigned in strictly increasing causal order; the
// stage2 key is written by the submission pipeline and only read here.
pub const STAGE2_SUBMITTER_BEFORE_BATCH_WRITE: &str =
    "stage2_sbmtlmba_02_before_batch_write_tstmp";
pub const STAGE3_ACQUIRED_FROM_QUEUE: &str = "stage3_agent_01_task_acquired_sqs_tstmp";
pub const STAGE3_ACQUIRED_IN_STORE: &str = "stage3_agent_02_task_acquired_ddb_tstmp";
pub const STAGE4_USER_CODE_FINISHED: &str = "stage4_agent_01_user_code_finished_tstmp";
pub const STAGE4_STDOUT_DELIVERED: &str = "stage4_agent_02_S3_stdout_delivered_tstmp";

// Counter names, pre-agent window (submission to claim).
pub const CTR_NO_MESSAGES: &str = "agent_no_messages_in_tasks_queue";
pub const CTR_FAILED_TO_CLAIM: &str = "agent_failed_to_claim_ddb_task";
pub const CTR_SUCCESSFUL_ACQUIRE: &str = "agent_successful_acquire_a_task";
pub const CTR_AUTO_THROTTLING: &str = "agent_auto_throtling_event";
pub const CTR_CUBIC_DECREASE: &str = "rc_cubic_decrease_event";

// Counter names, post-agent window (claim to artifact delivery).
pub const CTR_SET_FINISHED_FAILED: &str = "ddb_set_task_finished_failed";
pub const CTR_SET_FINISHED_SUCCEEDED: &str = "ddb_set_task_finished_succeeded";
pub const CTR_UPDATE_TTL: &str = "counter_update_ttl";
pub const CTR_UPDATE_TTL_FAILED: &str = "counter_update_ttl_failed";
pub const CTR_USER_CODE_RET_CODE_FAILED: &str = "counter_user_code_ret_code_failed";
pub const CTR_BOOTSTRAP_FAILURE: &str = "bootstrap_failure";
pub const CTR_TASK_EXEC_TIME_MS: &str = "task_exec_time_ms";
pub const CTR_AGENT_TOTAL_TIME_MS: &str = "agent_total_time_ms";
pub const CTR_STR_POD_ID: &str = "str_pod_id";

/// Counters registered on the pre-agent tracker. The congestion-control
/// counters are part of the sink schema and are incremented outside the
/// agent itself.
pub const PRE_AGENT_COUNTERS: [&str; 5] = [
    CTR_NO_MESSAGES,
    CTR_FAILED_TO_CLAIM,
    CTR_SUCCESSFUL_ACQUIRE,
    CTR_AUTO_THROTTLING,
    CTR_CUBIC_DECREASE,
];

/// Counters registered on the post-agent tracker.
pub const POST_AGENT_COUNTERS: [&str; 9] = [
    CTR_SET_FINISHED_FAILED,
    CTR_SET_FINISHED_SUCCEEDED,
    CTR_UPDATE_TTL,
    CTR_UPDATE_TTL_FAILED,
    CTR_USER_CODE_RET_CODE_FAILED,
    CTR_BOOTSTRAP_FAILURE,
    CTR_TASK_EXEC_TIME_MS,
    CTR_AGENT_TOTAL_TIME_MS,
    CTR_STR_POD_ID,
];
