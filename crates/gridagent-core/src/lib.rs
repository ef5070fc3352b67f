//! Core domain types for the grid compute-plane agent.
//!
//! This crate provides the task and status-row models, the agent
//! configuration, the heartbeat TTL generator, and the event counters that
//! are shared across the agent's components.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod models;
pub mod storage_types;
pub mod ttl;

// Re-export commonly used types
pub use config::AgentConfig;
pub use error::ConfigError;
pub use metrics::{EventsCounter, MetricValue};
pub use storage_types::StorageBackend;
pub use ttl::TtlExpirationGenerator;
