//! Metadata-store access for the task-status table.
//!
//! Every mutation is a conditional write whose predicate encodes the
//! caller's claimed state; the store's linearizable conditional update is
//! the only synchronization point between agents and the watchdog.

pub mod db;
pub mod error;

pub use db::{DynamoStatusStore, StatusStore};
pub use error::StoreError;
