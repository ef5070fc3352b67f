//! Status-table repository.

pub mod status;

pub use status::{DynamoStatusStore, StatusStore};
