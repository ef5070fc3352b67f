//! Task-lifecycle engine.
//!
//! One agent instance runs per compute pod. Each loop iteration claims at
//! most one task from the shared queue, executes it while a concurrent
//! renewer keeps the ownership lease alive, and commits completion into the
//! shared metadata store.

pub mod acquire;
pub mod commit;
pub mod context;
pub mod execute;
pub mod lease;
pub mod queue;
pub mod runtime;
pub mod supervisor;

pub use acquire::TaskAcquirer;
pub use commit::CompletionCommitter;
pub use context::TaskContext;
pub use execute::{ExecutionDriver, ExecutionVariant, StdoutSource};
pub use lease::LeaseRenewer;
pub use queue::{QueueMessage, SqsTaskQueue, TaskQueue};
pub use runtime::{ComputeRuntime, InvokeResponse, LambdaRuntime};
pub use supervisor::{spawn_shutdown_listener, Supervisor};
