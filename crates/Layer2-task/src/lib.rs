//! # plugrun-task
//!
//! Task execution for plugrun.
//! Runs work requests against loaded plugins through per-type adapters.
//!
//! ## Features
//!
//! - Synchronous `execute` and queued `execute_async` with result lookup
//! - Per-type adapters (http, event, scheduled, data, custom) with declared-type validation
//! - Per-task deadline and external cancellation
//! - Retry policy with fixed / linear / exponential backoff
//! - Bounded queue with immediate `QueueFull` backpressure

pub mod executor;
pub mod retry;
pub mod state;
pub mod task;

pub use executor::{
    AdapterSet, CustomAdapter, DataAdapter, EventAdapter, ExecutorConfig, ExecutorStats,
    HttpAdapter, PluginExecutor, ScheduledAdapter, TaskAdapter,
};
pub use retry::{BackoffKind, RetryPolicy};
pub use state::TaskStatus;
pub use task::{ExecutionResult, ExecutionTask, TaskId, TaskPriority};
