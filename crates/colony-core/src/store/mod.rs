//! Task store: task ledger, bindings, retry policy and counters.

pub mod counters;
pub mod retry;
pub mod task_store;

pub use counters::{StatusCounts, TaskCounters};
pub use retry::RetryPolicy;
pub use task_store::{CleanupReport, TaskStore, TaskStoreSnapshot};
