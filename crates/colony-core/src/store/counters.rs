use serde::{Deserialize, Serialize};

/// Lifetime counters of the task store (observability).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounters {
    pub created: u64,
    pub assigned: u64,
    pub completed: u64,
    pub failed: u64,
    pub reclaimed: u64,
    pub expired: u64,
}

/// Current tasks by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}
