//! State - タスクの種類・優先度・状態
//!
//! # 状態遷移
//! - Pending -> Assigned -> InProgress -> Completed
//! - Pending -> Assigned -> InProgress -> Failed（retry 上限超過）
//! - Assigned / InProgress -> Pending（reclaim: エージェント消失、retry）
//!
//! Completed / Failed は終端状態で、それ以降の遷移はない。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Harvest,
    Transport,
    Build,
    Upgrade,
    Repair,
    Attack,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Harvest,
        TaskKind::Transport,
        TaskKind::Build,
        TaskKind::Upgrade,
        TaskKind::Repair,
        TaskKind::Attack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Harvest => "harvest",
            TaskKind::Transport => "transport",
            TaskKind::Build => "build",
            TaskKind::Upgrade => "upgrade",
            TaskKind::Repair => "repair",
            TaskKind::Attack => "attack",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static priority of a task. Ordering matters: declaration order is rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Background,
    Low,
    Normal,
    High,
    Critical,
    Emergency,
}

impl TaskPriority {
    /// Monotonic mapping onto the 1..=10 weight scale.
    pub fn base_weight(self) -> f64 {
        match self {
            TaskPriority::Background => 1.0,
            TaskPriority::Low => 2.0,
            TaskPriority::Normal => 4.0,
            TaskPriority::High => 6.0,
            TaskPriority::Critical => 8.0,
            TaskPriority::Emergency => 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Pending ∪ Assigned ∪ InProgress.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    /// Exactly one agent at a time.
    Exclusive,
    /// Up to `max_assignees` concurrent agents.
    Shared,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_weights_are_monotonic() {
        let order = [
            TaskPriority::Background,
            TaskPriority::Low,
            TaskPriority::Normal,
            TaskPriority::High,
            TaskPriority::Critical,
            TaskPriority::Emergency,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].base_weight() < pair[1].base_weight());
        }
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Assigned.is_active());
        assert!(TaskStatus::InProgress.is_active());
    }
}
