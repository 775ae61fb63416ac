//! Errors - エラー型と分類
//!
//! # 分類
//! - 一時的な失敗（"not yet", "busy"）は FSM handler の中で吸収し、ここには来ない
//! - ターゲット消失は `Step::abort` → `TaskStore::report_failure` で扱う
//! - ここに定義するのは phase 境界で捕まえてログに出すもの

use thiserror::Error;

use super::ids::{AgentName, TaskId};
use super::state::{TaskKind, TaskStatus};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("no state machine registered for task kind={0}")]
    NoStateMachine(TaskKind),

    #[error("invalid transition for {task}: {from:?} -> {to:?}")]
    InvalidTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("fsm memory missing for {task}")]
    FsmMemoryMissing { task: TaskId },

    #[error("fsm failed for {task}/{agent}: {source}")]
    Fsm {
        task: TaskId,
        agent: AgentName,
        #[source]
        source: FsmError,
    },

    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("phase {phase} failed for {failures} agent(s)/task(s)")]
    PartialFailure { phase: &'static str, failures: usize },
}

/// A state machine could not run one step for one agent.
#[derive(Debug, Error)]
pub enum FsmError {
    #[error("corrupt agent state: {0}")]
    CorruptState(#[source] serde_json::Error),

    #[error("corrupt task state: {0}")]
    CorruptTaskState(#[source] serde_json::Error),

    #[error("state encode: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("{machine} machine cannot run {found} params")]
    ParamsMismatch {
        machine: &'static str,
        found: TaskKind,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encode/decode: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}
