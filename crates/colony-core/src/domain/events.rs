//! Events - ドメインイベント
//!
//! TaskStore が状態遷移のたびにバッファへ積み、tick の終わりに
//! `EventSink` へまとめて流す。

use serde::{Deserialize, Serialize};

use super::geometry::Tick;
use super::ids::{AgentName, TaskId};
use super::state::TaskKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskCreated {
        task: TaskId,
        kind: TaskKind,
        at: Tick,
    },
    TaskAssigned {
        task: TaskId,
        agent: AgentName,
        at: Tick,
    },
    TaskUnassigned {
        task: TaskId,
        agent: AgentName,
        at: Tick,
    },
    TaskStarted {
        task: TaskId,
        at: Tick,
    },
    TaskCompleted {
        task: TaskId,
        at: Tick,
    },
    TaskFailed {
        task: TaskId,
        reason: String,
        at: Tick,
    },
    /// Put back to Pending (retry or vanished agent).
    TaskReclaimed {
        task: TaskId,
        reason: String,
        at: Tick,
    },
    TaskExpired {
        task: TaskId,
        at: Tick,
    },
}

impl DomainEvent {
    pub fn task(&self) -> TaskId {
        match self {
            DomainEvent::TaskCreated { task, .. }
            | DomainEvent::TaskAssigned { task, .. }
            | DomainEvent::TaskUnassigned { task, .. }
            | DomainEvent::TaskStarted { task, .. }
            | DomainEvent::TaskCompleted { task, .. }
            | DomainEvent::TaskFailed { task, .. }
            | DomainEvent::TaskReclaimed { task, .. }
            | DomainEvent::TaskExpired { task, .. } => *task,
        }
    }
}
