//! Capabilities port - ロードアウトがタスク種別に向いているか

use crate::domain::{AgentView, TaskKind};

pub trait Capabilities {
    /// Hard requirement: can this agent perform `kind` at all?
    fn satisfies(&self, agent: &AgentView, kind: TaskKind) -> bool;

    /// Task-type-specific fitness in 0..=1.
    fn fitness(&self, agent: &AgentView, kind: TaskKind) -> f64;
}
