//! Per-task FSM memory block.
//!
//! This is the only state of an in-flight job that survives a process
//! restart, so it is plain serde data: states are stored as JSON values and
//! decoded by the owning state machine on every tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::AgentName;

/// Postmortem record of the last handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateRecord {
    pub last_state: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreepState {
    pub current_state: serde_json::Value,
    pub interruptible: bool,
    #[serde(default)]
    pub record: StateRecord,
}

impl CreepState {
    pub fn new(initial: serde_json::Value) -> Self {
        Self {
            current_state: initial,
            interruptible: true,
            record: StateRecord::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FsmMemory {
    /// Task-level state shared by all agents on the task (e.g. claimed spots).
    #[serde(default)]
    pub task_state: Option<serde_json::Value>,
    #[serde(default)]
    pub creep_states: BTreeMap<AgentName, CreepState>,
}

impl FsmMemory {
    pub fn creep(&self, agent: &AgentName) -> Option<&CreepState> {
        self.creep_states.get(agent)
    }

    /// Frees the entry of an agent that left the task.
    pub fn release(&mut self, agent: &AgentName) -> Option<CreepState> {
        self.creep_states.remove(agent)
    }
}
