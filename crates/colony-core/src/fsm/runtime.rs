//! One `tick` of one agent on one task.

use std::collections::btree_map::Entry;

use tracing::trace;

use super::context::{StepContext, StepEnv};
use super::erased::DynStateMachine;
use super::machine::Outcome;
use crate::domain::{CreepState, FsmError, FsmMemory, StateRecord};

/// What happened during the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub state: &'static str,
    pub finished: bool,
    pub changed: bool,
    pub outcome: Outcome,
}

/// Advance `env.agent` by exactly one step.
///
/// Lazily creates the agent's entry at the machine's initial state, records
/// `{last_state, reason}`, writes the state back only if it changed, and
/// clears the non-interruptible flag on FINISHED. Must be called at most once
/// per agent per tick.
pub fn tick(
    machine: &dyn DynStateMachine,
    memory: &mut FsmMemory,
    env: StepEnv<'_>,
) -> Result<TickReport, FsmError> {
    let FsmMemory {
        task_state,
        creep_states,
    } = memory;

    let entry = match creep_states.entry(env.agent.name.clone()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => entry.insert(CreepState::new(machine.initial_state()?)),
    };

    let agent = env.agent.name.clone();
    let mut ctx = StepContext::new(env, task_state);
    let step = machine.step_dyn(&entry.current_state, &mut ctx)?;

    let changed = step.next != entry.current_state;
    if changed {
        entry.current_state = step.next;
    }
    entry.interruptible = step.finished || step.interruptible;
    entry.record = StateRecord {
        last_state: step.from.to_string(),
        reason: step.reason,
    };
    trace!(
        agent = %agent,
        machine = machine.machine_name(),
        from = step.from,
        to = step.next_name,
        reason = %entry.record.reason,
        "fsm step"
    );

    Ok(TickReport {
        state: step.next_name,
        finished: step.finished,
        changed,
        outcome: step.outcome,
    })
}
