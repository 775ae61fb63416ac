//! Type erasure: `TypedMachine<M>` → `DynStateMachine`.
//!
//! Lets the registry hold every machine as `Arc<dyn DynStateMachine>` while
//! the states themselves stay typed enums. Stored states are JSON values and
//! are decoded on every step.

use serde_json::Value;

use super::context::StepContext;
use super::machine::{FsmState, Outcome, StateMachine};
use crate::domain::FsmError;

/// Result of one erased step.
#[derive(Debug, Clone, PartialEq)]
pub struct DynStep {
    /// Name of the state the step ran in.
    pub from: &'static str,
    pub next: Value,
    pub next_name: &'static str,
    pub finished: bool,
    pub reason: String,
    pub interruptible: bool,
    pub outcome: Outcome,
}

/// Object-safe view of a `StateMachine`.
pub trait DynStateMachine: Send + Sync {
    fn machine_name(&self) -> &'static str;

    fn initial_state(&self) -> Result<Value, FsmError>;

    fn step_dyn(&self, state: &Value, ctx: &mut StepContext<'_>) -> Result<DynStep, FsmError>;
}

pub struct TypedMachine<M> {
    machine: M,
}

impl<M: StateMachine> TypedMachine<M> {
    pub fn new(machine: M) -> Self {
        Self { machine }
    }
}

impl<M: StateMachine> DynStateMachine for TypedMachine<M> {
    fn machine_name(&self) -> &'static str {
        self.machine.name()
    }

    fn initial_state(&self) -> Result<Value, FsmError> {
        serde_json::to_value(M::State::initial()).map_err(FsmError::Encode)
    }

    fn step_dyn(&self, state: &Value, ctx: &mut StepContext<'_>) -> Result<DynStep, FsmError> {
        let current: M::State =
            serde_json::from_value(state.clone()).map_err(FsmError::CorruptState)?;
        let step = self.machine.step(&current, ctx)?;
        let finished = step.next.is_finished();
        let outcome = match step.outcome {
            Outcome::Continue if finished => Outcome::Done,
            other => other,
        };
        Ok(DynStep {
            from: current.name(),
            next: serde_json::to_value(&step.next).map_err(FsmError::Encode)?,
            next_name: step.next.name(),
            finished,
            reason: step.reason,
            interruptible: step.interruptible,
            outcome,
        })
    }
}
