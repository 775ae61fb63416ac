//! StateMachine trait - タスク種別ごとの FSM 定義
//!
//! # 二層構造
//! - **表層（Typed）**: `FsmState` + `StateMachine` - 状態は serde enum
//! - **内部（Dyn）**: `DynStateMachine` - 状態は `serde_json::Value`
//!
//! A machine performs at most one externally visible action per `step` and
//! returns the next state with a short reason for the postmortem record.

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::context::StepContext;
use crate::domain::FsmError;

/// Closed set of named states of one machine.
///
/// Every machine has exactly one INIT state (`initial`) and one FINISHED
/// state (`finished`).
pub trait FsmState:
    Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static
{
    fn initial() -> Self;

    fn finished() -> Self;

    /// Stable name for logs and `StateRecord::last_state`.
    fn name(&self) -> &'static str;

    fn is_finished(&self) -> bool {
        *self == Self::finished()
    }
}

/// How the step ended, from the driver's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// This agent's share of the job is done.
    Done,
    /// The target is gone or unusable; the task should be retried or failed.
    Abort(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step<S> {
    pub next: S,
    pub reason: String,
    pub interruptible: bool,
    pub outcome: Outcome,
}

impl<S: FsmState> Step<S> {
    /// Move to (or stay in) `next`.
    pub fn to(next: S, reason: impl Into<String>) -> Self {
        Self {
            next,
            reason: reason.into(),
            interruptible: true,
            outcome: Outcome::Continue,
        }
    }

    pub fn done(reason: impl Into<String>) -> Self {
        Self {
            next: S::finished(),
            reason: reason.into(),
            interruptible: true,
            outcome: Outcome::Done,
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            next: S::finished(),
            outcome: Outcome::Abort(reason.clone()),
            reason,
            interruptible: true,
        }
    }

    /// Mark the agent as holding a resource mid-transaction.
    pub fn holding(mut self) -> Self {
        self.interruptible = false;
        self
    }
}

pub trait StateMachine: Send + Sync + 'static {
    type State: FsmState;

    /// Name used in errors.
    fn name(&self) -> &'static str;

    fn step(
        &self,
        state: &Self::State,
        ctx: &mut StepContext<'_>,
    ) -> Result<Step<Self::State>, FsmError>;
}
