//! Attack: close in on a hostile and hit it until it is gone.

use serde::{Deserialize, Serialize};

use super::context::StepContext;
use super::machine::{FsmState, StateMachine, Step};
use crate::domain::{FsmError, TaskParams};
use crate::ports::{ActionResult, MoveOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttackState {
    Init,
    Engage,
    Finished,
}

impl FsmState for AttackState {
    fn initial() -> Self {
        AttackState::Init
    }

    fn finished() -> Self {
        AttackState::Finished
    }

    fn name(&self) -> &'static str {
        match self {
            AttackState::Init => "init",
            AttackState::Engage => "engage",
            AttackState::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttackMachine;

impl StateMachine for AttackMachine {
    type State = AttackState;

    fn name(&self) -> &'static str {
        "attack"
    }

    fn step(
        &self,
        state: &AttackState,
        ctx: &mut StepContext<'_>,
    ) -> Result<Step<AttackState>, FsmError> {
        let TaskParams::Attack { target, .. } = ctx.params else {
            return Err(FsmError::ParamsMismatch {
                machine: self.name(),
                found: ctx.params.kind(),
            });
        };

        if *state == AttackState::Finished {
            return Ok(Step::done("finished"));
        }
        // hostiles move: always chase the live position
        let Some(hostile) = ctx
            .world()
            .object(target)
            .filter(|obj| obj.hits.is_none_or(|h| h.current > 0))
        else {
            return Ok(Step::done("target destroyed"));
        };
        if ctx.expiring() {
            return Ok(Step::done("agent expiring"));
        }
        if *state == AttackState::Init {
            return Ok(Step::to(AttackState::Engage, "engaging"));
        }

        match ctx.movement().step_toward(ctx.name(), &hostile.position, 1) {
            MoveOutcome::Moving => return Ok(Step::to(AttackState::Engage, "closing in")),
            MoveOutcome::NoPath => return Ok(Step::abort("no path to target")),
            MoveOutcome::InRange => {}
        }
        Ok(match ctx.actuator().attack(ctx.name(), target) {
            ActionResult::Ok => Step::to(AttackState::Engage, "hit"),
            ActionResult::InvalidTarget => Step::done("target destroyed"),
            ActionResult::NoBodyPart => Step::abort("no attack parts"),
            other => Step::to(AttackState::Engage, format!("attack: {other:?}")),
        })
    }
}
