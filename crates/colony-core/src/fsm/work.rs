//! Work: spend carried energy on a build site, a controller or a damaged
//! structure.
//!
//! ```text
//! Init → RequestEnergy → Wait{deadline} ─(supplied)→ Work
//!                            └─(timeout)→ Fetch ──→ Work
//! Work ─(empty)→ RequestEnergy
//! ```
//!
//! Waiting is bounded by the deadline handed out by the supply service; on
//! timeout the agent fetches energy itself. The target is re-checked on
//! every step.

use serde::{Deserialize, Serialize};

use super::context::StepContext;
use super::machine::{FsmState, StateMachine, Step};
use crate::domain::{FsmError, ObjectId, ObjectKind, ObjectView, Position, ResourceType, TaskParams, Tick};
use crate::ports::{ActionResult, MoveOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkState {
    Init,
    RequestEnergy,
    Wait { deadline: Tick },
    Fetch,
    Work,
    Finished,
}

impl FsmState for WorkState {
    fn initial() -> Self {
        WorkState::Init
    }

    fn finished() -> Self {
        WorkState::Finished
    }

    fn name(&self) -> &'static str {
        match self {
            WorkState::Init => "init",
            WorkState::RequestEnergy => "request_energy",
            WorkState::Wait { .. } => "wait",
            WorkState::Fetch => "fetch",
            WorkState::Work => "work",
            WorkState::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Build,
    Upgrade,
    Repair,
}

struct Target {
    action: Action,
    id: ObjectId,
    position: Position,
}

/// Shared by Build, Upgrade and Repair tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkMachine;

impl StateMachine for WorkMachine {
    type State = WorkState;

    fn name(&self) -> &'static str {
        "work"
    }

    fn step(&self, state: &WorkState, ctx: &mut StepContext<'_>) -> Result<Step<WorkState>, FsmError> {
        let target = match ctx.params {
            TaskParams::Build { site, position } => Target {
                action: Action::Build,
                id: site.clone(),
                position: position.clone(),
            },
            TaskParams::Upgrade {
                controller,
                position,
            } => Target {
                action: Action::Upgrade,
                id: controller.clone(),
                position: position.clone(),
            },
            TaskParams::Repair {
                structure,
                position,
            } => Target {
                action: Action::Repair,
                id: structure.clone(),
                position: position.clone(),
            },
            other => {
                return Err(FsmError::ParamsMismatch {
                    machine: self.name(),
                    found: other.kind(),
                });
            }
        };

        if *state == WorkState::Finished {
            return Ok(Step::done("finished"));
        }
        if let Some(end) = check_target(ctx, &target) {
            ctx.supply.cancel(ctx.name());
            return Ok(end);
        }
        if ctx.expiring() {
            ctx.supply.cancel(ctx.name());
            return Ok(Step::done("agent expiring"));
        }

        let energy = ctx.agent.carried(ResourceType::Energy);
        Ok(match *state {
            WorkState::Init if energy > 0 => Step::to(WorkState::Work, "already carrying energy"),
            WorkState::Init => Step::to(WorkState::RequestEnergy, "need energy"),
            WorkState::RequestEnergy => {
                let movement = ctx.movement();
                let amount = ctx.agent.free_capacity();
                let ticket = ctx.supply.request(
                    ctx.agent,
                    ResourceType::Energy,
                    amount,
                    movement,
                    ctx.now,
                );
                Step::to(
                    WorkState::Wait {
                        deadline: ticket.deadline,
                    },
                    "supply requested",
                )
            }
            WorkState::Wait { deadline } => wait(ctx, &target, deadline, energy),
            WorkState::Fetch => fetch(ctx),
            WorkState::Work => work(ctx, &target, energy),
            WorkState::Finished => Step::done("finished"),
        })
    }
}

/// `Some(step)` when the job ends because of its target.
fn check_target(ctx: &StepContext<'_>, target: &Target) -> Option<Step<WorkState>> {
    let object = ctx.world().object(&target.id);
    match (target.action, object) {
        // a finished site disappears from the world
        (Action::Build, None) => Some(Step::done("site complete")),
        (Action::Build, Some(site)) if site.progress.is_some_and(|p| p.is_full()) => {
            Some(Step::done("site complete"))
        }
        (Action::Upgrade, None) => Some(Step::abort("controller gone")),
        (Action::Repair, None) => Some(Step::abort("structure gone")),
        (Action::Repair, Some(structure)) if structure.hits.is_none_or(|h| h.is_full()) => {
            Some(Step::done("repaired"))
        }
        _ => None,
    }
}

fn wait(ctx: &mut StepContext<'_>, target: &Target, deadline: Tick, energy: u32) -> Step<WorkState> {
    if energy > 0 {
        ctx.supply.cancel(ctx.name());
        return Step::to(WorkState::Work, "supplied");
    }
    if ctx.now >= deadline {
        ctx.supply.cancel(ctx.name());
        return Step::to(WorkState::Fetch, "wait timed out, fetching");
    }
    // stay close to the job while waiting
    ctx.movement()
        .step_toward(ctx.name(), &target.position, ctx.config.work_range);
    Step::to(WorkState::Wait { deadline }, "waiting for supply")
}

fn nearest_energy(ctx: &StepContext<'_>) -> Option<ObjectView> {
    let here = &ctx.agent.position;
    let world = ctx.world();
    let movement = ctx.movement();
    [
        ObjectKind::Container,
        ObjectKind::Storage,
        ObjectKind::DroppedResource,
    ]
    .into_iter()
    .flat_map(|kind| world.find(&here.zone, kind))
    .filter(|obj| obj.stored(ResourceType::Energy) > 0)
    .filter_map(|obj| movement.path_length(here, &obj.position).map(|d| (d, obj)))
    .min_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.id.cmp(&b.id)))
    .map(|(_, obj)| obj)
}

fn fetch(ctx: &StepContext<'_>) -> Step<WorkState> {
    if ctx.agent.is_full() {
        return Step::to(WorkState::Work, "loaded");
    }
    let Some(source) = nearest_energy(ctx) else {
        return Step::to(WorkState::RequestEnergy, "nothing to fetch");
    };
    match ctx.movement().step_toward(ctx.name(), &source.position, 1) {
        MoveOutcome::Moving => return Step::to(WorkState::Fetch, "moving to energy"),
        MoveOutcome::NoPath => return Step::to(WorkState::RequestEnergy, "energy unreachable"),
        MoveOutcome::InRange => {}
    }
    let result = match source.kind {
        ObjectKind::DroppedResource => ctx.actuator().pickup(ctx.name(), &source.id),
        _ => ctx
            .actuator()
            .withdraw(ctx.name(), &source.id, ResourceType::Energy, None),
    };
    match result {
        ActionResult::Ok | ActionResult::Full => Step::to(WorkState::Work, "fetched energy"),
        other => Step::to(WorkState::Fetch, format!("fetch: {other:?}")),
    }
}

fn work(ctx: &StepContext<'_>, target: &Target, energy: u32) -> Step<WorkState> {
    if energy == 0 {
        return Step::to(WorkState::RequestEnergy, "out of energy");
    }
    match ctx
        .movement()
        .step_toward(ctx.name(), &target.position, ctx.config.work_range)
    {
        MoveOutcome::Moving => return Step::to(WorkState::Work, "moving to target"),
        MoveOutcome::NoPath => return Step::abort("no path to target"),
        MoveOutcome::InRange => {}
    }
    let actuator = ctx.actuator();
    let result = match target.action {
        Action::Build => actuator.build(ctx.name(), &target.id),
        Action::Upgrade => actuator.upgrade(ctx.name(), &target.id),
        Action::Repair => actuator.repair(ctx.name(), &target.id),
    };
    match result {
        ActionResult::Ok => Step::to(WorkState::Work, "working"),
        ActionResult::NotEnoughResources => Step::to(WorkState::RequestEnergy, "out of energy"),
        ActionResult::InvalidTarget => match target.action {
            Action::Build => Step::done("site complete"),
            _ => Step::abort("target invalid"),
        },
        other => Step::to(WorkState::Work, format!("work: {other:?}")),
    }
}
