//! Transport: move one resource from a source end to a sink end.
//!
//! ```text
//! Init → DisposeCargo → Pickup → Deliver → Finished
//! ```
//!
//! Off-type cargo is dropped first. The source is a named object or the
//! richest pile around a position; the sink is an object, an agent or a
//! position (ground drop).

use serde::{Deserialize, Serialize};

use super::context::StepContext;
use super::machine::{FsmState, StateMachine, Step};
use crate::domain::{
    AgentName, FsmError, ObjectId, ObjectKind, ObjectView, Position, ResourceType, TaskParams,
    TransferEnd,
};
use crate::ports::{ActionResult, MoveOutcome, TransferTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransportState {
    Init,
    DisposeCargo,
    Pickup,
    Deliver,
    Finished,
}

impl FsmState for TransportState {
    fn initial() -> Self {
        TransportState::Init
    }

    fn finished() -> Self {
        TransportState::Finished
    }

    fn name(&self) -> &'static str {
        match self {
            TransportState::Init => "init",
            TransportState::DisposeCargo => "dispose_cargo",
            TransportState::Pickup => "pickup",
            TransportState::Deliver => "deliver",
            TransportState::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransportMachine;

struct Job<'p> {
    from: &'p TransferEnd,
    to: &'p TransferEnd,
    resource: ResourceType,
    amount: u32,
}

impl StateMachine for TransportMachine {
    type State = TransportState;

    fn name(&self) -> &'static str {
        "transport"
    }

    fn step(
        &self,
        state: &TransportState,
        ctx: &mut StepContext<'_>,
    ) -> Result<Step<TransportState>, FsmError> {
        let TaskParams::Transport {
            from,
            to,
            resource,
            amount,
        } = ctx.params
        else {
            return Err(FsmError::ParamsMismatch {
                machine: self.name(),
                found: ctx.params.kind(),
            });
        };
        let job = Job {
            from,
            to,
            resource: *resource,
            amount: *amount,
        };

        Ok(match state {
            TransportState::Init => init(ctx, &job),
            TransportState::DisposeCargo => dispose(ctx, &job),
            TransportState::Pickup => pickup(ctx, &job),
            TransportState::Deliver => deliver(ctx, &job),
            TransportState::Finished => Step::done("finished"),
        })
    }
}

fn off_type_cargo(ctx: &StepContext<'_>, resource: ResourceType) -> Option<ResourceType> {
    ctx.agent
        .carry
        .iter()
        .find(|(r, amount)| **r != resource && **amount > 0)
        .map(|(r, _)| *r)
}

fn init(ctx: &StepContext<'_>, job: &Job<'_>) -> Step<TransportState> {
    if off_type_cargo(ctx, job.resource).is_some() {
        return Step::to(TransportState::DisposeCargo, "carrying off-type cargo");
    }
    if ctx.agent.carried(job.resource) >= job.amount.min(ctx.agent.carry_capacity).max(1) {
        return Step::to(TransportState::Deliver, "already loaded").holding();
    }
    Step::to(TransportState::Pickup, "start")
}

fn dispose(ctx: &StepContext<'_>, job: &Job<'_>) -> Step<TransportState> {
    match off_type_cargo(ctx, job.resource) {
        Some(other) => match ctx.actuator().drop_resource(ctx.name(), other, None) {
            ActionResult::Ok => Step::to(TransportState::DisposeCargo, format!("dropped {other:?}")),
            refused => Step::abort(format!("cannot dispose {other:?}: {refused:?}")),
        },
        None => Step::to(TransportState::Pickup, "cargo clean"),
    }
}

/// Deliver what we have if the source dried up mid-job, otherwise give up.
fn source_exhausted(ctx: &StepContext<'_>, job: &Job<'_>, why: &str) -> Step<TransportState> {
    if ctx.agent.carried(job.resource) > 0 {
        Step::to(TransportState::Deliver, format!("{why}, delivering partial load")).holding()
    } else {
        Step::abort(why)
    }
}

fn resolve_source(ctx: &StepContext<'_>, job: &Job<'_>) -> Option<ObjectView> {
    match job.from {
        TransferEnd::Object(id) => ctx
            .world()
            .object(id)
            .filter(|obj| obj.stored(job.resource) > 0),
        TransferEnd::Position(pos) => richest_pile(ctx, pos, job.resource),
        TransferEnd::Agent(_) => None,
    }
}

fn richest_pile(
    ctx: &StepContext<'_>,
    around: &Position,
    resource: ResourceType,
) -> Option<ObjectView> {
    ctx.world()
        .find(&around.zone, ObjectKind::DroppedResource)
        .into_iter()
        .filter(|pile| pile.position.is_within(around, 1) && pile.stored(resource) > 0)
        .max_by(|a, b| {
            a.stored(resource)
                .cmp(&b.stored(resource))
                .then_with(|| b.id.cmp(&a.id))
        })
}

fn pickup(ctx: &StepContext<'_>, job: &Job<'_>) -> Step<TransportState> {
    if ctx.agent.is_full() {
        return Step::to(TransportState::Deliver, "full").holding();
    }
    let Some(source) = resolve_source(ctx, job) else {
        return source_exhausted(ctx, job, "source gone or empty");
    };

    match ctx.movement().step_toward(ctx.name(), &source.position, 1) {
        MoveOutcome::Moving => return Step::to(TransportState::Pickup, "moving to source"),
        MoveOutcome::NoPath => return source_exhausted(ctx, job, "no path to source"),
        MoveOutcome::InRange => {}
    }

    let wanted = job.amount.min(ctx.agent.free_capacity());
    let result = match source.kind {
        ObjectKind::DroppedResource => ctx.actuator().pickup(ctx.name(), &source.id),
        _ => ctx.actuator().withdraw(
            ctx.name(),
            &source.id,
            job.resource,
            Some(wanted.min(source.stored(job.resource))),
        ),
    };
    match result {
        ActionResult::Ok | ActionResult::Full => {
            Step::to(TransportState::Deliver, "loaded").holding()
        }
        ActionResult::NotEnoughResources | ActionResult::InvalidTarget => {
            source_exhausted(ctx, job, "source empty")
        }
        other => Step::to(TransportState::Pickup, format!("pickup: {other:?}")),
    }
}

fn deliver(ctx: &StepContext<'_>, job: &Job<'_>) -> Step<TransportState> {
    if ctx.agent.carried(job.resource) == 0 {
        return Step::done("delivered");
    }

    let (position, target) = match job.to {
        TransferEnd::Object(id) => {
            let Some(sink) = ctx.world().object(id) else {
                return Step::abort("sink gone");
            };
            if sink.free_capacity() == 0 {
                return Step::done("sink full");
            }
            (sink.position, Sink::Object(id))
        }
        TransferEnd::Agent(name) => {
            let Some(recipient) = ctx.world().agent(name) else {
                return Step::abort("recipient gone");
            };
            (recipient.position, Sink::Agent(name))
        }
        TransferEnd::Position(pos) => (pos.clone(), Sink::Ground),
    };

    let range = match target {
        Sink::Ground => 0,
        _ => 1,
    };
    match ctx.movement().step_toward(ctx.name(), &position, range) {
        MoveOutcome::Moving => {
            return Step::to(TransportState::Deliver, "moving to sink").holding();
        }
        MoveOutcome::NoPath => return Step::abort("no path to sink"),
        MoveOutcome::InRange => {}
    }

    let result = match target {
        Sink::Object(id) => ctx.actuator().transfer(
            ctx.name(),
            TransferTarget::Object(id),
            job.resource,
            None,
        ),
        Sink::Agent(name) => ctx.actuator().transfer(
            ctx.name(),
            TransferTarget::Agent(name),
            job.resource,
            None,
        ),
        Sink::Ground => ctx.actuator().drop_resource(ctx.name(), job.resource, None),
    };
    match result {
        ActionResult::Ok => Step::done("delivered"),
        ActionResult::Full => Step::done("sink full"),
        ActionResult::InvalidTarget => Step::abort("sink invalid"),
        other => Step::to(TransportState::Deliver, format!("deliver: {other:?}")).holding(),
    }
}

enum Sink<'p> {
    Object(&'p ObjectId),
    Agent(&'p AgentName),
    Ground,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Loadout;
    use crate::fsm::Outcome;
    use crate::fsm::test_support::Harness;
    use crate::ports::WorldQuery;

    fn hauler() -> Loadout {
        Loadout {
            work: 0,
            carry: 4,
            mobility: 2,
            attack: 0,
        }
    }

    fn params(from: TransferEnd, to: TransferEnd, amount: u32) -> TaskParams {
        TaskParams::Transport {
            from,
            to,
            resource: ResourceType::Energy,
            amount,
        }
    }

    fn run_to_end(h: &mut Harness, agent: &str, max: usize) -> Outcome {
        for _ in 0..max {
            let report = h.tick(&TransportMachine, agent).unwrap();
            h.world.advance();
            if report.finished {
                return report.outcome;
            }
        }
        panic!("transport did not finish in {max} ticks");
    }

    #[test]
    fn container_to_spawn() {
        let h = Harness::new(params(
            TransferEnd::Object(ObjectId::new("c1")),
            TransferEnd::Object(ObjectId::new("spawn")),
            100,
        ));
        h.world.add_store("c1", ObjectKind::Container, Position::new("Z", 5, 5), 500, 2000);
        h.world.add_store("spawn", ObjectKind::Spawn, Position::new("Z", 12, 5), 0, 300);
        h.world.add_agent("H", Position::new("Z", 1, 5), hauler(), 1500);
        let mut h = h.with_assigned(&["H"]);

        assert_eq!(run_to_end(&mut h, "H", 40), Outcome::Done);
        assert_eq!(h.object("spawn").stored(ResourceType::Energy), 100);
        assert_eq!(h.object("c1").stored(ResourceType::Energy), 400);
    }

    #[test]
    fn off_type_cargo_is_dropped_first() {
        let h = Harness::new(params(
            TransferEnd::Object(ObjectId::new("c1")),
            TransferEnd::Object(ObjectId::new("spawn")),
            50,
        ));
        h.world.add_store("c1", ObjectKind::Container, Position::new("Z", 5, 5), 500, 2000);
        h.world.add_store("spawn", ObjectKind::Spawn, Position::new("Z", 7, 5), 0, 300);
        h.world.add_agent("H", Position::new("Z", 4, 5), hauler(), 1500);
        h.world.set_carry(&AgentName::new("H"), ResourceType::Mineral, 20);
        let mut h = h.with_assigned(&["H"]);

        let first = h.tick(&TransportMachine, "H").unwrap();
        assert_eq!(first.state, "dispose_cargo");
        h.tick(&TransportMachine, "H").unwrap();
        assert_eq!(h.world.drops_at(&Position::new("Z", 4, 5)), 20);
        assert_eq!(run_to_end(&mut h, "H", 20), Outcome::Done);
    }

    #[test]
    fn undisposable_cargo_aborts() {
        let h = Harness::new(params(
            TransferEnd::Object(ObjectId::new("c1")),
            TransferEnd::Object(ObjectId::new("spawn")),
            50,
        ));
        h.world.add_store("c1", ObjectKind::Container, Position::new("Z", 5, 5), 500, 2000);
        h.world.add_store("spawn", ObjectKind::Spawn, Position::new("Z", 7, 5), 0, 300);
        h.world.add_agent("H", Position::new("Z", 4, 5), hauler(), 1500);
        h.world.set_carry(&AgentName::new("H"), ResourceType::Mineral, 20);
        h.world.forbid_drops(Position::new("Z", 4, 5));
        let mut h = h.with_assigned(&["H"]);

        assert!(matches!(run_to_end(&mut h, "H", 3), Outcome::Abort(_)));
        let agent = h.world.agent(&AgentName::new("H")).unwrap();
        assert_eq!(agent.carried(ResourceType::Mineral), 20);
        assert_eq!(h.object("c1").stored(ResourceType::Energy), 500);
    }

    #[test]
    fn pile_around_position_is_scanned() {
        let h = Harness::new(params(
            TransferEnd::Position(Position::new("Z", 10, 10)),
            TransferEnd::Agent(AgentName::new("B")),
            100,
        ));
        h.world.add_drop("d1", Position::new("Z", 11, 10), ResourceType::Energy, 30);
        h.world.add_drop("d2", Position::new("Z", 10, 11), ResourceType::Energy, 80);
        h.world.add_agent("H", Position::new("Z", 10, 10), hauler(), 1500);
        let builder = Loadout {
            work: 1,
            carry: 2,
            mobility: 1,
            attack: 0,
        };
        h.world.add_agent("B", Position::new("Z", 14, 10), builder, 1500);
        let mut h = h.with_assigned(&["H"]);

        assert_eq!(run_to_end(&mut h, "H", 20), Outcome::Done);
        let builder = h.world.agent(&AgentName::new("B")).unwrap();
        assert_eq!(builder.carried(ResourceType::Energy), 80);
    }

    #[test]
    fn holding_cargo_is_not_interruptible() {
        let h = Harness::new(params(
            TransferEnd::Object(ObjectId::new("c1")),
            TransferEnd::Object(ObjectId::new("spawn")),
            50,
        ));
        h.world.add_store("c1", ObjectKind::Container, Position::new("Z", 5, 5), 500, 2000);
        h.world.add_store("spawn", ObjectKind::Spawn, Position::new("Z", 30, 5), 0, 300);
        h.world.add_agent("H", Position::new("Z", 4, 5), hauler(), 1500);
        let mut h = h.with_assigned(&["H"]);

        let name = AgentName::new("H");
        for _ in 0..3 {
            h.tick(&TransportMachine, "H").unwrap();
            h.world.advance();
        }
        assert!(!h.memory.creep(&name).unwrap().interruptible);
        assert_eq!(run_to_end(&mut h, "H", 40), Outcome::Done);
        assert!(h.memory.creep(&name).unwrap().interruptible);
    }

    #[test]
    fn vanished_source_aborts_empty_handed() {
        let mut h = Harness::new(params(
            TransferEnd::Object(ObjectId::new("gone")),
            TransferEnd::Object(ObjectId::new("spawn")),
            50,
        ));
        h.world.add_agent("H", Position::new("Z", 4, 5), hauler(), 1500);
        h.set_state("H", &TransportState::Pickup);
        let report = h.tick(&TransportMachine, "H").unwrap();
        assert!(matches!(report.outcome, Outcome::Abort(_)));
    }

    #[test]
    fn resumes_identically_from_serialized_memory() {
        let setup = || {
            let h = Harness::new(params(
                TransferEnd::Object(ObjectId::new("c1")),
                TransferEnd::Object(ObjectId::new("spawn")),
                100,
            ));
            h.world.add_store("c1", ObjectKind::Container, Position::new("Z", 5, 5), 500, 2000);
            h.world.add_store("spawn", ObjectKind::Spawn, Position::new("Z", 12, 5), 0, 300);
            h.world.add_agent("H", Position::new("Z", 1, 5), hauler(), 1500);
            h.with_assigned(&["H"])
        };

        let mut live = setup();
        let mut resumed = setup();
        for _ in 0..4 {
            live.tick(&TransportMachine, "H").unwrap();
            live.world.advance();
            resumed.tick(&TransportMachine, "H").unwrap();
            resumed.world.advance();
        }
        let json = serde_json::to_string(&resumed.memory).unwrap();
        resumed.memory = serde_json::from_str(&json).unwrap();

        for _ in 0..10 {
            let a = live.tick(&TransportMachine, "H").unwrap();
            let b = resumed.tick(&TransportMachine, "H").unwrap();
            assert_eq!(a, b);
            assert_eq!(live.memory, resumed.memory);
            live.world.advance();
            resumed.world.advance();
        }
    }
}
