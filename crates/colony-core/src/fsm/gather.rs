//! Gather: harvest a source from an exclusively claimed spot and dump the
//! cargo when full.
//!
//! ```text
//! Init → AcquireSpot → MoveToSpot → Harvest ⇄ Dump
//!                                      └→ Finished (depleted / expiring)
//! ```
//!
//! Spot claims live in the task-level state so that every agent on the
//! (Shared) task sees them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::context::StepContext;
use super::machine::{FsmState, StateMachine, Step};
use crate::domain::{
    AgentName, FsmError, ObjectId, ObjectKind, ObjectView, Position, ResourceType, TaskParams,
};
use crate::ports::{ActionResult, MoveOutcome, TransferTarget};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GatherState {
    Init,
    AcquireSpot,
    MoveToSpot { spot: Position },
    Harvest { spot: Position },
    Dump { spot: Position },
    Finished,
}

impl FsmState for GatherState {
    fn initial() -> Self {
        GatherState::Init
    }

    fn finished() -> Self {
        GatherState::Finished
    }

    fn name(&self) -> &'static str {
        match self {
            GatherState::Init => "init",
            GatherState::AcquireSpot => "acquire_spot",
            GatherState::MoveToSpot { .. } => "move_to_spot",
            GatherState::Harvest { .. } => "harvest",
            GatherState::Dump { .. } => "dump",
            GatherState::Finished => "finished",
        }
    }
}

/// Task-level state: which agent stands on which harvesting tile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpotClaims {
    pub claims: BTreeMap<AgentName, Position>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GatherMachine;

impl StateMachine for GatherMachine {
    type State = GatherState;

    fn name(&self) -> &'static str {
        "gather"
    }

    fn step(
        &self,
        state: &GatherState,
        ctx: &mut StepContext<'_>,
    ) -> Result<Step<GatherState>, FsmError> {
        let TaskParams::Harvest { source, .. } = ctx.params else {
            return Err(FsmError::ParamsMismatch {
                machine: self.name(),
                found: ctx.params.kind(),
            });
        };
        let source = source.clone();

        match state {
            GatherState::Init => Ok(Step::to(GatherState::AcquireSpot, "start")),
            GatherState::AcquireSpot => acquire_spot(ctx, &source),
            GatherState::MoveToSpot { spot } => {
                if ctx.world().object(&source).is_none() {
                    release_spot(ctx)?;
                    return Ok(Step::abort("source gone"));
                }
                match ctx.movement().step_toward(ctx.name(), spot, 0) {
                    MoveOutcome::InRange => Ok(Step::to(
                        GatherState::Harvest { spot: spot.clone() },
                        "at spot",
                    )),
                    MoveOutcome::Moving => Ok(Step::to(state.clone(), "moving to spot")),
                    MoveOutcome::NoPath => {
                        release_spot(ctx)?;
                        Ok(Step::to(GatherState::AcquireSpot, "spot unreachable"))
                    }
                }
            }
            GatherState::Harvest { spot } => harvest(ctx, &source, spot),
            GatherState::Dump { spot } => dump(ctx, spot),
            GatherState::Finished => Ok(Step::done("finished")),
        }
    }
}

fn acquire_spot(
    ctx: &mut StepContext<'_>,
    source: &ObjectId,
) -> Result<Step<GatherState>, FsmError> {
    if ctx.world().object(source).is_none() {
        return Ok(Step::abort("source gone"));
    }

    let mut claims: SpotClaims = ctx.task_state()?;
    let assigned = ctx.assigned;
    claims.claims.retain(|agent, _| assigned.contains(agent));

    if let Some(spot) = claims.claims.get(ctx.name()).cloned() {
        ctx.set_task_state(&claims)?;
        return Ok(Step::to(GatherState::MoveToSpot { spot }, "spot already claimed"));
    }

    let here = &ctx.agent.position;
    let free = ctx
        .world()
        .harvest_spots(source)
        .into_iter()
        .filter(|spot| !claims.claims.values().any(|claimed| claimed == spot))
        .min_by(|a, b| {
            let da = here.range_to(a).unwrap_or(u32::MAX);
            let db = here.range_to(b).unwrap_or(u32::MAX);
            da.cmp(&db).then_with(|| a.cmp(b))
        });

    let Some(spot) = free else {
        ctx.set_task_state(&claims)?;
        return Ok(Step::to(GatherState::AcquireSpot, "no free spot"));
    };
    claims.claims.insert(ctx.name().clone(), spot.clone());
    ctx.set_task_state(&claims)?;
    Ok(Step::to(GatherState::MoveToSpot { spot }, "spot claimed"))
}

fn release_spot(ctx: &mut StepContext<'_>) -> Result<(), FsmError> {
    let mut claims: SpotClaims = ctx.task_state()?;
    if claims.claims.remove(ctx.name()).is_some() {
        ctx.set_task_state(&claims)?;
    }
    Ok(())
}

fn harvest(
    ctx: &mut StepContext<'_>,
    source: &ObjectId,
    spot: &Position,
) -> Result<Step<GatherState>, FsmError> {
    let Some(node) = ctx.world().object(source) else {
        release_spot(ctx)?;
        return Ok(Step::abort("source gone"));
    };
    let can_carry = ctx.agent.carry_capacity > 0;

    if ctx.expiring() {
        release_spot(ctx)?;
        return Ok(Step::done("agent expiring"));
    }
    if node.stored(ResourceType::Energy) == 0 {
        if can_carry && !ctx.agent.is_empty() {
            return Ok(Step::to(
                GatherState::Dump { spot: spot.clone() },
                "source depleted, dumping",
            )
            .holding());
        }
        release_spot(ctx)?;
        return Ok(Step::done("source depleted"));
    }
    if can_carry && ctx.agent.is_full() {
        return Ok(Step::to(GatherState::Dump { spot: spot.clone() }, "full").holding());
    }

    match ctx.actuator().harvest(ctx.name(), source) {
        ActionResult::Ok => Ok(Step::to(
            GatherState::Harvest { spot: spot.clone() },
            "harvesting",
        )),
        ActionResult::NotInRange => Ok(Step::to(
            GatherState::MoveToSpot { spot: spot.clone() },
            "drifted off spot",
        )),
        ActionResult::InvalidTarget => {
            release_spot(ctx)?;
            Ok(Step::abort("source invalid"))
        }
        other => Ok(Step::to(
            GatherState::Harvest { spot: spot.clone() },
            format!("harvest: {other:?}"),
        )),
    }
}

/// Drop where the agent stands. A refused drop ends this agent's part in the task.
fn drop_on_ground(
    ctx: &mut StepContext<'_>,
    resource: ResourceType,
    back: GatherState,
    reason: &str,
) -> Result<Step<GatherState>, FsmError> {
    match ctx.actuator().drop_resource(ctx.name(), resource, None) {
        ActionResult::Ok => Ok(Step::to(back, reason)),
        other => {
            release_spot(ctx)?;
            Ok(Step::abort(format!("cannot drop cargo: {other:?}")))
        }
    }
}

fn dump(ctx: &mut StepContext<'_>, spot: &Position) -> Result<Step<GatherState>, FsmError> {
    let back = GatherState::Harvest { spot: spot.clone() };
    let Some((&resource, _)) = ctx.agent.carry.iter().find(|(_, amount)| **amount > 0) else {
        return Ok(Step::to(back, "empty"));
    };

    let Some(target) = nearest_dump(ctx) else {
        return drop_on_ground(ctx, resource, back, "no storage, dropped on ground");
    };

    match ctx.movement().step_toward(ctx.name(), &target.position, 1) {
        MoveOutcome::Moving => Ok(Step::to(
            GatherState::Dump { spot: spot.clone() },
            "moving to storage",
        )
        .holding()),
        MoveOutcome::NoPath => {
            drop_on_ground(ctx, resource, back, "storage unreachable, dropped on ground")
        }
        MoveOutcome::InRange => {
            match ctx
                .actuator()
                .transfer(ctx.name(), TransferTarget::Object(&target.id), resource, None)
            {
                ActionResult::Ok => Ok(Step::to(
                    GatherState::MoveToSpot { spot: spot.clone() },
                    "dumped",
                )),
                other => Ok(Step::to(
                    GatherState::Dump { spot: spot.clone() },
                    format!("dump: {other:?}"),
                )
                .holding()),
            }
        }
    }
}

fn nearest_dump(ctx: &StepContext<'_>) -> Option<ObjectView> {
    let here = &ctx.agent.position;
    let world = ctx.world();
    let movement = ctx.movement();
    [
        ObjectKind::Spawn,
        ObjectKind::Extension,
        ObjectKind::Container,
        ObjectKind::Storage,
    ]
    .into_iter()
    .flat_map(|kind| world.find(&here.zone, kind))
    .filter(|obj| obj.kind.accepts_dump() && obj.free_capacity() > 0)
    .filter_map(|obj| movement.path_length(here, &obj.position).map(|d| (d, obj)))
    .min_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.id.cmp(&b.id)))
    .map(|(_, obj)| obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Loadout;
    use crate::fsm::Outcome;
    use crate::fsm::test_support::Harness;

    fn harvester() -> Loadout {
        Loadout {
            work: 2,
            carry: 1,
            mobility: 1,
            attack: 0,
        }
    }

    fn params() -> TaskParams {
        TaskParams::Harvest {
            source: ObjectId::new("src"),
            position: Position::new("Z", 10, 10),
        }
    }

    #[test]
    fn two_harvesters_claim_distinct_spots() {
        let h = Harness::new(params());
        h.world.add_source("src", Position::new("Z", 10, 10), 3000);
        h.world.add_agent("A", Position::new("Z", 5, 10), harvester(), 1500);
        h.world.add_agent("B", Position::new("Z", 5, 10), harvester(), 1500);
        let mut h = h.with_assigned(&["A", "B"]);

        for _ in 0..2 {
            h.tick(&GatherMachine, "A").unwrap();
            h.tick(&GatherMachine, "B").unwrap();
        }
        let claims: SpotClaims =
            serde_json::from_value(h.memory.task_state.clone().unwrap()).unwrap();
        let a = &claims.claims[&AgentName::new("A")];
        let b = &claims.claims[&AgentName::new("B")];
        assert_ne!(a, b);
    }

    #[test]
    fn spot_claims_survive_serialization() {
        let setup = || {
            let h = Harness::new(params());
            h.world.add_source("src", Position::new("Z", 10, 10), 3000);
            h.world.add_agent("A", Position::new("Z", 5, 10), harvester(), 1500);
            h.world.add_agent("B", Position::new("Z", 5, 10), harvester(), 1500);
            h.with_assigned(&["A", "B"])
        };

        let mut live = setup();
        let mut resumed = setup();
        // A claims its spot, B has not yet
        for agent in ["A", "B", "A"] {
            live.tick(&GatherMachine, agent).unwrap();
            resumed.tick(&GatherMachine, agent).unwrap();
        }
        let json = serde_json::to_string(&resumed.memory).unwrap();
        resumed.memory = serde_json::from_str(&json).unwrap();

        for _ in 0..6 {
            for agent in ["B", "A"] {
                let a = live.tick(&GatherMachine, agent).unwrap();
                let b = resumed.tick(&GatherMachine, agent).unwrap();
                assert_eq!(a, b);
            }
            assert_eq!(live.memory, resumed.memory);
            live.world.advance();
            resumed.world.advance();
        }

        let claims: SpotClaims =
            serde_json::from_value(resumed.memory.task_state.clone().unwrap()).unwrap();
        assert_eq!(claims.claims.len(), 2);
        assert_ne!(
            claims.claims[&AgentName::new("A")],
            claims.claims[&AgentName::new("B")]
        );
    }

    #[test]
    fn harvests_fills_up_and_dumps_into_storage() {
        let h = Harness::new(params());
        h.world.add_source("src", Position::new("Z", 10, 10), 3000);
        h.world
            .add_store("storage", ObjectKind::Storage, Position::new("Z", 14, 10), 0, 10_000);
        h.world.add_agent("A", Position::new("Z", 11, 10), harvester(), 1500);
        let mut h = h.with_assigned(&["A"]);

        for _ in 0..40 {
            h.tick(&GatherMachine, "A").unwrap();
            h.world.advance();
        }
        let storage = h.object("storage");
        assert!(storage.stored(ResourceType::Energy) > 0);
    }

    #[test]
    fn ground_drop_when_no_storage() {
        let h = Harness::new(params());
        h.world.add_source("src", Position::new("Z", 10, 10), 3000);
        h.world.add_agent("A", Position::new("Z", 11, 10), harvester(), 1500);
        h.world.set_carry(&AgentName::new("A"), ResourceType::Energy, 50);
        let mut h = h.with_assigned(&["A"]);
        h.set_state("A", &GatherState::Dump { spot: Position::new("Z", 11, 10) });

        let report = h.tick(&GatherMachine, "A").unwrap();
        assert_eq!(report.state, "harvest");
        assert_eq!(h.world.drops_at(&Position::new("Z", 11, 10)), 50);
    }

    #[test]
    fn refused_ground_drop_gives_up_the_spot() {
        let h = Harness::new(params());
        h.world.add_source("src", Position::new("Z", 10, 10), 3000);
        h.world.add_agent("A", Position::new("Z", 5, 10), harvester(), 1500);
        let mut h = h.with_assigned(&["A"]);
        for _ in 0..2 {
            h.tick(&GatherMachine, "A").unwrap();
        }
        let claims: SpotClaims =
            serde_json::from_value(h.memory.task_state.clone().unwrap()).unwrap();
        let claimed = claims.claims[&AgentName::new("A")].clone();

        h.world.remove_agent(&AgentName::new("A"));
        h.world.add_agent("A", claimed.clone(), harvester(), 1500);
        h.world.set_carry(&AgentName::new("A"), ResourceType::Energy, 50);
        h.world.forbid_drops(claimed.clone());
        h.set_state("A", &GatherState::Dump { spot: claimed.clone() });

        let report = h.tick(&GatherMachine, "A").unwrap();
        assert!(matches!(report.outcome, Outcome::Abort(_)));
        assert_eq!(h.world.drops_at(&claimed), 0);
        let claims: SpotClaims =
            serde_json::from_value(h.memory.task_state.clone().unwrap()).unwrap();
        assert!(claims.claims.is_empty());
    }

    #[test]
    fn finishes_when_source_depleted() {
        let h = Harness::new(params());
        h.world.add_source("src", Position::new("Z", 10, 10), 0);
        h.world.add_agent("A", Position::new("Z", 11, 10), harvester(), 1500);
        let mut h = h.with_assigned(&["A"]);
        h.set_state("A", &GatherState::Harvest { spot: Position::new("Z", 11, 10) });

        let report = h.tick(&GatherMachine, "A").unwrap();
        assert!(report.finished);
        assert_eq!(report.outcome, Outcome::Done);
    }

    #[test]
    fn vanished_source_aborts() {
        let h = Harness::new(params());
        h.world.add_agent("A", Position::new("Z", 11, 10), harvester(), 1500);
        let mut h = h.with_assigned(&["A"]);
        h.set_state("A", &GatherState::AcquireSpot);
        let report = h.tick(&GatherMachine, "A").unwrap();
        assert!(matches!(report.outcome, Outcome::Abort(_)));
    }
}
