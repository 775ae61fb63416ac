//! ExecutionDriver - binding ごとに FSM を 1 tick 進めて結果を TaskStore に反映
//!
//! # 処理フロー（タスク単位）
//! 1. registry から machine を引く
//! 2. FsmMemory を TaskStore から借りる（`take_fsm`）
//! 3. bound agent ごとに `fsm::tick`（消えた agent は飛ばす）
//! 4. memory を返す（`restore_fsm`）
//! 5. 結果を反映: Abort / Err → `report_failure`、全員 Done → Completed、
//!    一部 Done → その agent の binding だけ外す

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, warn};

use crate::config::FsmConfig;
use crate::domain::{AgentName, CoreError, FsmMemory, TaskId, TaskStatus, Tick};
use crate::fsm::{FsmRegistry, Outcome, StepEnv, tick};
use crate::matcher::SupplyDemand;
use crate::ports::WorldPorts;
use crate::store::TaskStore;

/// Counts from one driver pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Agent steps actually run.
    pub stepped: usize,
    /// Bound agents that were not in the world this tick.
    pub skipped: usize,
    pub completed: Vec<TaskId>,
    /// Tasks sent to `report_failure` (aborts and errors).
    pub failed: Vec<TaskId>,
    /// Tasks whose step raised an error (subset of `failed`).
    pub errors: usize,
}

enum Verdict {
    Continue,
    Fail(String),
}

pub struct ExecutionDriver {
    registry: FsmRegistry,
    config: FsmConfig,
}

impl ExecutionDriver {
    pub fn new(registry: FsmRegistry, config: FsmConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &FsmRegistry {
        &self.registry
    }

    /// Step every binding once.
    ///
    /// Errors are contained per task; if any task errored the pass still
    /// completes and `CoreError::PartialFailure` is returned afterwards.
    pub fn run(
        &self,
        store: &mut TaskStore,
        ports: WorldPorts<'_>,
        supply: &mut SupplyDemand,
        now: Tick,
    ) -> Result<DriverReport, CoreError> {
        let mut by_task: BTreeMap<TaskId, Vec<AgentName>> = BTreeMap::new();
        for (agent, task) in store.bindings() {
            by_task.entry(task).or_default().push(agent);
        }

        let mut report = DriverReport::default();
        for (task_id, agents) in by_task {
            let result = self.run_task(store, ports, supply, task_id, &agents, now, &mut report);
            if let Err(err) = result {
                report.errors += 1;
                error!(task = %task_id, error = %err, "task step failed");
                fail(store, task_id, &err.to_string(), now, &mut report);
            }
        }

        if report.errors > 0 {
            return Err(CoreError::PartialFailure {
                phase: "execute",
                failures: report.errors,
            });
        }
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_task(
        &self,
        store: &mut TaskStore,
        ports: WorldPorts<'_>,
        supply: &mut SupplyDemand,
        task_id: TaskId,
        agents: &[AgentName],
        now: Tick,
        report: &mut DriverReport,
    ) -> Result<(), CoreError> {
        let Some(task) = store.get(task_id) else {
            return Err(CoreError::TaskNotFound(task_id));
        };
        let kind = task.kind;
        let params = task.params.clone();
        let assigned = task.assigned_agents.clone();
        let machine = self
            .registry
            .get(kind)
            .ok_or(CoreError::NoStateMachine(kind))?;

        let mut memory = match store.take_fsm(task_id) {
            Ok(memory) => memory,
            Err(CoreError::FsmMemoryMissing { .. }) => {
                warn!(task = %task_id, "fsm memory missing, starting fresh");
                FsmMemory::default()
            }
            Err(err) => return Err(err),
        };

        let stepped_before = report.stepped;
        let mut done = BTreeSet::new();
        let mut verdict = Verdict::Continue;
        for agent in agents {
            let Some(view) = ports.world.agent(agent) else {
                report.skipped += 1;
                continue;
            };
            let env = StepEnv {
                now,
                task: task_id,
                agent: &view,
                params: &params,
                assigned: &assigned,
                ports,
                supply: &mut *supply,
                config: &self.config,
            };
            report.stepped += 1;
            match tick(machine.as_ref(), &mut memory, env) {
                Ok(step) => match step.outcome {
                    Outcome::Continue => {}
                    Outcome::Done => {
                        done.insert(agent.clone());
                    }
                    Outcome::Abort(reason) => {
                        // the whole task is reclaimed below, so the agents after
                        // this one are not stepped this tick
                        verdict = Verdict::Fail(reason);
                        break;
                    }
                },
                Err(source) => {
                    store.restore_fsm(task_id, memory);
                    return Err(CoreError::Fsm {
                        task: task_id,
                        agent: agent.clone(),
                        source,
                    });
                }
            }
        }
        store.restore_fsm(task_id, memory);
        if report.stepped > stepped_before {
            store.mark_started(task_id, now)?;
        }

        match verdict {
            Verdict::Fail(reason) => fail(store, task_id, &reason, now, report),
            Verdict::Continue if done.is_empty() => {}
            Verdict::Continue if assigned.iter().all(|a| done.contains(a)) => {
                store.update_status(task_id, TaskStatus::Completed, now)?;
                report.completed.push(task_id);
            }
            Verdict::Continue => {
                for agent in &done {
                    store.unassign_agent(agent, now);
                }
            }
        }
        Ok(())
    }
}

fn fail(store: &mut TaskStore, task_id: TaskId, reason: &str, now: Tick, report: &mut DriverReport) {
    match store.report_failure(task_id, reason, now) {
        Ok(status) => {
            debug!(task = %task_id, reason, status = ?status, "task failure reported");
            report.failed.push(task_id);
        }
        Err(err) => error!(task = %task_id, error = %err, "could not report failure"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::{MatcherConfig, StoreConfig};
    use crate::domain::{
        Loadout, ObjectId, ObjectKind, Position, ResourceType, TaskParams, TaskPriority, TaskSpec,
        TransferEnd,
    };
    use crate::domain::TaskKind;
    use crate::fsm::GatherMachine;
    use crate::impls::{LoadoutCapabilities, SimWorld};
    use crate::ports::{SystemClock, UlidGenerator};

    fn store() -> TaskStore {
        TaskStore::new(
            StoreConfig::default(),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }

    fn ports(world: &SimWorld) -> WorldPorts<'_> {
        WorldPorts {
            world,
            movement: world,
            actuator: world,
            capabilities: &LoadoutCapabilities,
        }
    }

    fn hauler() -> Loadout {
        Loadout {
            work: 0,
            carry: 4,
            mobility: 2,
            attack: 0,
        }
    }

    fn transport(from: &str, to: &str) -> TaskSpec {
        TaskSpec::exclusive(
            TaskParams::Transport {
                from: TransferEnd::Object(ObjectId::new(from)),
                to: TransferEnd::Object(ObjectId::new(to)),
                resource: ResourceType::Energy,
                amount: 50,
            },
            TaskPriority::High,
        )
    }

    #[test]
    fn finished_transport_completes_the_task() {
        let world = SimWorld::new(Tick(0));
        world.add_store("c1", ObjectKind::Container, Position::new("Z", 5, 5), 500, 2000);
        world.add_store("spawn", ObjectKind::Spawn, Position::new("Z", 7, 5), 0, 300);
        world.add_agent("H", Position::new("Z", 5, 6), hauler(), 1500);
        let mut store = store();
        let mut supply = SupplyDemand::new(MatcherConfig::default());
        let driver = ExecutionDriver::new(FsmRegistry::standard(), FsmConfig::default());
        let id = store.create_task(transport("c1", "spawn"), Tick(0));
        assert!(store.assign(id, &AgentName::new("H"), Tick(0)));

        let mut now = Tick(0);
        while store.get(id).unwrap().status.is_active() {
            assert!(now.0 < 20, "transport never completed");
            driver.run(&mut store, ports(&world), &mut supply, now).unwrap();
            world.advance();
            now = now.plus(1);
        }
        assert_eq!(store.get(id).unwrap().status, TaskStatus::Completed);
        assert!(!store.is_bound(&AgentName::new("H")));
    }

    #[test]
    fn abort_reclaims_for_retry() {
        let world = SimWorld::new(Tick(0));
        world.add_agent("H", Position::new("Z", 5, 6), hauler(), 1500);
        let mut store = store();
        let mut supply = SupplyDemand::new(MatcherConfig::default());
        let driver = ExecutionDriver::new(FsmRegistry::standard(), FsmConfig::default());
        let id = store.create_task(transport("gone", "spawn"), Tick(0));
        store.assign(id, &AgentName::new("H"), Tick(0));

        // init, then pickup finds nothing
        driver.run(&mut store, ports(&world), &mut supply, Tick(0)).unwrap();
        let report = driver.run(&mut store, ports(&world), &mut supply, Tick(1)).unwrap();

        assert_eq!(report.failed, vec![id]);
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(task.assigned_agents.is_empty());
    }

    #[test]
    fn abort_stops_the_remaining_agents_of_a_shared_task() {
        let world = SimWorld::new(Tick(0));
        let harvester = Loadout {
            work: 2,
            carry: 1,
            mobility: 1,
            attack: 0,
        };
        world.add_agent("A", Position::new("Z", 5, 5), harvester, 1500);
        world.add_agent("B", Position::new("Z", 6, 5), harvester, 1500);
        let mut store = store();
        let mut supply = SupplyDemand::new(MatcherConfig::default());
        let driver = ExecutionDriver::new(FsmRegistry::standard(), FsmConfig::default());
        let id = store.create_task(
            TaskSpec::shared(
                TaskParams::Harvest {
                    source: ObjectId::new("gone"),
                    position: Position::new("Z", 10, 10),
                },
                TaskPriority::Normal,
                2,
            ),
            Tick(0),
        );
        assert!(store.assign(id, &AgentName::new("A"), Tick(0)));
        assert!(store.assign(id, &AgentName::new("B"), Tick(0)));

        let first = driver.run(&mut store, ports(&world), &mut supply, Tick(0)).unwrap();
        assert_eq!(first.stepped, 2);
        // A aborts on the missing source; B is never stepped
        let second = driver.run(&mut store, ports(&world), &mut supply, Tick(1)).unwrap();
        assert_eq!(second.stepped, 1);
        assert_eq!(second.failed, vec![id]);
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(!store.is_bound(&AgentName::new("A")));
        assert!(!store.is_bound(&AgentName::new("B")));
    }

    #[test]
    fn vanished_agent_is_skipped() {
        let world = SimWorld::new(Tick(0));
        let mut store = store();
        let mut supply = SupplyDemand::new(MatcherConfig::default());
        let driver = ExecutionDriver::new(FsmRegistry::standard(), FsmConfig::default());
        let id = store.create_task(transport("c1", "spawn"), Tick(0));
        store.assign(id, &AgentName::new("ghost"), Tick(0));

        let report = driver.run(&mut store, ports(&world), &mut supply, Tick(0)).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.stepped, 0);
        assert!(store.is_bound(&AgentName::new("ghost")));
        // nobody worked on it yet
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.started_at, None);
    }

    #[test]
    fn shared_task_releases_early_finishers_and_completes_with_the_last() {
        let world = SimWorld::new(Tick(0));
        world.add_hostile("h1", Position::new("Z", 10, 10), 90);
        let soldier = Loadout {
            work: 0,
            carry: 0,
            mobility: 2,
            attack: 3,
        };
        // below the lifetime safety threshold: wraps up at once
        world.add_agent("S1", Position::new("Z", 9, 10), soldier, 10);
        world.add_agent("S2", Position::new("Z", 9, 10), soldier, 1500);
        let mut store = store();
        let mut supply = SupplyDemand::new(MatcherConfig::default());
        let driver = ExecutionDriver::new(FsmRegistry::standard(), FsmConfig::default());
        let id = store.create_task(
            TaskSpec::shared(
                TaskParams::Attack {
                    target: ObjectId::new("h1"),
                    position: Position::new("Z", 10, 10),
                },
                TaskPriority::Emergency,
                2,
            ),
            Tick(0),
        );
        assert!(store.assign(id, &AgentName::new("S1"), Tick(0)));
        assert!(store.assign(id, &AgentName::new("S2"), Tick(0)));

        let report = driver.run(&mut store, ports(&world), &mut supply, Tick(0)).unwrap();
        assert!(report.completed.is_empty());
        assert!(!store.is_bound(&AgentName::new("S1")));
        assert!(store.is_bound(&AgentName::new("S2")));
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(
            task.assigned_agents.iter().cloned().collect::<Vec<_>>(),
            vec![AgentName::new("S2")]
        );
        assert!(task.fsm.as_ref().unwrap().creep(&AgentName::new("S1")).is_none());

        let mut now = Tick(0);
        while store.get(id).unwrap().status.is_active() {
            assert!(now.0 < 10, "attack never completed");
            world.advance();
            now = now.plus(1);
            driver.run(&mut store, ports(&world), &mut supply, now).unwrap();
        }
        assert_eq!(store.get(id).unwrap().status, TaskStatus::Completed);
        assert!(!store.is_bound(&AgentName::new("S2")));
    }

    #[test]
    fn missing_machine_fails_only_that_task() {
        let world = SimWorld::new(Tick(0));
        world.add_source("src", Position::new("Z", 10, 10), 3000);
        let harvester = Loadout {
            work: 2,
            carry: 1,
            mobility: 1,
            attack: 0,
        };
        world.add_agent("A", Position::new("Z", 11, 10), harvester, 1500);
        world.add_agent("H", Position::new("Z", 5, 6), hauler(), 1500);
        let mut store = store();
        let mut supply = SupplyDemand::new(MatcherConfig::default());

        let mut registry = FsmRegistry::new();
        registry.register(TaskKind::Harvest, GatherMachine).unwrap();
        let driver = ExecutionDriver::new(registry, FsmConfig::default());

        let harvest = store.create_task(
            TaskSpec::shared(
                TaskParams::Harvest {
                    source: ObjectId::new("src"),
                    position: Position::new("Z", 10, 10),
                },
                TaskPriority::High,
                2,
            ),
            Tick(0),
        );
        let haul = store.create_task(transport("c1", "spawn"), Tick(0));
        store.assign(harvest, &AgentName::new("A"), Tick(0));
        store.assign(haul, &AgentName::new("H"), Tick(0));

        let err = driver
            .run(&mut store, ports(&world), &mut supply, Tick(0))
            .unwrap_err();
        assert!(matches!(err, CoreError::PartialFailure { failures: 1, .. }));
        assert_eq!(store.get(harvest).unwrap().status, TaskStatus::InProgress);
        assert_eq!(store.get(haul).unwrap().retry_count, 1);
    }
}
