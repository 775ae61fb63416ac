//! Scheduler - 毎 tick の割り当てパス
//!
//! Greedy, single-pass, priority-ordered matching of idle agents onto
//! assignable tasks:
//!
//! 1. idle agents = live agents without a binding (stop if none)
//! 2. assignable tasks scored by the priority calculator, zero scores dropped,
//!    sorted by score descending then task id ascending
//! 3. each task takes up to its remaining capacity of the best-scoring idle
//!    agents; bound agents leave the idle pool
//!
//! Per-agent score:
//! `capability_weight·fitness + proximity_weight·max(0,(D−d)/D) + idle_weight·free_carry`.

use std::cmp::Ordering;

use tracing::debug;

use crate::config::SchedulerConfig;
use crate::domain::{AgentName, AgentView, Position, TaskId, TaskKind, TaskParams, Tick, TransferEnd};
use crate::ports::{Capabilities, WorldQuery};
use crate::priority::PriorityCalculator;
use crate::store::TaskStore;

/// Bindings made by one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulePass {
    pub assignments: Vec<(TaskId, AgentName)>,
    pub idle_agents: usize,
    pub candidate_tasks: usize,
}

/// Snapshot of what the pass needs from a task; taken up front so the store
/// can be mutated while walking the list.
struct Candidate {
    id: TaskId,
    kind: TaskKind,
    anchor: Option<Position>,
    remaining: u32,
    /// Transport recipient; never delivers to itself.
    recipient: Option<AgentName>,
    score: f64,
}

pub struct Scheduler {
    priority: PriorityCalculator,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(priority: PriorityCalculator, config: SchedulerConfig) -> Self {
        Self { priority, config }
    }

    pub fn priority(&self) -> &PriorityCalculator {
        &self.priority
    }

    pub fn update(
        &self,
        store: &mut TaskStore,
        world: &dyn WorldQuery,
        capabilities: &dyn Capabilities,
        now: Tick,
    ) -> SchedulePass {
        let mut idle: Vec<AgentView> = world
            .live_agents()
            .into_iter()
            .filter(|a| !store.is_bound(&a.name))
            .collect();
        idle.sort_by(|a, b| a.name.cmp(&b.name));

        let mut pass = SchedulePass {
            idle_agents: idle.len(),
            ..SchedulePass::default()
        };
        if idle.is_empty() {
            return pass;
        }

        let candidates = self.rank_tasks(store, now);
        pass.candidate_tasks = candidates.len();

        for task in candidates {
            if idle.is_empty() {
                break;
            }
            if task.remaining == 0 {
                continue;
            }

            let mut scored: Vec<(usize, f64)> = idle
                .iter()
                .enumerate()
                .filter(|(_, agent)| capabilities.satisfies(agent, task.kind))
                .filter(|(_, agent)| task.recipient.as_ref() != Some(&agent.name))
                .map(|(i, agent)| (i, self.agent_score(agent, &task, capabilities)))
                .collect();
            scored.sort_by(|(ia, sa), (ib, sb)| {
                sb.partial_cmp(sa)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| idle[*ia].name.cmp(&idle[*ib].name))
            });

            let mut taken = Vec::new();
            for (index, score) in scored {
                if taken.len() as u32 >= task.remaining {
                    break;
                }
                let agent = &idle[index].name;
                if store.assign(task.id, agent, now) {
                    debug!(task = %task.id, agent = %agent, score, "scheduled");
                    pass.assignments.push((task.id, agent.clone()));
                    taken.push(index);
                }
            }

            // remove from the back so indices stay valid
            taken.sort_unstable_by(|a, b| b.cmp(a));
            for index in taken {
                idle.remove(index);
            }
        }

        pass
    }

    fn rank_tasks(&self, store: &TaskStore, now: Tick) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = store
            .assignable_tasks(now)
            .into_iter()
            .filter_map(|task| {
                let score = self.priority.effective_priority(task, now);
                (score > 0.0).then(|| Candidate {
                    id: task.id,
                    kind: task.kind,
                    anchor: task.params.anchor().cloned(),
                    remaining: task.remaining_capacity(),
                    recipient: match &task.params {
                        TaskParams::Transport {
                            to: TransferEnd::Agent(name),
                            ..
                        } => Some(name.clone()),
                        _ => None,
                    },
                    score,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates
    }

    fn agent_score(&self, agent: &AgentView, task: &Candidate, capabilities: &dyn Capabilities) -> f64 {
        let capability = capabilities.fitness(agent, task.kind).clamp(0.0, 1.0);
        let proximity = self.proximity(&agent.position, task.anchor.as_ref());
        let idle = agent.idle_capacity_fraction();
        self.config.capability_weight * capability
            + self.config.proximity_weight * proximity
            + self.config.idle_weight * idle
    }

    /// 0 across zones or when the task has no anchor.
    fn proximity(&self, from: &Position, anchor: Option<&Position>) -> f64 {
        let range = f64::from(self.config.proximity_range.max(1));
        anchor
            .and_then(|to| from.range_to(to))
            .map_or(0.0, |d| ((range - f64::from(d)) / range).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::{PriorityConfig, StoreConfig};
    use crate::domain::{Loadout, ObjectId, TaskParams, TaskPriority, TaskSpec, TaskStatus};
    use crate::impls::{LoadoutCapabilities, SimWorld};
    use crate::ports::{SystemClock, UlidGenerator};

    fn store() -> TaskStore {
        TaskStore::new(
            StoreConfig::default(),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(
            PriorityCalculator::new(PriorityConfig::default()),
            SchedulerConfig::default(),
        )
    }

    fn worker() -> Loadout {
        Loadout {
            work: 2,
            carry: 2,
            mobility: 2,
            attack: 0,
        }
    }

    fn build(site: &str, x: i32) -> TaskParams {
        TaskParams::Build {
            site: ObjectId::new(site),
            position: Position::new("Z", x, 10),
        }
    }

    #[test]
    fn no_idle_agents_is_a_no_op() {
        let world = SimWorld::new(Tick(0));
        let mut store = store();
        store.create_task(TaskSpec::exclusive(build("s", 1), TaskPriority::High), Tick(0));
        let pass = scheduler().update(&mut store, &world, &LoadoutCapabilities, Tick(0));
        assert!(pass.assignments.is_empty());
        assert_eq!(pass.candidate_tasks, 0);
    }

    #[test]
    fn higher_priority_task_is_served_first() {
        let world = SimWorld::new(Tick(0));
        world.add_agent("A", Position::new("Z", 5, 10), worker(), 1500);
        let mut store = store();
        let low = store.create_task(TaskSpec::exclusive(build("low", 5), TaskPriority::Low), Tick(0));
        let high = store.create_task(TaskSpec::exclusive(build("high", 40), TaskPriority::High), Tick(0));

        let pass = scheduler().update(&mut store, &world, &LoadoutCapabilities, Tick(0));
        assert_eq!(pass.assignments, vec![(high, AgentName::new("A"))]);
        assert_eq!(store.get(low).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn shared_task_takes_nearest_agents_up_to_capacity() {
        let world = SimWorld::new(Tick(0));
        world.add_agent("far", Position::new("Z", 45, 10), worker(), 1500);
        world.add_agent("near", Position::new("Z", 11, 10), worker(), 1500);
        world.add_agent("mid", Position::new("Z", 20, 10), worker(), 1500);
        world.add_agent("other-zone", Position::new("Y", 10, 10), worker(), 1500);
        let mut store = store();
        let id = store.create_task(
            TaskSpec::shared(build("site", 10), TaskPriority::Normal, 2),
            Tick(0),
        );

        let pass = scheduler().update(&mut store, &world, &LoadoutCapabilities, Tick(0));
        let agents: Vec<&str> = pass.assignments.iter().map(|(_, a)| a.as_str()).collect();
        assert_eq!(agents, vec!["near", "mid"]);
        assert_eq!(store.get(id).unwrap().assigned_agents.len(), 2);
    }

    #[test]
    fn incapable_agents_are_never_selected() {
        let world = SimWorld::new(Tick(0));
        let hauler = Loadout {
            work: 0,
            carry: 4,
            mobility: 2,
            attack: 0,
        };
        world.add_agent("hauler", Position::new("Z", 10, 10), hauler, 1500);
        let mut store = store();
        store.create_task(TaskSpec::exclusive(build("site", 10), TaskPriority::Emergency), Tick(0));

        let pass = scheduler().update(&mut store, &world, &LoadoutCapabilities, Tick(0));
        assert!(pass.assignments.is_empty());
        assert!(!store.is_bound(&AgentName::new("hauler")));
    }

    #[test]
    fn transport_is_not_given_to_its_own_recipient() {
        let world = SimWorld::new(Tick(0));
        world.add_agent("B", Position::new("Z", 10, 10), worker(), 1500);
        let mut store = store();
        store.create_task(
            TaskSpec::exclusive(
                TaskParams::Transport {
                    from: TransferEnd::Object(ObjectId::new("c1")),
                    to: TransferEnd::Agent(AgentName::new("B")),
                    resource: crate::domain::ResourceType::Energy,
                    amount: 50,
                },
                TaskPriority::Normal,
            ),
            Tick(0),
        );

        let pass = scheduler().update(&mut store, &world, &LoadoutCapabilities, Tick(0));
        assert!(pass.assignments.is_empty());
    }

    #[test]
    fn equal_priorities_break_ties_by_task_id() {
        let world = SimWorld::new(Tick(0));
        world.add_agent("A", Position::new("Z", 10, 10), worker(), 1500);
        let mut store = store();
        let a = store.create_task(TaskSpec::exclusive(build("a", 10), TaskPriority::Normal), Tick(0));
        let b = store.create_task(TaskSpec::exclusive(build("b", 10), TaskPriority::Normal), Tick(0));
        let first = a.min(b);

        let pass = scheduler().update(&mut store, &world, &LoadoutCapabilities, Tick(0));
        assert_eq!(pass.assignments, vec![(first, AgentName::new("A"))]);
    }

    #[test]
    fn waiting_task_eventually_wins() {
        let world = SimWorld::new(Tick(0));
        let mut store = store();
        let old = store.create_task(TaskSpec::exclusive(build("old", 10), TaskPriority::Low), Tick(0));
        let sched = scheduler();

        // a fresh High task shows up every tick and takes the only agent
        let mut now = Tick(0);
        loop {
            now = now.plus(1);
            assert!(now.0 < 10_000, "low priority task starved");
            let name = format!("a{}", now.0);
            world.add_agent(&name, Position::new("Z", 10, 10), worker(), 1500);
            let fresh = store.create_task(
                TaskSpec::exclusive(build(&format!("new{}", now.0), 10), TaskPriority::High),
                now,
            );
            let pass = sched.update(&mut store, &world, &LoadoutCapabilities, now);
            if pass.assignments.iter().any(|(t, _)| *t == old) {
                break;
            }
            assert!(pass.assignments.iter().any(|(t, _)| *t == fresh));
            store.update_status(fresh, TaskStatus::Completed, now).unwrap();
            world.remove_agent(&AgentName::new(name));
        }
    }
}
