//! Task generator: turns observations and matcher output into tasks.
//!
//! Every observed candidate is de-duplicated against active tasks by its
//! params key, so running the generator every tick only creates what is
//! missing. Transport jobs already exclude what active transports cover, so a
//! job on a known route tops up a task nobody has started yet, or else
//! becomes a task of its own.

use tracing::debug;

use crate::config::GeneratorConfig;
use crate::domain::{
    ObjectKind, ObjectView, ResourceType, TaskId, TaskParams, TaskPriority, TaskSpec, Tick, ZoneId,
};
use crate::matcher::{ConsumerKind, TransportJob};
use crate::ports::WorldQuery;
use crate::store::TaskStore;

pub struct TaskGenerator {
    config: GeneratorConfig,
}

impl TaskGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Scan every zone and create missing Harvest/Build/Upgrade/Repair/Attack tasks.
    pub fn update(&self, store: &mut TaskStore, world: &dyn WorldQuery, now: Tick) -> Vec<TaskId> {
        let mut created = Vec::new();
        for zone in world.zones() {
            for spec in self.observe(world, &zone) {
                if let Some(id) = create_unique(store, spec, now) {
                    created.push(id);
                }
            }
        }
        created
    }

    /// One Exclusive Transport task per job, unless an unstarted task on the
    /// same route can carry the extra amount. Returns the created tasks.
    pub fn ingest_transport(
        &self,
        store: &mut TaskStore,
        jobs: Vec<TransportJob>,
        now: Tick,
    ) -> Vec<TaskId> {
        jobs.into_iter()
            .filter_map(|job| {
                let params = TaskParams::Transport {
                    from: job.from,
                    to: job.to,
                    resource: job.resource,
                    amount: job.amount,
                };
                let key = params.dedup_key();
                if store.top_up_transport(&key, job.amount, now).is_some() {
                    return None;
                }
                debug!(key = %key, amount = job.amount, "generating transport");
                let spec = TaskSpec::exclusive(params, transport_priority(job.consumer));
                Some(store.create_task(spec, now))
            })
            .collect()
    }

    fn observe(&self, world: &dyn WorldQuery, zone: &ZoneId) -> Vec<TaskSpec> {
        let cfg = &self.config;
        let mut specs = Vec::new();

        for source in world.find(zone, ObjectKind::Source) {
            if source.stored(ResourceType::Energy) == 0 {
                continue;
            }
            let spots = u32::try_from(world.harvest_spots(&source.id).len()).unwrap_or(u32::MAX);
            let max = spots.min(cfg.max_harvesters_per_source);
            if max == 0 {
                continue;
            }
            specs.push(TaskSpec::shared(
                TaskParams::Harvest {
                    source: source.id,
                    position: source.position,
                },
                TaskPriority::High,
                max,
            ));
        }

        for site in world.find(zone, ObjectKind::ConstructionSite) {
            specs.push(TaskSpec::shared(
                TaskParams::Build {
                    site: site.id,
                    position: site.position,
                },
                TaskPriority::Normal,
                cfg.builders_per_site,
            ));
        }

        for controller in world.find(zone, ObjectKind::Controller) {
            let emergency = controller
                .downgrade_in
                .is_some_and(|ticks| ticks < cfg.downgrade_emergency_ticks);
            let priority = if emergency {
                TaskPriority::Emergency
            } else {
                TaskPriority::Low
            };
            specs.push(TaskSpec::shared(
                TaskParams::Upgrade {
                    controller: controller.id,
                    position: controller.position,
                },
                priority,
                cfg.upgraders_per_controller,
            ));
        }

        for structure in self.damaged_structures(world, zone) {
            let priority = match structure.kind {
                ObjectKind::Road => TaskPriority::Low,
                _ => TaskPriority::Normal,
            };
            specs.push(TaskSpec::exclusive(
                TaskParams::Repair {
                    structure: structure.id,
                    position: structure.position,
                },
                priority,
            ));
        }

        for hostile in world.find(zone, ObjectKind::Hostile) {
            specs.push(TaskSpec::shared(
                TaskParams::Attack {
                    target: hostile.id,
                    position: hostile.position,
                },
                TaskPriority::Emergency,
                cfg.attackers_per_hostile,
            ));
        }

        specs
    }

    fn damaged_structures(&self, world: &dyn WorldQuery, zone: &ZoneId) -> Vec<ObjectView> {
        const KINDS: [ObjectKind; 6] = [
            ObjectKind::Spawn,
            ObjectKind::Extension,
            ObjectKind::Tower,
            ObjectKind::Container,
            ObjectKind::Storage,
            ObjectKind::Road,
        ];
        KINDS
            .into_iter()
            .flat_map(|kind| world.find(zone, kind))
            .filter(|obj| {
                obj.hits
                    .is_some_and(|hits| hits.ratio() < self.config.repair_threshold)
            })
            .collect()
    }
}

fn transport_priority(consumer: ConsumerKind) -> TaskPriority {
    match consumer {
        ConsumerKind::Spawn | ConsumerKind::Extension => TaskPriority::Critical,
        ConsumerKind::Tower => TaskPriority::High,
        ConsumerKind::Worker => TaskPriority::Normal,
        ConsumerKind::Controller => TaskPriority::Low,
        ConsumerKind::Storage => TaskPriority::Background,
    }
}

fn create_unique(store: &mut TaskStore, spec: TaskSpec, now: Tick) -> Option<TaskId> {
    let key = spec.params.dedup_key();
    if store.find_active_by_key(&key).is_some() {
        return None;
    }
    debug!(key = %key, "generating task");
    Some(store.create_task(spec, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::{MatcherConfig, StoreConfig};
    use crate::domain::{AgentName, Meter, ObjectId, Position, TaskKind, TaskStatus, TransferEnd};
    use crate::impls::SimWorld;
    use crate::matcher::SupplyDemand;
    use crate::ports::{SystemClock, UlidGenerator};

    fn store() -> TaskStore {
        TaskStore::new(
            StoreConfig::default(),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }

    fn generator() -> TaskGenerator {
        TaskGenerator::new(GeneratorConfig::default())
    }

    fn kinds(store: &TaskStore) -> Vec<TaskKind> {
        store.tasks().map(|t| t.kind).collect()
    }

    #[test]
    fn repeated_scans_do_not_duplicate_tasks() {
        let world = SimWorld::new(Tick(0));
        world.add_source("src", Position::new("Z", 10, 10), 3000);
        world.add_site("site", Position::new("Z", 20, 20), 0, 500);
        let mut store = store();

        assert_eq!(generator().update(&mut store, &world, Tick(0)).len(), 2);
        assert!(generator().update(&mut store, &world, Tick(1)).is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn finished_tasks_are_regenerated() {
        let world = SimWorld::new(Tick(0));
        world.add_site("site", Position::new("Z", 20, 20), 0, 500);
        let mut store = store();
        let first = generator().update(&mut store, &world, Tick(0));
        store.update_status(first[0], TaskStatus::Completed, Tick(1)).unwrap();
        assert_eq!(generator().update(&mut store, &world, Tick(2)).len(), 1);
    }

    #[test]
    fn harvest_capacity_is_bounded_by_free_spots() {
        let world = SimWorld::new(Tick(0));
        world.add_source("src", Position::new("Z", 10, 10), 3000);
        world.add_wall(Position::new("Z", 9, 9));
        world.add_wall(Position::new("Z", 10, 9));
        world.add_wall(Position::new("Z", 11, 9));
        world.add_wall(Position::new("Z", 9, 10));
        world.add_wall(Position::new("Z", 11, 10));
        world.add_wall(Position::new("Z", 9, 11));
        let mut store = store();

        generator().update(&mut store, &world, Tick(0));
        let task = store.tasks().next().unwrap();
        assert_eq!(task.kind, TaskKind::Harvest);
        assert_eq!(task.max_assignees, 2);
    }

    #[test]
    fn controller_near_downgrade_is_an_emergency() {
        let world = SimWorld::new(Tick(0));
        world.add_controller("ctrl", Position::new("Z", 25, 25), 500);
        let mut store = store();
        generator().update(&mut store, &world, Tick(0));
        let task = store.tasks().next().unwrap();
        assert_eq!(task.kind, TaskKind::Upgrade);
        assert_eq!(task.base_priority, TaskPriority::Emergency);
    }

    #[test]
    fn only_damaged_structures_get_repair_tasks() {
        let world = SimWorld::new(Tick(0));
        world.add_store("c1", ObjectKind::Container, Position::new("Z", 1, 1), 0, 2000);
        world.add_store("c2", ObjectKind::Container, Position::new("Z", 2, 2), 0, 2000);
        world.set_hits(&ObjectId::new("c1"), Meter::new(100, 1000));
        world.set_hits(&ObjectId::new("c2"), Meter::new(900, 1000));
        let mut store = store();

        generator().update(&mut store, &world, Tick(0));
        assert_eq!(kinds(&store), vec![TaskKind::Repair]);
        assert!(store.tasks().next().unwrap().is_exclusive());
    }

    #[test]
    fn hostiles_raise_attack_tasks() {
        let world = SimWorld::new(Tick(0));
        world.add_hostile("h1", Position::new("Z", 3, 3), 300);
        let mut store = store();
        generator().update(&mut store, &world, Tick(0));
        let task = store.tasks().next().unwrap();
        assert_eq!(task.kind, TaskKind::Attack);
        assert_eq!(task.base_priority, TaskPriority::Emergency);
        assert_eq!(task.max_assignees, 4);
    }

    #[test]
    fn transport_jobs_become_exclusive_tasks() {
        let job = TransportJob {
            from: TransferEnd::Object(ObjectId::new("c1")),
            from_position: Position::new("Z", 1, 1),
            to: TransferEnd::Object(ObjectId::new("spawn")),
            to_position: Position::new("Z", 5, 5),
            resource: ResourceType::Energy,
            amount: 200,
            consumer: ConsumerKind::Spawn,
        };
        let mut store = store();
        let ids = generator().ingest_transport(&mut store, vec![job.clone()], Tick(0));
        assert_eq!(ids.len(), 1);
        let task = store.get(ids[0]).unwrap();
        assert!(task.is_exclusive());
        assert_eq!(task.base_priority, TaskPriority::Critical);

        let again = TransportJob { amount: 50, ..job };
        assert!(generator().ingest_transport(&mut store, vec![again], Tick(1)).is_empty());
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.get(ids[0]).unwrap().params,
            TaskParams::Transport { amount: 250, .. }
        ));
    }

    #[test]
    fn shortfall_beside_a_started_transport_gets_its_own_task() {
        let job = TransportJob {
            from: TransferEnd::Object(ObjectId::new("c1")),
            from_position: Position::new("Z", 1, 1),
            to: TransferEnd::Object(ObjectId::new("spawn")),
            to_position: Position::new("Z", 5, 5),
            resource: ResourceType::Energy,
            amount: 100,
            consumer: ConsumerKind::Spawn,
        };
        let mut store = store();
        let first = generator().ingest_transport(&mut store, vec![job.clone()], Tick(0));
        assert!(store.assign(first[0], &AgentName::new("H"), Tick(0)));
        store.mark_started(first[0], Tick(1)).unwrap();

        let residual = TransportJob { amount: 60, ..job };
        let second = generator().ingest_transport(&mut store, vec![residual], Tick(2));
        assert_eq!(second.len(), 1);
        assert!(matches!(
            store.get(first[0]).unwrap().params,
            TaskParams::Transport { amount: 100, .. }
        ));
        assert!(matches!(
            store.get(second[0]).unwrap().params,
            TaskParams::Transport { amount: 60, .. }
        ));
    }

    #[test]
    fn matcher_residual_tops_up_the_waiting_transport() {
        let world = SimWorld::new(Tick(0));
        world.add_store("c1", ObjectKind::Container, Position::new("Z", 5, 5), 1000, 2000);
        world.add_store("spawn", ObjectKind::Spawn, Position::new("Z", 10, 10), 200, 300);
        let mut supply = SupplyDemand::new(MatcherConfig::default());
        let mut store = store();

        let jobs = supply.update(&world, &world, &store, Tick(0));
        let ids = generator().ingest_transport(&mut store, jobs, Tick(0));
        assert_eq!(ids.len(), 1);

        // the spawn drains before anyone picks the task up
        world.add_store("spawn", ObjectKind::Spawn, Position::new("Z", 10, 10), 0, 300);
        let jobs = supply.update(&world, &world, &store, Tick(1));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].amount, 200);
        assert!(generator().ingest_transport(&mut store, jobs, Tick(1)).is_empty());
        assert!(matches!(
            store.get(ids[0]).unwrap().params,
            TaskParams::Transport { amount: 300, .. }
        ));
        assert!(supply.update(&world, &world, &store, Tick(2)).is_empty());
    }
}
