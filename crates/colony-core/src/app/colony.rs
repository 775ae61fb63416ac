//! Colony - 1 tick 分のパイプラインを持つ集約
//!
//! # 1 tick の流れ
//! 1. **generate**: ワールドを観測してタスクを作る
//! 2. **match**: supply/demand を突き合わせて Transport タスクを作る
//! 3. **schedule**: idle agent をタスクに割り当てる
//! 4. **execute**: binding ごとに FSM を 1 step 進める
//! 5. **cleanup**: 消えた agent・期限切れ・保持期間切れの掃除
//!
//! 各 phase は `PhaseGuard` 越しに実行されるので、1 つが失敗しても
//! 残りは走る。

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::driver::{DriverReport, ExecutionDriver};
use super::guard::{PhaseGuard, PhaseRun};
use crate::config::ColonyConfig;
use crate::domain::{AgentName, PersistenceError, Tick};
use crate::generator::TaskGenerator;
use crate::matcher::{SupplyDemand, SupplySnapshot};
use crate::ports::{Clock, EventSink, IdGenerator, WorldPorts};
use crate::priority::PriorityCalculator;
use crate::scheduler::Scheduler;
use crate::store::{CleanupReport, StatusCounts, TaskCounters, TaskStore, TaskStoreSnapshot};

/// Everything that survives between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonySnapshot {
    pub version: u32,
    pub tick: Tick,
    pub saved_at: DateTime<Utc>,
    pub tasks: TaskStoreSnapshot,
    pub supply: SupplySnapshot,
}

impl ColonySnapshot {
    pub const VERSION: u32 = 1;

    pub fn empty(tick: Tick) -> Self {
        Self {
            version: Self::VERSION,
            tick,
            saved_at: DateTime::<Utc>::default(),
            tasks: TaskStoreSnapshot::default(),
            supply: SupplySnapshot::default(),
        }
    }

    /// Parse and reject snapshots written by a newer format.
    pub fn decode(json: &str) -> Result<Self, PersistenceError> {
        let snapshot: ColonySnapshot = serde_json::from_str(json)?;
        if snapshot.version > Self::VERSION {
            return Err(PersistenceError::Version {
                found: snapshot.version,
                expected: Self::VERSION,
            });
        }
        Ok(snapshot)
    }
}

/// What one `run_tick` did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub generated: usize,
    pub transport_jobs: usize,
    pub assignments: usize,
    pub driver: Option<DriverReport>,
    pub cleanup: Option<CleanupReport>,
    /// Phases that failed or were cooling down.
    pub degraded: Vec<&'static str>,
}

pub struct Colony {
    pub(crate) config: ColonyConfig,
    pub(crate) store: TaskStore,
    pub(crate) supply: SupplyDemand,
    pub(crate) generator: TaskGenerator,
    pub(crate) scheduler: Scheduler,
    pub(crate) driver: ExecutionDriver,
    pub(crate) guard: PhaseGuard,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) id_gen: Arc<dyn IdGenerator>,
    pub(crate) sink: Box<dyn EventSink>,
}

impl Colony {
    pub fn config(&self) -> &ColonyConfig {
        &self.config
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn supply(&self) -> &SupplyDemand {
        &self.supply
    }

    /// For registering providers and consumers.
    pub fn supply_mut(&mut self) -> &mut SupplyDemand {
        &mut self.supply
    }

    pub fn guard(&self) -> &PhaseGuard {
        &self.guard
    }

    pub fn counters(&self) -> &TaskCounters {
        self.store.counters()
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.store.status_counts()
    }

    /// Run every phase once.
    pub fn run_tick(&mut self, ports: WorldPorts<'_>, now: Tick) -> TickSummary {
        let mut summary = TickSummary {
            tick: now,
            ..TickSummary::default()
        };
        let Colony {
            store,
            supply,
            generator,
            scheduler,
            driver,
            guard,
            sink,
            ..
        } = self;

        let generated = guard.run("generate", now, || Ok(generator.update(store, ports.world, now)));
        summary.generated = record(&mut summary.degraded, "generate", generated).map_or(0, |ids| ids.len());

        let matched = guard.run("match", now, || {
            let jobs = supply.update(ports.world, ports.movement, store, now);
            Ok(generator.ingest_transport(store, jobs, now))
        });
        summary.transport_jobs = record(&mut summary.degraded, "match", matched).map_or(0, |ids| ids.len());

        let scheduled = guard.run("schedule", now, || {
            Ok(scheduler.update(store, ports.world, ports.capabilities, now))
        });
        summary.assignments = record(&mut summary.degraded, "schedule", scheduled)
            .map_or(0, |pass| pass.assignments.len());

        let executed = guard.run("execute", now, || driver.run(store, ports, supply, now));
        summary.driver = record(&mut summary.degraded, "execute", executed);

        let cleaned = guard.run("cleanup", now, || {
            let live: BTreeSet<AgentName> = ports
                .world
                .live_agents()
                .into_iter()
                .map(|agent| agent.name)
                .collect();
            Ok(store.cleanup(&live, now))
        });
        summary.cleanup = record(&mut summary.degraded, "cleanup", cleaned);

        for event in store.drain_events() {
            sink.emit(&event);
        }

        let counts = store.status_counts();
        debug!(
            tick = now.0,
            generated = summary.generated,
            transport = summary.transport_jobs,
            assigned = summary.assignments,
            pending = counts.pending,
            in_progress = counts.in_progress,
            "tick done"
        );
        if !summary.degraded.is_empty() {
            info!(tick = now.0, degraded = ?summary.degraded, "tick ran degraded");
        }
        summary
    }

    pub fn snapshot(&self, now: Tick) -> ColonySnapshot {
        ColonySnapshot {
            version: ColonySnapshot::VERSION,
            tick: now,
            saved_at: self.clock.now(),
            tasks: self.store.snapshot(),
            supply: self.supply.snapshot(),
        }
    }

    /// Replace the store and matcher state with a loaded snapshot.
    pub fn restore(&mut self, snapshot: ColonySnapshot) {
        self.store = TaskStore::restore(
            snapshot.tasks,
            self.config.store.clone(),
            Arc::clone(&self.id_gen),
        );
        self.supply = SupplyDemand::restore(snapshot.supply, self.config.matcher.clone());
    }
}

fn record<T>(degraded: &mut Vec<&'static str>, phase: &'static str, run: PhaseRun<T>) -> Option<T> {
    let value = run.ok();
    if value.is_none() {
        degraded.push(phase);
    }
    value
}

/// Priority calculator and scheduler wired from one config.
pub(crate) fn scheduler_for(config: &ColonyConfig) -> Scheduler {
    Scheduler::new(
        PriorityCalculator::new(config.priority.clone()),
        config.scheduler.clone(),
    )
}
