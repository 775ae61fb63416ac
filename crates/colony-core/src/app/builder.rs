//! ColonyBuilder - Colony の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 設定は build() 時に validate する
//! - expect_kinds() で期待される TaskKind を指定（既定は全種）
//! - 期待集合 ⊆ 登録済み集合 でなければ BuildError を返す

use std::sync::Arc;

use super::colony::{Colony, scheduler_for};
use super::driver::ExecutionDriver;
use super::guard::PhaseGuard;
use crate::config::{ColonyConfig, ConfigError};
use crate::domain::TaskKind;
use crate::fsm::{FsmRegistry, RegistryError, StateMachine};
use crate::generator::TaskGenerator;
use crate::impls::TracingEventSink;
use crate::matcher::SupplyDemand;
use crate::ports::{Clock, EventSink, IdGenerator, SystemClock, UlidGenerator};
use crate::store::TaskStore;

/// ColonyBuilder は Colony を構築
///
/// # 使用例
/// ```ignore
/// let colony = ColonyBuilder::new()
///     .with_config(config)
///     .with_standard_machines()
///     .build()?;
/// ```
pub struct ColonyBuilder {
    config: ColonyConfig,
    registry: FsmRegistry,
    expected: Vec<TaskKind>,
    clock: Option<Arc<dyn Clock>>,
    id_gen: Option<Arc<dyn IdGenerator>>,
    sink: Option<Box<dyn EventSink>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing state machines for task kinds: {0:?}")]
    MissingTaskKinds(Vec<TaskKind>),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl ColonyBuilder {
    pub fn new() -> Self {
        Self {
            config: ColonyConfig::default(),
            registry: FsmRegistry::new(),
            expected: TaskKind::ALL.to_vec(),
            clock: None,
            id_gen: None,
            sink: None,
        }
    }

    pub fn with_config(mut self, config: ColonyConfig) -> Self {
        self.config = config;
        self
    }

    /// Register one machine. A kind can only be registered once.
    pub fn register<M: StateMachine>(
        mut self,
        kind: TaskKind,
        machine: M,
    ) -> Result<Self, RegistryError> {
        self.registry.register(kind, machine)?;
        Ok(self)
    }

    /// Replace the registry with the built-in machines for every kind.
    pub fn with_standard_machines(mut self) -> Self {
        self.registry = FsmRegistry::standard();
        self
    }

    /// Narrow the kinds that must have a machine at build time.
    pub fn expect_kinds(mut self, kinds: &[TaskKind]) -> Self {
        self.expected = kinds.to_vec();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, id_gen: Arc<dyn IdGenerator>) -> Self {
        self.id_gen = Some(id_gen);
        self
    }

    pub fn event_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// # 検証
    /// - ColonyConfig::validate
    /// - expect_kinds の全種に machine が登録されているか
    pub fn build(self) -> Result<Colony, BuildError> {
        self.config.validate()?;

        let registered = self.registry.registered_kinds();
        let missing: Vec<TaskKind> = self
            .expected
            .iter()
            .filter(|kind| !registered.contains(kind))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingTaskKinds(missing));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let id_gen = self
            .id_gen
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let config = self.config;
        Ok(Colony {
            store: TaskStore::new(config.store.clone(), Arc::clone(&id_gen)),
            supply: SupplyDemand::new(config.matcher.clone()),
            generator: TaskGenerator::new(config.generator.clone()),
            scheduler: scheduler_for(&config),
            driver: ExecutionDriver::new(self.registry, config.fsm.clone()),
            guard: PhaseGuard::new(config.guard.clone()),
            clock,
            id_gen,
            sink: self.sink.unwrap_or_else(|| Box::new(TracingEventSink)),
            config,
        })
    }
}

impl Default for ColonyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
