//! Single-task harness for stepping machines against a `SimWorld`.

use std::collections::BTreeSet;

use serde::Serialize;
use ulid::Ulid;

use super::context::StepEnv;
use super::erased::TypedMachine;
use super::machine::StateMachine;
use super::runtime::{TickReport, tick};
use crate::config::{FsmConfig, MatcherConfig};
use crate::domain::{
    AgentName, CreepState, FsmError, FsmMemory, ObjectId, ObjectView, TaskId, TaskParams, Tick,
};
use crate::impls::{LoadoutCapabilities, SimWorld};
use crate::matcher::SupplyDemand;
use crate::ports::{WorldPorts, WorldQuery};

pub struct Harness {
    pub world: SimWorld,
    pub supply: SupplyDemand,
    pub memory: FsmMemory,
    pub config: FsmConfig,
    pub params: TaskParams,
    pub task: TaskId,
    pub assigned: BTreeSet<AgentName>,
}

impl Harness {
    pub fn new(params: TaskParams) -> Self {
        Self {
            world: SimWorld::new(Tick(0)),
            supply: SupplyDemand::new(MatcherConfig::default()),
            memory: FsmMemory::default(),
            config: FsmConfig::default(),
            params,
            task: TaskId::from_ulid(Ulid::new()),
            assigned: BTreeSet::new(),
        }
    }

    pub fn with_assigned(mut self, agents: &[&str]) -> Self {
        self.assigned = agents.iter().map(|a| AgentName::new(*a)).collect();
        self
    }

    pub fn set_state<S: Serialize>(&mut self, agent: &str, state: &S) {
        let value = serde_json::to_value(state).unwrap();
        self.memory
            .creep_states
            .insert(AgentName::new(agent), CreepState::new(value));
    }

    pub fn tick<M: StateMachine + Copy>(
        &mut self,
        machine: &M,
        agent: &str,
    ) -> Result<TickReport, FsmError> {
        let erased = TypedMachine::new(*machine);
        let view = self.world.agent(&AgentName::new(agent)).unwrap();
        let env = StepEnv {
            now: self.world.tick(),
            task: self.task,
            agent: &view,
            params: &self.params,
            assigned: &self.assigned,
            ports: WorldPorts {
                world: &self.world,
                movement: &self.world,
                actuator: &self.world,
                capabilities: &LoadoutCapabilities,
            },
            supply: &mut self.supply,
            config: &self.config,
        };
        tick(&erased, &mut self.memory, env)
    }

    pub fn object(&self, id: &str) -> ObjectView {
        self.world.object(&ObjectId::new(id)).unwrap()
    }
}
