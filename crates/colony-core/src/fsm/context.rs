//! Everything a state machine may look at or touch during one step.

use std::collections::BTreeSet;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::FsmConfig;
use crate::domain::{AgentName, AgentView, FsmError, TaskId, TaskParams, Tick};
use crate::matcher::SupplyDemand;
use crate::ports::{Actuator, Movement, WorldPorts, WorldQuery};

/// Per-step inputs assembled by the execution driver.
pub struct StepEnv<'a> {
    pub now: Tick,
    pub task: TaskId,
    pub agent: &'a AgentView,
    pub params: &'a TaskParams,
    pub assigned: &'a BTreeSet<AgentName>,
    pub ports: WorldPorts<'a>,
    pub supply: &'a mut SupplyDemand,
    pub config: &'a FsmConfig,
}

pub struct StepContext<'a> {
    pub now: Tick,
    pub task: TaskId,
    /// Fresh view of the agent being stepped.
    pub agent: &'a AgentView,
    pub params: &'a TaskParams,
    /// Agents currently bound to the task (including this one).
    pub assigned: &'a BTreeSet<AgentName>,
    pub ports: WorldPorts<'a>,
    pub supply: &'a mut SupplyDemand,
    pub config: &'a FsmConfig,
    task_state: &'a mut Option<serde_json::Value>,
}

impl<'a> StepContext<'a> {
    pub fn new(env: StepEnv<'a>, task_state: &'a mut Option<serde_json::Value>) -> Self {
        Self {
            now: env.now,
            task: env.task,
            agent: env.agent,
            params: env.params,
            assigned: env.assigned,
            ports: env.ports,
            supply: env.supply,
            config: env.config,
            task_state,
        }
    }

    pub fn world(&self) -> &'a dyn WorldQuery {
        self.ports.world
    }

    pub fn movement(&self) -> &'a dyn Movement {
        self.ports.movement
    }

    pub fn actuator(&self) -> &'a dyn Actuator {
        self.ports.actuator
    }

    pub fn name(&self) -> &'a AgentName {
        &self.agent.name
    }

    /// Remaining lifetime is below the safety threshold.
    pub fn expiring(&self) -> bool {
        self.agent.ticks_to_live < self.config.ttl_safety_ticks
    }

    /// Task-level state shared by every agent on the task; default when unset.
    pub fn task_state<T: DeserializeOwned + Default>(&self) -> Result<T, FsmError> {
        match self.task_state.as_ref() {
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(FsmError::CorruptTaskState)
            }
            None => Ok(T::default()),
        }
    }

    pub fn set_task_state<T: Serialize>(&mut self, value: &T) -> Result<(), FsmError> {
        *self.task_state = Some(serde_json::to_value(value).map_err(FsmError::Encode)?);
        Ok(())
    }
}
