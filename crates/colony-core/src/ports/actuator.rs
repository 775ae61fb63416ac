//! Actuator port - エージェントの 1 アクション
//!
//! FSM handler は 1 tick に 1 回だけ呼ぶ（副作用があるため）。

use crate::domain::{AgentName, ObjectId, ResourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionResult {
    Ok,
    NotInRange,
    /// Target or agent cannot hold more.
    Full,
    /// Not enough resources (agent empty, source depleted, pile gone).
    NotEnoughResources,
    InvalidTarget,
    /// Loadout lacks the needed part.
    NoBodyPart,
    Busy,
}

/// Receiver of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget<'a> {
    Object(&'a ObjectId),
    Agent(&'a AgentName),
}

pub trait Actuator {
    fn harvest(&self, agent: &AgentName, source: &ObjectId) -> ActionResult;

    /// Take from a container/storage; `None` means as much as fits.
    fn withdraw(
        &self,
        agent: &AgentName,
        from: &ObjectId,
        resource: ResourceType,
        amount: Option<u32>,
    ) -> ActionResult;

    fn pickup(&self, agent: &AgentName, drop: &ObjectId) -> ActionResult;

    /// `None` transfers everything of `resource`.
    fn transfer(
        &self,
        agent: &AgentName,
        to: TransferTarget<'_>,
        resource: ResourceType,
        amount: Option<u32>,
    ) -> ActionResult;

    /// Drop cargo on the ground at the agent's position.
    fn drop_resource(&self, agent: &AgentName, resource: ResourceType, amount: Option<u32>)
        -> ActionResult;

    fn build(&self, agent: &AgentName, site: &ObjectId) -> ActionResult;
    fn upgrade(&self, agent: &AgentName, controller: &ObjectId) -> ActionResult;
    fn repair(&self, agent: &AgentName, structure: &ObjectId) -> ActionResult;
    fn attack(&self, agent: &AgentName, target: &ObjectId) -> ActionResult;
}
