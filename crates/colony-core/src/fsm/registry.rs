//! FsmRegistry - TaskKind → state machine の対応表
//!
//! The task kind set is closed, so this is a plain lookup table filled once
//! at startup. Registering a kind twice is an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::attack::AttackMachine;
use super::erased::{DynStateMachine, TypedMachine};
use super::gather::GatherMachine;
use super::machine::StateMachine;
use super::transport::TransportMachine;
use super::work::WorkMachine;
use crate::domain::TaskKind;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("state machine for task kind '{0}' is already registered")]
    AlreadyRegistered(TaskKind),
}

#[derive(Default, Clone)]
pub struct FsmRegistry {
    machines: BTreeMap<TaskKind, Arc<dyn DynStateMachine>>,
}

impl FsmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task kind wired to the machine that runs it.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.insert(TaskKind::Harvest, GatherMachine);
        registry.insert(TaskKind::Transport, TransportMachine);
        registry.insert(TaskKind::Build, WorkMachine);
        registry.insert(TaskKind::Upgrade, WorkMachine);
        registry.insert(TaskKind::Repair, WorkMachine);
        registry.insert(TaskKind::Attack, AttackMachine);
        registry
    }

    pub fn register<M: StateMachine>(
        &mut self,
        kind: TaskKind,
        machine: M,
    ) -> Result<(), RegistryError> {
        if self.machines.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered(kind));
        }
        self.insert(kind, machine);
        Ok(())
    }

    fn insert<M: StateMachine>(&mut self, kind: TaskKind, machine: M) {
        self.machines
            .insert(kind, Arc::new(TypedMachine::new(machine)));
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn DynStateMachine>> {
        self.machines.get(&kind).cloned()
    }

    pub fn registered_kinds(&self) -> Vec<TaskKind> {
        self.machines.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::{AttackMachine, GatherMachine, WorkMachine};

    #[test]
    fn register_and_get() {
        let mut registry = FsmRegistry::new();
        registry.register(TaskKind::Harvest, GatherMachine).unwrap();
        let machine = registry.get(TaskKind::Harvest).unwrap();
        assert_eq!(machine.machine_name(), "gather");
        assert!(registry.get(TaskKind::Attack).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = FsmRegistry::new();
        registry.register(TaskKind::Attack, AttackMachine).unwrap();
        let result = registry.register(TaskKind::Attack, AttackMachine);
        assert!(matches!(
            result,
            Err(RegistryError::AlreadyRegistered(TaskKind::Attack))
        ));
    }

    #[test]
    fn standard_registry_covers_every_kind() {
        let registry = FsmRegistry::standard();
        assert_eq!(registry.registered_kinds(), TaskKind::ALL.to_vec());
        assert_eq!(registry.get(TaskKind::Repair).unwrap().machine_name(), "work");
    }

    #[test]
    fn one_machine_can_serve_several_kinds() {
        let mut registry = FsmRegistry::new();
        for kind in [TaskKind::Build, TaskKind::Upgrade, TaskKind::Repair] {
            registry.register(kind, WorkMachine).unwrap();
        }
        assert_eq!(
            registry.registered_kinds(),
            vec![TaskKind::Build, TaskKind::Upgrade, TaskKind::Repair]
        );
    }
}
