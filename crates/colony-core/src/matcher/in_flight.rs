//! Amounts already covered by active transport tasks.

use std::collections::BTreeMap;

use crate::domain::{ObjectId, ResourceType, TaskParams, TransferEnd};
use crate::store::TaskStore;

type Key = (ObjectId, ResourceType);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InFlight {
    outgoing: BTreeMap<Key, u32>,
    incoming: BTreeMap<Key, u32>,
}

impl InFlight {
    pub fn from_store(store: &TaskStore) -> Self {
        let mut in_flight = Self::default();
        for task in store.active_tasks() {
            if let TaskParams::Transport {
                from,
                to,
                resource,
                amount,
            } = &task.params
            {
                if let Some(id) = end_id(from) {
                    *in_flight.outgoing.entry((id, *resource)).or_default() += amount;
                }
                if let Some(id) = end_id(to) {
                    *in_flight.incoming.entry((id, *resource)).or_default() += amount;
                }
            }
        }
        in_flight
    }

    pub fn outgoing(&self, id: &ObjectId, resource: ResourceType) -> u32 {
        self.outgoing
            .get(&(id.clone(), resource))
            .copied()
            .unwrap_or(0)
    }

    pub fn incoming(&self, id: &ObjectId, resource: ResourceType) -> u32 {
        self.incoming
            .get(&(id.clone(), resource))
            .copied()
            .unwrap_or(0)
    }
}

fn end_id(end: &TransferEnd) -> Option<ObjectId> {
    match end {
        TransferEnd::Object(id) => Some(id.clone()),
        TransferEnd::Agent(name) => Some(ObjectId::from(name)),
        TransferEnd::Position(_) => None,
    }
}
