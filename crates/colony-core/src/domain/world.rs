//! Read-only views of the world handed to the core every tick.
//!
//! Views are snapshots: they are fetched fresh each tick and never cached
//! across ticks by identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::geometry::Position;
use super::ids::{AgentName, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Energy,
    Mineral,
}

/// Resource amounts held by an agent or a structure.
pub type Cargo = BTreeMap<ResourceType, u32>;

pub fn cargo_total(cargo: &Cargo) -> u32 {
    cargo.values().sum()
}

/// Body parts of an agent, fixed at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Loadout {
    pub work: u32,
    pub carry: u32,
    pub mobility: u32,
    pub attack: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub name: AgentName,
    pub position: Position,
    pub loadout: Loadout,
    pub carry: Cargo,
    pub carry_capacity: u32,
    pub ticks_to_live: u32,
}

impl AgentView {
    pub fn carried(&self, resource: ResourceType) -> u32 {
        self.carry.get(&resource).copied().unwrap_or(0)
    }

    pub fn carried_total(&self) -> u32 {
        cargo_total(&self.carry)
    }

    pub fn free_capacity(&self) -> u32 {
        self.carry_capacity.saturating_sub(self.carried_total())
    }

    pub fn is_full(&self) -> bool {
        self.carry_capacity > 0 && self.free_capacity() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.carried_total() == 0
    }

    /// Fraction of carrying capacity currently free (0 for agents that cannot carry).
    pub fn idle_capacity_fraction(&self) -> f64 {
        if self.carry_capacity == 0 {
            return 0.0;
        }
        f64::from(self.free_capacity()) / f64::from(self.carry_capacity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Source,
    ConstructionSite,
    Controller,
    Spawn,
    Extension,
    Tower,
    Container,
    Storage,
    Road,
    DroppedResource,
    Hostile,
}

impl ObjectKind {
    /// Structures that agents may dump harvested resources into.
    pub fn accepts_dump(self) -> bool {
        matches!(
            self,
            ObjectKind::Container | ObjectKind::Storage | ObjectKind::Spawn | ObjectKind::Extension
        )
    }

    /// Structures that agents may withdraw from.
    pub fn is_withdrawable(self) -> bool {
        matches!(self, ObjectKind::Container | ObjectKind::Storage)
    }

    pub fn is_structure(self) -> bool {
        matches!(
            self,
            ObjectKind::Spawn
                | ObjectKind::Extension
                | ObjectKind::Tower
                | ObjectKind::Container
                | ObjectKind::Storage
                | ObjectKind::Road
        )
    }
}

/// A (current, total) pair, e.g. construction progress or hit points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub current: u32,
    pub total: u32,
}

impl Meter {
    pub fn new(current: u32, total: u32) -> Self {
        Self { current, total }
    }

    pub fn is_full(&self) -> bool {
        self.current >= self.total
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        f64::from(self.current) / f64::from(self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectView {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub position: Position,
    /// Stored resources (for sources: remaining harvestable energy).
    #[serde(default)]
    pub store: Cargo,
    /// Total storage capacity across resources, `None` if the object has no store.
    pub store_capacity: Option<u32>,
    /// Construction progress, controller progress.
    pub progress: Option<Meter>,
    pub hits: Option<Meter>,
    /// Controller only: ticks until the controller downgrades.
    pub downgrade_in: Option<u32>,
}

impl ObjectView {
    pub fn stored(&self, resource: ResourceType) -> u32 {
        self.store.get(&resource).copied().unwrap_or(0)
    }

    pub fn free_capacity(&self) -> u32 {
        self.store_capacity
            .map(|cap| cap.saturating_sub(cargo_total(&self.store)))
            .unwrap_or(0)
    }
}
