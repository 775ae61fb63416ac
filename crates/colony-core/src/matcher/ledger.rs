//! Provider / consumer records of one zone.

use serde::{Deserialize, Serialize};

use crate::domain::{ObjectId, ObjectKind, Position, ResourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Persistent storage, registered explicitly.
    Storage,
    /// Rescanned every pass.
    Container,
    /// Ground drop, rescanned every pass.
    Drop,
}

impl ProviderKind {
    /// Whether a registration of this kind survives garbage collection.
    pub fn is_persistent(self) -> bool {
        matches!(self, ProviderKind::Storage)
    }

    pub fn from_object(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::Storage => Some(ProviderKind::Storage),
            ObjectKind::Container => Some(ProviderKind::Container),
            ObjectKind::DroppedResource => Some(ProviderKind::Drop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    Spawn,
    Extension,
    Tower,
    /// A builder/upgrader that asked for supply.
    Worker,
    Controller,
    Storage,
}

impl ConsumerKind {
    /// Fixed per-type weight: production buildings first, passive storage last.
    pub fn importance(self) -> f64 {
        match self {
            ConsumerKind::Spawn => 10.0,
            ConsumerKind::Extension => 9.0,
            ConsumerKind::Tower => 7.0,
            ConsumerKind::Worker => 5.0,
            ConsumerKind::Controller => 3.0,
            ConsumerKind::Storage => 1.0,
        }
    }

    pub fn from_object(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::Spawn => Some(ConsumerKind::Spawn),
            ObjectKind::Extension => Some(ConsumerKind::Extension),
            ObjectKind::Tower => Some(ConsumerKind::Tower),
            ObjectKind::Storage => Some(ConsumerKind::Storage),
            ObjectKind::Container | ObjectKind::Controller => Some(ConsumerKind::Controller),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub id: ObjectId,
    pub kind: ProviderKind,
    pub position: Position,
    pub resource: ResourceType,
    pub amount: u32,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Consumer {
    pub id: ObjectId,
    pub kind: ConsumerKind,
    pub position: Position,
    pub resource: ResourceType,
    pub capacity: u32,
    pub needs: u32,
}

impl Consumer {
    /// `importance · needs / capacity`.
    pub fn priority(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.kind.importance() * f64::from(self.needs) / f64::from(self.capacity)
    }

    /// Storage never feeds storage, and nothing feeds itself.
    pub fn accepts_from(&self, provider: &Provider) -> bool {
        provider.resource == self.resource
            && provider.id != self.id
            && !(provider.kind == ProviderKind::Storage && self.kind == ConsumerKind::Storage)
    }
}

/// Everything known about one zone for the current pass.
#[derive(Debug, Clone, Default)]
pub struct ZoneLedger {
    pub providers: Vec<Provider>,
    pub consumers: Vec<Consumer>,
}
