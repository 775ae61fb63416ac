//! WorldQuery port - ワールドの観測
//!
//! 観測はすべて値（view）で返す。core は view をキャッシュせず、毎 tick 引き直す。

use crate::domain::{AgentName, AgentView, ObjectId, ObjectKind, ObjectView, Position, Tick, ZoneId};

pub trait WorldQuery {
    fn tick(&self) -> Tick;

    /// Zones the controller operates in.
    fn zones(&self) -> Vec<ZoneId>;

    /// The live agent set, sorted by name.
    fn live_agents(&self) -> Vec<AgentView>;

    fn agent(&self, name: &AgentName) -> Option<AgentView>;

    /// Object by stable id, `None` if it no longer exists.
    fn object(&self, id: &ObjectId) -> Option<ObjectView>;

    /// Candidate targets of `kind` inside `zone`.
    fn find(&self, zone: &ZoneId, kind: ObjectKind) -> Vec<ObjectView>;

    /// Walkable tiles an agent can harvest `source` from.
    fn harvest_spots(&self, source: &ObjectId) -> Vec<Position>;
}
