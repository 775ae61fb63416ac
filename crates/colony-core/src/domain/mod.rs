//! Domain model (ids, ticks and positions, world views, tasks, FSM memory, events).

pub mod errors;
pub mod events;
pub mod fsm_memory;
pub mod geometry;
pub mod ids;
pub mod state;
pub mod task;
pub mod world;

pub use errors::{CoreError, FsmError, PersistenceError};
pub use events::DomainEvent;
pub use fsm_memory::{CreepState, FsmMemory, StateRecord};
pub use geometry::{Position, Tick, ZoneId};
pub use ids::{AgentName, ObjectId, TaskId};
pub use state::{AssignmentType, TaskKind, TaskPriority, TaskStatus};
pub use task::{Task, TaskParams, TaskSpec, TransferEnd};
pub use world::{
    AgentView, Cargo, Loadout, Meter, ObjectKind, ObjectView, ResourceType, cargo_total,
};
