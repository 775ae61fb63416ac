//! Task record and its creation spec.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::fsm_memory::FsmMemory;
use super::geometry::{Position, Tick};
use super::ids::{AgentName, ObjectId, TaskId};
use super::state::{AssignmentType, TaskKind, TaskPriority, TaskStatus};
use super::world::ResourceType;

/// One end of a transport job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TransferEnd {
    /// A named structure or drop.
    Object(ObjectId),
    /// Another agent (e.g. a builder waiting for energy).
    Agent(AgentName),
    /// A pile scanned around this position at pickup time, or a drop point.
    Position(Position),
}

impl TransferEnd {
    fn key(&self) -> String {
        match self {
            TransferEnd::Object(id) => format!("obj:{id}"),
            TransferEnd::Agent(name) => format!("agent:{name}"),
            TransferEnd::Position(pos) => format!("pos:{pos}"),
        }
    }
}

/// Task-type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskParams {
    Harvest {
        source: ObjectId,
        position: Position,
    },
    Transport {
        from: TransferEnd,
        to: TransferEnd,
        resource: ResourceType,
        amount: u32,
    },
    Build {
        site: ObjectId,
        position: Position,
    },
    Upgrade {
        controller: ObjectId,
        position: Position,
    },
    Repair {
        structure: ObjectId,
        position: Position,
    },
    Attack {
        target: ObjectId,
        position: Position,
    },
}

impl TaskParams {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskParams::Harvest { .. } => TaskKind::Harvest,
            TaskParams::Transport { .. } => TaskKind::Transport,
            TaskParams::Build { .. } => TaskKind::Build,
            TaskParams::Upgrade { .. } => TaskKind::Upgrade,
            TaskParams::Repair { .. } => TaskKind::Repair,
            TaskParams::Attack { .. } => TaskKind::Attack,
        }
    }

    /// Where the work happens; used for agent proximity scoring.
    pub fn anchor(&self) -> Option<&Position> {
        match self {
            TaskParams::Harvest { position, .. }
            | TaskParams::Build { position, .. }
            | TaskParams::Upgrade { position, .. }
            | TaskParams::Repair { position, .. }
            | TaskParams::Attack { position, .. } => Some(position),
            TaskParams::Transport { from, .. } => match from {
                TransferEnd::Position(pos) => Some(pos),
                _ => None,
            },
        }
    }

    /// Identity of the job for de-duplication against active tasks.
    pub fn dedup_key(&self) -> String {
        match self {
            TaskParams::Harvest { source, .. } => format!("harvest:{source}"),
            TaskParams::Transport {
                from, to, resource, ..
            } => format!("transport:{}>{}:{resource:?}", from.key(), to.key()),
            TaskParams::Build { site, .. } => format!("build:{site}"),
            TaskParams::Upgrade { controller, .. } => format!("upgrade:{controller}"),
            TaskParams::Repair { structure, .. } => format!("repair:{structure}"),
            TaskParams::Attack { target, .. } => format!("attack:{target}"),
        }
    }
}

/// Input for `TaskStore::create_task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub params: TaskParams,
    pub priority: TaskPriority,
    pub assignment: AssignmentType,
    pub max_assignees: u32,
    /// Overrides the store's retry policy when set.
    pub max_retries: Option<u32>,
}

impl TaskSpec {
    pub fn exclusive(params: TaskParams, priority: TaskPriority) -> Self {
        Self {
            params,
            priority,
            assignment: AssignmentType::Exclusive,
            max_assignees: 1,
            max_retries: None,
        }
    }

    pub fn shared(params: TaskParams, priority: TaskPriority, max_assignees: u32) -> Self {
        Self {
            params,
            priority,
            assignment: AssignmentType::Shared,
            max_assignees: max_assignees.max(1),
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// The unit of work.
///
/// Fields are public for reading; every mutation goes through `TaskStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub base_priority: TaskPriority,
    pub status: TaskStatus,
    pub assignment: AssignmentType,
    pub max_assignees: u32,
    pub assigned_agents: BTreeSet<AgentName>,

    pub created_at: Tick,
    pub updated_at: Tick,
    pub started_at: Option<Tick>,
    pub completed_at: Option<Tick>,

    pub retry_count: u32,
    pub max_retries: u32,
    /// Retry backoff: not assignable before this tick.
    pub not_before: Option<Tick>,
    pub last_error: Option<String>,

    pub params: TaskParams,
    pub fsm: Option<FsmMemory>,
}

impl Task {
    pub(crate) fn new(id: TaskId, spec: TaskSpec, max_retries: u32, now: Tick) -> Self {
        let max_assignees = match spec.assignment {
            AssignmentType::Exclusive => 1,
            AssignmentType::Shared => spec.max_assignees.max(1),
        };
        Self {
            id,
            kind: spec.params.kind(),
            base_priority: spec.priority,
            status: TaskStatus::Pending,
            assignment: spec.assignment,
            max_assignees,
            assigned_agents: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: spec.max_retries.unwrap_or(max_retries),
            not_before: None,
            last_error: None,
            params: spec.params,
            fsm: Some(FsmMemory::default()),
        }
    }

    pub fn is_exclusive(&self) -> bool {
        self.assignment == AssignmentType::Exclusive
    }

    pub fn remaining_capacity(&self) -> u32 {
        let assigned = u32::try_from(self.assigned_agents.len()).unwrap_or(u32::MAX);
        self.max_assignees.saturating_sub(assigned)
    }

    pub fn fill_ratio(&self) -> f64 {
        self.assigned_agents.len() as f64 / f64::from(self.max_assignees.max(1))
    }

    /// Can this task take one more agent at `now`?
    ///
    /// Exclusive tasks only while Pending and empty; Shared tasks while active
    /// and below `max_assignees`.
    pub fn can_accept(&self, now: Tick) -> bool {
        if self.not_before.is_some_and(|t| t > now) {
            return false;
        }
        match self.assignment {
            AssignmentType::Exclusive => {
                self.status == TaskStatus::Pending && self.assigned_agents.is_empty()
            }
            AssignmentType::Shared => self.status.is_active() && self.remaining_capacity() > 0,
        }
    }

    pub fn age(&self, now: Tick) -> u64 {
        now.since(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn build_params() -> TaskParams {
        TaskParams::Build {
            site: ObjectId::new("site-1"),
            position: Position::new("Z", 5, 5),
        }
    }

    #[test]
    fn exclusive_spec_forces_single_assignee() {
        let mut spec = TaskSpec::exclusive(build_params(), TaskPriority::Normal);
        spec.max_assignees = 4;
        let task = Task::new(TaskId::from_ulid(Ulid::new()), spec, 3, Tick(0));
        assert_eq!(task.max_assignees, 1);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.fsm.is_some());
    }

    #[test]
    fn backoff_blocks_acceptance() {
        let spec = TaskSpec::shared(build_params(), TaskPriority::Normal, 2);
        let mut task = Task::new(TaskId::from_ulid(Ulid::new()), spec, 3, Tick(0));
        task.not_before = Some(Tick(10));
        assert!(!task.can_accept(Tick(9)));
        assert!(task.can_accept(Tick(10)));
    }

    #[test]
    fn transport_dedup_key_ignores_amount() {
        let a = TaskParams::Transport {
            from: TransferEnd::Object(ObjectId::new("c1")),
            to: TransferEnd::Object(ObjectId::new("spawn")),
            resource: ResourceType::Energy,
            amount: 50,
        };
        let mut b = a.clone();
        if let TaskParams::Transport { amount, .. } = &mut b {
            *amount = 300;
        }
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.kind(), TaskKind::Transport);
    }

    #[test]
    fn params_serialize_as_tagged_records() {
        let json = serde_json::to_value(build_params()).unwrap();
        assert_eq!(json["kind"], "build");
        assert_eq!(json["site"], "site-1");
    }
}
