//! The task ledger.
//!
//! Design:
//! - `tasks` is the single source of truth for task status and assignees.
//! - `bindings` is the reverse index agent -> task. It enforces "one binding
//!   per agent" and is rebuilt from `tasks` on restore, so it never needs to
//!   be persisted.
//! - All status transitions happen here; other components only call the API.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::counters::{StatusCounts, TaskCounters};
use super::retry::RetryPolicy;
use crate::config::StoreConfig;
use crate::domain::{
    AgentName, CoreError, DomainEvent, FsmMemory, Task, TaskId, TaskParams, TaskSpec, TaskStatus,
    Tick,
};
use crate::ports::IdGenerator;

/// Persistent form of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStoreSnapshot {
    pub tasks: BTreeMap<TaskId, Task>,
    #[serde(default)]
    pub counters: TaskCounters,
}

/// What one `cleanup` pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    /// Bindings dropped because the agent vanished.
    pub vanished: Vec<(AgentName, TaskId)>,
    /// Tasks dropped for exceeding the expiry age.
    pub expired: Vec<TaskId>,
    /// Terminal tasks dropped after the retention window.
    pub dropped: Vec<TaskId>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.vanished.is_empty() && self.expired.is_empty() && self.dropped.is_empty()
    }
}

pub struct TaskStore {
    tasks: BTreeMap<TaskId, Task>,
    bindings: BTreeMap<AgentName, TaskId>,
    counters: TaskCounters,
    events: Vec<DomainEvent>,
    config: StoreConfig,
    id_gen: Arc<dyn IdGenerator>,
}

impl TaskStore {
    pub fn new(config: StoreConfig, id_gen: Arc<dyn IdGenerator>) -> Self {
        Self {
            tasks: BTreeMap::new(),
            bindings: BTreeMap::new(),
            counters: TaskCounters::default(),
            events: Vec::new(),
            config,
            id_gen,
        }
    }

    /// Rebuild the store (and its reverse index) from a snapshot.
    ///
    /// If the snapshot binds one agent to several tasks, the agent keeps the
    /// task with the smallest id and is removed from the others.
    pub fn restore(
        snapshot: TaskStoreSnapshot,
        config: StoreConfig,
        id_gen: Arc<dyn IdGenerator>,
    ) -> Self {
        let mut store = Self::new(config, id_gen);
        store.counters = snapshot.counters;
        store.tasks = snapshot.tasks;

        let mut duplicates = Vec::new();
        for (task_id, task) in &store.tasks {
            for agent in &task.assigned_agents {
                if store.bindings.contains_key(agent) {
                    duplicates.push((agent.clone(), *task_id));
                } else {
                    store.bindings.insert(agent.clone(), *task_id);
                }
            }
        }
        for (agent, task_id) in duplicates {
            warn!(agent = %agent, task = %task_id, "dropping duplicate binding from snapshot");
            if let Some(task) = store.tasks.get_mut(&task_id) {
                task.assigned_agents.remove(&agent);
                if let Some(fsm) = task.fsm.as_mut() {
                    fsm.release(&agent);
                }
            }
        }
        store
    }

    pub fn snapshot(&self) -> TaskStoreSnapshot {
        TaskStoreSnapshot {
            tasks: self.tasks.clone(),
            counters: self.counters.clone(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn pending_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect()
    }

    /// Pending ∪ Assigned ∪ InProgress.
    pub fn active_tasks(&self) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.status.is_active()).collect()
    }

    /// Tasks that can take at least one more agent at `now`.
    pub fn assignable_tasks(&self, now: Tick) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.can_accept(now)).collect()
    }

    /// Active task with the given de-duplication key.
    pub fn find_active_by_key(&self, key: &str) -> Option<&Task> {
        self.tasks
            .values()
            .find(|t| t.status.is_active() && t.params.dedup_key() == key)
    }

    pub fn binding_of(&self, agent: &AgentName) -> Option<TaskId> {
        self.bindings.get(agent).copied()
    }

    pub fn is_bound(&self, agent: &AgentName) -> bool {
        self.bindings.contains_key(agent)
    }

    /// All (agent, task) bindings ordered by agent name.
    pub fn bindings(&self) -> Vec<(AgentName, TaskId)> {
        self.bindings
            .iter()
            .map(|(agent, task)| (agent.clone(), *task))
            .collect()
    }

    /// Whether external preemption may take `agent` off its task.
    /// Unbound agents are always interruptible.
    pub fn is_interruptible(&self, agent: &AgentName) -> bool {
        self.binding_of(agent)
            .and_then(|id| self.tasks.get(&id))
            .and_then(|t| t.fsm.as_ref())
            .and_then(|fsm| fsm.creep(agent))
            .is_none_or(|state| state.interruptible)
    }

    pub fn counters(&self) -> &TaskCounters {
        &self.counters
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Assigned => counts.assigned += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Hand buffered events to the caller (once per tick).
    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn create_task(&mut self, spec: TaskSpec, now: Tick) -> TaskId {
        let id = self.id_gen.generate_task_id();
        let task = Task::new(id, spec, self.config.retry.max_retries, now);
        info!(task = %id, kind = %task.kind, priority = ?task.base_priority, "task created");
        self.events.push(DomainEvent::TaskCreated {
            task: id,
            kind: task.kind,
            at: now,
        });
        self.tasks.insert(id, task);
        self.counters.created += 1;
        id
    }

    /// Bind `agent` to `task_id`.
    ///
    /// Returns false (not an error) when the task cannot take the agent or the
    /// agent is already bound elsewhere; the scheduler just tries the next
    /// candidate.
    pub fn assign(&mut self, task_id: TaskId, agent: &AgentName, now: Tick) -> bool {
        if self.bindings.contains_key(agent) {
            return false;
        }
        let Some(task) = self.tasks.get_mut(&task_id) else {
            return false;
        };
        if !task.can_accept(now) {
            return false;
        }

        task.assigned_agents.insert(agent.clone());
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Assigned;
        }
        task.updated_at = now;
        self.bindings.insert(agent.clone(), task_id);
        self.counters.assigned += 1;
        debug!(task = %task_id, agent = %agent, "agent assigned");
        self.events.push(DomainEvent::TaskAssigned {
            task: task_id,
            agent: agent.clone(),
            at: now,
        });
        true
    }

    /// Remove the agent's binding without closing its task. Idempotent.
    ///
    /// An Exclusive task that loses its agent goes back to Pending so it can be
    /// picked up again; a Shared task keeps its status.
    pub fn unassign_agent(&mut self, agent: &AgentName, now: Tick) -> Option<TaskId> {
        let task_id = self.bindings.remove(agent)?;
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.assigned_agents.remove(agent);
            if let Some(fsm) = task.fsm.as_mut() {
                fsm.release(agent);
            }
            if task.is_exclusive() && task.status.is_active() && task.assigned_agents.is_empty() {
                task.status = TaskStatus::Pending;
            }
            task.updated_at = now;
        }
        debug!(task = %task_id, agent = %agent, "agent unassigned");
        self.events.push(DomainEvent::TaskUnassigned {
            task: task_id,
            agent: agent.clone(),
            at: now,
        });
        Some(task_id)
    }

    /// Add `extra` to an active Transport task with `key` that no agent has
    /// started on yet. Returns the task that took the extra amount.
    pub fn top_up_transport(&mut self, key: &str, extra: u32, now: Tick) -> Option<TaskId> {
        let task = self.tasks.values_mut().find(|t| {
            matches!(t.status, TaskStatus::Pending | TaskStatus::Assigned)
                && t.params.dedup_key() == key
        })?;
        let TaskParams::Transport { amount, .. } = &mut task.params else {
            return None;
        };
        *amount = amount.saturating_add(extra);
        task.updated_at = now;
        debug!(task = %task.id, extra, amount = *amount, "transport topped up");
        Some(task.id)
    }

    /// Assigned -> InProgress the first time an agent works on the task.
    pub fn mark_started(&mut self, task_id: TaskId, now: Tick) -> Result<(), CoreError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(CoreError::TaskNotFound(task_id))?;
        if task.status != TaskStatus::Assigned {
            return Ok(());
        }
        task.status = TaskStatus::InProgress;
        task.started_at.get_or_insert(now);
        task.updated_at = now;
        self.events.push(DomainEvent::TaskStarted {
            task: task_id,
            at: now,
        });
        Ok(())
    }

    /// Explicit status transition.
    ///
    /// Completed/Failed release every binding and record the completion tick.
    /// Pending reclaims the task. Terminal tasks cannot move again.
    pub fn update_status(
        &mut self,
        task_id: TaskId,
        status: TaskStatus,
        now: Tick,
    ) -> Result<(), CoreError> {
        let task = self
            .tasks
            .get(&task_id)
            .ok_or(CoreError::TaskNotFound(task_id))?;
        let from = task.status;
        if from.is_terminal() {
            if from == status {
                return Ok(());
            }
            return Err(CoreError::InvalidTransition {
                task: task_id,
                from,
                to: status,
            });
        }

        match status {
            TaskStatus::Completed => {
                self.finish(task_id, TaskStatus::Completed, None, now);
            }
            TaskStatus::Failed => {
                self.finish(task_id, TaskStatus::Failed, Some("marked failed".to_string()), now);
            }
            TaskStatus::Pending => {
                self.reclaim(task_id, "reset to pending", now);
            }
            TaskStatus::InProgress => {
                if let Some(task) = self.tasks.get_mut(&task_id) {
                    task.status = TaskStatus::InProgress;
                    task.started_at.get_or_insert(now);
                    task.updated_at = now;
                }
            }
            TaskStatus::Assigned => {
                let task = self
                    .tasks
                    .get_mut(&task_id)
                    .ok_or(CoreError::TaskNotFound(task_id))?;
                if task.assigned_agents.is_empty() {
                    return Err(CoreError::InvalidTransition {
                        task: task_id,
                        from,
                        to: status,
                    });
                }
                task.status = TaskStatus::Assigned;
                task.updated_at = now;
            }
        }
        Ok(())
    }

    /// Target invalidation: reclaim for retry while the budget lasts,
    /// otherwise fail permanently. Returns the resulting status.
    pub fn report_failure(
        &mut self,
        task_id: TaskId,
        reason: &str,
        now: Tick,
    ) -> Result<TaskStatus, CoreError> {
        let retry_delay = {
            let task = self
                .tasks
                .get_mut(&task_id)
                .ok_or(CoreError::TaskNotFound(task_id))?;
            if task.status.is_terminal() {
                return Ok(task.status);
            }
            task.last_error = Some(reason.to_string());
            if RetryPolicy::allows(task.retry_count, task.max_retries) {
                task.retry_count += 1;
                Some(self.config.retry.next_delay(task.retry_count))
            } else {
                None
            }
        };

        match retry_delay {
            Some(delay) => {
                self.reclaim(task_id, reason, now);
                if let Some(task) = self.tasks.get_mut(&task_id) {
                    task.not_before = Some(now.plus(delay));
                }
                info!(task = %task_id, reason, delay, "task reclaimed for retry");
                Ok(TaskStatus::Pending)
            }
            None => {
                self.finish(task_id, TaskStatus::Failed, Some(reason.to_string()), now);
                Ok(TaskStatus::Failed)
            }
        }
    }

    // ------------------------------------------------------------------
    // FSM memory container
    // ------------------------------------------------------------------

    /// Lend the task's FSM memory to the execution driver.
    pub fn take_fsm(&mut self, task_id: TaskId) -> Result<FsmMemory, CoreError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(CoreError::TaskNotFound(task_id))?;
        task.fsm
            .take()
            .ok_or(CoreError::FsmMemoryMissing { task: task_id })
    }

    /// Return lent memory. Ignored if the task was dropped meanwhile.
    pub fn restore_fsm(&mut self, task_id: TaskId, memory: FsmMemory) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.fsm = Some(memory);
        }
    }

    // ------------------------------------------------------------------
    // Cleanup
    // ------------------------------------------------------------------

    /// Periodic maintenance. Calling it twice in a row is the same as once.
    ///
    /// 1. bindings of agents missing from `live_agents` are dropped
    ///    (Exclusive tasks go back to Pending, Shared tasks just lose the agent)
    /// 2. Completed/Failed tasks past the retention window are dropped
    /// 3. tasks older than the expiry age are dropped, whatever their status
    pub fn cleanup(&mut self, live_agents: &BTreeSet<AgentName>, now: Tick) -> CleanupReport {
        let mut report = CleanupReport::default();

        self.repair_index();

        let vanished: Vec<(AgentName, TaskId)> = self
            .bindings
            .iter()
            .filter(|(agent, _)| !live_agents.contains(*agent))
            .map(|(agent, task)| (agent.clone(), *task))
            .collect();
        for (agent, task_id) in vanished {
            let exclusive = self.tasks.get(&task_id).is_some_and(|t| t.is_exclusive());
            if exclusive {
                self.bindings.remove(&agent);
                self.reclaim(task_id, "agent vanished", now);
            } else {
                self.unassign_agent(&agent, now);
            }
            warn!(agent = %agent, task = %task_id, "agent vanished, binding reclaimed");
            report.vanished.push((agent, task_id));
        }

        let retention = self.config.retention_ticks;
        let finished: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.status.is_terminal())
            .filter(|t| t.completed_at.is_none_or(|at| now.since(at) >= retention))
            .map(|t| t.id)
            .collect();
        for task_id in finished {
            self.remove_task(task_id);
            report.dropped.push(task_id);
        }

        let expiry = self.config.expiry_ticks;
        let expired: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.age(now) >= expiry)
            .map(|t| t.id)
            .collect();
        for task_id in expired {
            self.remove_task(task_id);
            self.counters.expired += 1;
            self.events.push(DomainEvent::TaskExpired {
                task: task_id,
                at: now,
            });
            info!(task = %task_id, "task expired");
            report.expired.push(task_id);
        }

        report
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Make `tasks[*].assigned_agents` and `bindings` agree.
    fn repair_index(&mut self) {
        let dangling: Vec<AgentName> = self
            .bindings
            .iter()
            .filter(|(agent, task_id)| {
                self.tasks
                    .get(*task_id)
                    .is_none_or(|t| !t.status.is_active() || !t.assigned_agents.contains(*agent))
            })
            .map(|(agent, _)| agent.clone())
            .collect();
        for agent in dangling {
            warn!(agent = %agent, "dropping dangling binding");
            self.bindings.remove(&agent);
        }

        for (task_id, task) in self.tasks.iter_mut() {
            let strays: Vec<AgentName> = task
                .assigned_agents
                .iter()
                .filter(|agent| self.bindings.get(*agent) != Some(task_id))
                .cloned()
                .collect();
            for agent in strays {
                warn!(agent = %agent, task = %task_id, "dropping unindexed assignee");
                task.assigned_agents.remove(&agent);
                if let Some(fsm) = task.fsm.as_mut() {
                    fsm.release(&agent);
                }
            }
            if task.is_exclusive() && task.status.is_active() && task.assigned_agents.is_empty() {
                task.status = TaskStatus::Pending;
            }
        }
    }

    fn release_all(&mut self, task_id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            for agent in std::mem::take(&mut task.assigned_agents) {
                self.bindings.remove(&agent);
            }
        }
    }

    /// Back to Pending with no assignees and fresh FSM memory.
    fn reclaim(&mut self, task_id: TaskId, reason: &str, now: Tick) {
        self.release_all(task_id);
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.status = TaskStatus::Pending;
            task.fsm = Some(FsmMemory::default());
            task.updated_at = now;
            self.counters.reclaimed += 1;
            self.events.push(DomainEvent::TaskReclaimed {
                task: task_id,
                reason: reason.to_string(),
                at: now,
            });
        }
    }

    fn finish(&mut self, task_id: TaskId, status: TaskStatus, error: Option<String>, now: Tick) {
        self.release_all(task_id);
        let Some(task) = self.tasks.get_mut(&task_id) else {
            return;
        };
        task.status = status;
        task.completed_at = Some(now);
        task.updated_at = now;
        match status {
            TaskStatus::Completed => {
                self.counters.completed += 1;
                info!(task = %task_id, kind = %task.kind, "task completed");
                self.events.push(DomainEvent::TaskCompleted {
                    task: task_id,
                    at: now,
                });
            }
            _ => {
                let reason = error.unwrap_or_default();
                task.last_error = Some(reason.clone());
                self.counters.failed += 1;
                warn!(task = %task_id, kind = %task.kind, reason = %reason, "task failed");
                self.events.push(DomainEvent::TaskFailed {
                    task: task_id,
                    reason,
                    at: now,
                });
            }
        }
    }

    fn remove_task(&mut self, task_id: TaskId) {
        self.release_all(task_id);
        self.tasks.remove(&task_id);
    }
}
