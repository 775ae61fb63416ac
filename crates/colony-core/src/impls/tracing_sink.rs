//! TracingEventSink - ドメインイベントを tracing に流す

use tracing::debug;

use crate::domain::DomainEvent;
use crate::ports::EventSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&mut self, event: &DomainEvent) {
        match event {
            DomainEvent::TaskCreated { task, kind, at } => {
                debug!(task = %task, kind = %kind, tick = at.0, "task created");
            }
            DomainEvent::TaskAssigned { task, agent, at } => {
                debug!(task = %task, agent = %agent, tick = at.0, "task assigned");
            }
            DomainEvent::TaskUnassigned { task, agent, at } => {
                debug!(task = %task, agent = %agent, tick = at.0, "task unassigned");
            }
            DomainEvent::TaskStarted { task, at } => {
                debug!(task = %task, tick = at.0, "task started");
            }
            DomainEvent::TaskCompleted { task, at } => {
                debug!(task = %task, tick = at.0, "task completed");
            }
            DomainEvent::TaskFailed { task, reason, at } => {
                debug!(task = %task, reason = %reason, tick = at.0, "task failed");
            }
            DomainEvent::TaskReclaimed { task, reason, at } => {
                debug!(task = %task, reason = %reason, tick = at.0, "task reclaimed");
            }
            DomainEvent::TaskExpired { task, at } => {
                debug!(task = %task, tick = at.0, "task expired");
            }
        }
    }
}
