//! EventSink port - ドメインイベントの記録
//!
//! # 実装
//! - TracingEventSink: tracing に debug で流す（impls）
//! - CollectingEventSink: 受け取ったイベントを溜める（テスト・デモ用）

use std::sync::{Arc, Mutex};

use crate::domain::DomainEvent;

pub trait EventSink {
    fn emit(&mut self, event: &DomainEvent);
}

/// 受け取ったイベントを溜める
///
/// Clone したハンドル同士で同じバッファを共有するので、Colony に
/// 渡したあとでも手元の clone から中身を読める。
#[derive(Debug, Default, Clone)]
pub struct CollectingEventSink {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&mut self, event: &DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
