//! Domain identifiers (strongly-typed IDs).
//!
//! # ID の種類
//! - **TaskId**: ULID ベース。生成順でソート可能なので scheduler の tie-break キーに使う
//! - **AgentName**: エージェント名。エージェントは tick の間に消えることがあるので、
//!   参照は常に名前で持ち、毎 tick 引き直す
//! - **ObjectId**: ワールド上のオブジェクト（source, structure, drop など）の安定 ID
//!
//! ## Phantom Type パターン
//! `Id<T>` はジェネリック型で共通実装を提供しつつ、`T` は実行時には使わない
//! マーカー型としてコンパイル時の型安全性だけを提供する。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "task-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// Serialize は ULID 文字列そのもの（transparent）なので、
/// JSON の map key としてもそのまま使える。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Identifier of a Task (unit of work tracked by the task store).
pub type TaskId = Id<Task>;

/// Name of a mobile agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentName(String);

impl AgentName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for AgentName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Stable id of a world object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<&AgentName> for ObjectId {
    /// Workers that request supply are tracked as consumers under their name.
    fn from(name: &AgentName) -> Self {
        Self::new(name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn task_id_display_has_prefix() {
        let ulid = Ulid::new();
        let id = TaskId::from_ulid(ulid);
        assert_eq!(id.as_ulid(), ulid);
        assert!(id.to_string().starts_with("task-"));
    }

    #[test]
    fn task_ids_are_sortable() {
        let id1 = TaskId::from_ulid(Ulid::from_parts(1, 0));
        let id2 = TaskId::from_ulid(Ulid::from_parts(2, 0));
        assert!(id1 < id2);
    }

    #[test]
    fn task_id_serializes_as_plain_string_key() {
        let id = TaskId::from_ulid(Ulid::new());
        let mut map = BTreeMap::new();
        map.insert(id, 1u32);

        // map key として JSON に書けること（永続化の前提）
        let json = serde_json::to_string(&map).unwrap();
        let back: BTreeMap<TaskId, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&id), Some(&1));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
    }
}
