//! SnapshotStore port - tick をまたいで残る唯一の永続領域
//!
//! # 設計原則
//! - tick の頭で 1 回 load、終わりで 1 回 flush
//! - 中身はすべて plain な serde データ（生の参照は持たない）
//! - TaskStore / FSM memory / Matcher の registry はここからだけ復元できる

use async_trait::async_trait;

use crate::app::ColonySnapshot;
use crate::domain::PersistenceError;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `None` on a cold start.
    async fn load(&self) -> Result<Option<ColonySnapshot>, PersistenceError>;

    async fn flush(&self, snapshot: &ColonySnapshot) -> Result<(), PersistenceError>;
}
