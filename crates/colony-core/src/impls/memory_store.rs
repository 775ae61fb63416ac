//! InMemorySnapshotStore - プロセス内だけで持つ snapshot（テスト・開発用）

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::app::ColonySnapshot;
use crate::domain::PersistenceError;
use crate::ports::SnapshotStore;

/// Holds the last flushed snapshot.
///
/// The snapshot is stored as JSON text, not as the struct itself, so a load
/// goes through the same decode path as the file store.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    slot: Mutex<Option<String>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> Result<Option<ColonySnapshot>, PersistenceError> {
        let slot = self.slot.lock().await;
        match slot.as_deref() {
            Some(json) => Ok(Some(ColonySnapshot::decode(json)?)),
            None => Ok(None),
        }
    }

    async fn flush(&self, snapshot: &ColonySnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(snapshot)?;
        *self.slot.lock().await = Some(json);
        Ok(())
    }
}
