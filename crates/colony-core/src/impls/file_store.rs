//! JsonFileSnapshotStore - JSON ファイル 1 つに snapshot を置く
//!
//! # 書き込み手順
//! 1. `<path>.tmp` に書く
//! 2. `rename` で置き換える（途中でプロセスが落ちても旧 snapshot が残る）

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::app::ColonySnapshot;
use crate::domain::PersistenceError;
use crate::ports::SnapshotStore;

#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> Result<Option<ColonySnapshot>, PersistenceError> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        ColonySnapshot::decode(&json).map(Some)
    }

    async fn flush(&self, snapshot: &ColonySnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = json.len(), "snapshot flushed");
        Ok(())
    }
}
