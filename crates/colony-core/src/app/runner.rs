//! TickRunner - snapshot の load → tick → flush を 1 回の呼び出しにまとめる
//!
//! tick をまたいで生き残るのは SnapshotStore の中身だけ、という前提で
//! 毎 tick の頭で load し、終わりで flush する。

use tracing::{debug, info};

use super::colony::{Colony, TickSummary};
use crate::domain::{CoreError, Tick};
use crate::ports::{SnapshotStore, WorldPorts};

pub struct TickRunner<S> {
    colony: Colony,
    store: S,
}

impl<S: SnapshotStore> TickRunner<S> {
    pub fn new(colony: Colony, store: S) -> Self {
        Self { colony, store }
    }

    pub fn colony(&self) -> &Colony {
        &self.colony
    }

    pub fn colony_mut(&mut self) -> &mut Colony {
        &mut self.colony
    }

    pub fn into_inner(self) -> (Colony, S) {
        (self.colony, self.store)
    }

    /// Load, run one tick, flush.
    ///
    /// A failed load aborts the tick before anything runs. A failed flush is
    /// returned after the tick has already been applied in memory.
    pub async fn tick(&mut self, ports: WorldPorts<'_>, now: Tick) -> Result<TickSummary, CoreError> {
        match self.store.load().await? {
            Some(snapshot) => {
                debug!(tick = now.0, saved_tick = snapshot.tick.0, "snapshot loaded");
                self.colony.restore(snapshot);
            }
            None => info!(tick = now.0, "no snapshot, cold start"),
        }

        let summary = self.colony.run_tick(ports, now);

        let snapshot = self.colony.snapshot(now);
        self.store.flush(&snapshot).await?;
        Ok(summary)
    }
}
