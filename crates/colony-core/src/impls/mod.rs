//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **SimWorld**: WorldQuery / Movement / Actuator をまとめた決定的なワールド
//! - **LoadoutCapabilities**: body parts による Capabilities
//! - **InMemorySnapshotStore** / **JsonFileSnapshotStore**: SnapshotStore
//! - **TracingEventSink**: EventSink
//!
//! 本物のゲーム API へのバインディングはこの crate の範囲外。

pub mod file_store;
pub mod loadout;
pub mod memory_store;
pub mod sim_world;
pub mod tracing_sink;

pub use self::file_store::JsonFileSnapshotStore;
pub use self::loadout::LoadoutCapabilities;
pub use self::memory_store::InMemorySnapshotStore;
pub use self::sim_world::SimWorld;
pub use self::tracing_sink::TracingEventSink;
