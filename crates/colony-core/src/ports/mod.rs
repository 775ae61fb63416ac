//! Ports - 外部コラボレータへのインターフェース
//!
//! core が外から使うのはこれだけ。ワールド観測・移動・アクション・
//! ロードアウト判定・永続化・イベント出力はすべて trait 越しに渡される。
//!
//! # 設計原則
//! - グローバルな Memory は使わない。context として明示的に渡す
//! - エージェント・オブジェクトは文字列 ID で参照し、毎 tick 引き直す

pub mod actuator;
pub mod capability;
pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod movement;
pub mod persistence;
pub mod world;

pub use self::actuator::{ActionResult, Actuator, TransferTarget};
pub use self::capability::Capabilities;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{CollectingEventSink, EventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::movement::{MoveOutcome, Movement};
pub use self::persistence::SnapshotStore;
pub use self::world::WorldQuery;

/// Bundle of the synchronous world ports handed to one tick.
#[derive(Clone, Copy)]
pub struct WorldPorts<'a> {
    pub world: &'a dyn WorldQuery,
    pub movement: &'a dyn Movement,
    pub actuator: &'a dyn Actuator,
    pub capabilities: &'a dyn Capabilities,
}
