//! FSM - タスク種別ごとの状態機械
//!
//! # 構成
//! - **machine**: `FsmState` / `StateMachine` trait と `Step`
//! - **erased**: `DynStateMachine`（serde_json::Value で状態を持つ object-safe 版）
//! - **registry**: TaskKind → machine の対応表
//! - **runtime**: 1 agent × 1 tick の実行と postmortem record
//! - **gather / transport / work / attack**: 具体的な machine
//!
//! 状態はすべて `FsmMemory` に JSON として保存されるので、プロセスを
//! 再起動しても同じ状態から再開できる。

pub mod attack;
pub mod context;
pub mod erased;
pub mod gather;
pub mod machine;
pub mod registry;
pub mod runtime;
pub mod transport;
pub mod work;

#[cfg(test)]
pub(crate) mod test_support;

pub use self::attack::{AttackMachine, AttackState};
pub use self::context::{StepContext, StepEnv};
pub use self::erased::{DynStateMachine, DynStep, TypedMachine};
pub use self::gather::{GatherMachine, GatherState, SpotClaims};
pub use self::machine::{FsmState, Outcome, StateMachine, Step};
pub use self::registry::{FsmRegistry, RegistryError};
pub use self::runtime::{TickReport, tick};
pub use self::transport::{TransportMachine, TransportState};
pub use self::work::{WorkMachine, WorkState};
