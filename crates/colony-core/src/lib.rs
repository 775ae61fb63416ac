//! colony-core
//!
//! Task orchestration for a tick-driven colony of agents.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, geometry, world views, task, state, fsm memory, errors, events）
//! - **ports**: 抽象化レイヤー（WorldQuery, Movement, Actuator, Capabilities, SnapshotStore, など）
//! - **config**: TOML で読める設定
//! - **priority / scheduler**: 実効優先度と agent の割り当て
//! - **store**: TaskStore（タスクと binding の唯一の持ち主）
//! - **matcher / generator**: supply/demand マッチングとタスク生成
//! - **fsm**: タスク種別ごとの state machine と runtime
//! - **app**: 1 tick のパイプライン（builder, colony, driver, guard, runner）
//! - **impls**: 実装（SimWorld, snapshot store など開発用）

pub mod domain;
pub mod ports;
pub mod config;
pub mod priority;
pub mod store;
pub mod scheduler;
pub mod matcher;
pub mod generator;
pub mod fsm;
pub mod app;
pub mod impls;
