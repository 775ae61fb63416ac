//! App - アプリケーション層
//!
//! ports と各コンポーネントを組み合わせて 1 tick のパイプラインを作る。
//!
//! # 主要コンポーネント
//! - **ColonyBuilder**: 構築とワイヤリング（起動時検証）
//! - **Colony**: generate → match → schedule → execute → cleanup
//! - **ExecutionDriver**: binding ごとに FSM を進めて結果を store に反映
//! - **PhaseGuard**: phase 単位のエラー捕捉とクールダウン
//! - **TickRunner**: snapshot の load / flush を含む 1 tick

pub mod builder;
pub mod colony;
pub mod driver;
pub mod guard;
pub mod runner;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, ColonyBuilder};
pub use self::colony::{Colony, ColonySnapshot, TickSummary};
pub use self::driver::{DriverReport, ExecutionDriver};
pub use self::guard::{PhaseGuard, PhaseRun};
pub use self::runner::TickRunner;
