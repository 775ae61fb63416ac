//! Movement port - 1 tick 分の移動と距離
//!
//! 経路探索そのものはこの core の範囲外。

use crate::domain::{AgentName, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Already within the requested range; no step was taken.
    InRange,
    /// One step was taken (or the agent is fatigued), not there yet.
    Moving,
    NoPath,
}

pub trait Movement {
    /// Take one step toward `target` until within `range`.
    fn step_toward(&self, agent: &AgentName, target: &Position, range: u32) -> MoveOutcome;

    /// Travel distance between two positions, `None` if unreachable.
    fn path_length(&self, from: &Position, to: &Position) -> Option<u32>;
}
