//! Priority calculator: static weight, age and fill ratio -> effective priority.
//!
//! ```text
//! weight     = base_weight(priority)            1..=10
//! age_boost  = k1 * ln(1 + age)
//! saturation = max(0, 1 - k2 * assigned / max_assignees)
//! effective  = weight * (1 + age_boost) * saturation
//! ```
//!
//! For a task with a fixed fill ratio, `effective` is strictly increasing in
//! age, so a waiting task eventually outranks any fixed-priority competitor.

use crate::config::PriorityConfig;
use crate::domain::{Task, Tick};

/// Scores tasks for one scheduling pass.
#[derive(Debug, Clone, Default)]
pub struct PriorityCalculator {
    config: PriorityConfig,
}

impl PriorityCalculator {
    pub fn new(config: PriorityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    pub fn age_boost(&self, age: u64) -> f64 {
        self.config.age_factor * (1.0 + age as f64).ln()
    }

    pub fn saturation(&self, fill_ratio: f64) -> f64 {
        (1.0 - self.config.saturation_factor * fill_ratio).max(0.0)
    }

    /// Returns 0.0 for tasks that must not be picked this tick.
    pub fn effective_priority(&self, task: &Task, now: Tick) -> f64 {
        let saturation = self.saturation(task.fill_ratio());
        if saturation <= 0.0 {
            return 0.0;
        }
        let weight = task.base_priority.base_weight();
        weight * (1.0 + self.age_boost(task.age(now))) * saturation
    }
}
