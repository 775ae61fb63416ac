//! PhaseGuard - phase 境界でのエラー捕捉
//!
//! 1 つの phase が失敗しても残りの phase は走らせる。同じ phase が
//! `max_failures` 回連続で失敗したら `cooldown_ticks` の間止めて、
//! その後また有効に戻す。

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::config::GuardConfig;
use crate::domain::{CoreError, Tick};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PhaseHealth {
    consecutive_failures: u32,
    disabled_until: Option<Tick>,
}

/// What happened to one guarded phase.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseRun<T> {
    Ran(T),
    Failed,
    /// Disabled by an earlier streak of failures.
    Skipped,
}

impl<T> PhaseRun<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            PhaseRun::Ran(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseGuard {
    config: GuardConfig,
    phases: BTreeMap<&'static str, PhaseHealth>,
}

impl PhaseGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            phases: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self, phase: &'static str, now: Tick) -> bool {
        self.phases
            .get(phase)
            .and_then(|health| health.disabled_until)
            .is_none_or(|until| now >= until)
    }

    pub fn consecutive_failures(&self, phase: &'static str) -> u32 {
        self.phases
            .get(phase)
            .map_or(0, |health| health.consecutive_failures)
    }

    /// Run `f` unless the phase is cooling down. Errors are logged, never propagated.
    pub fn run<T>(
        &mut self,
        phase: &'static str,
        now: Tick,
        f: impl FnOnce() -> Result<T, CoreError>,
    ) -> PhaseRun<T> {
        let health = self.phases.entry(phase).or_default();
        if let Some(until) = health.disabled_until {
            if now < until {
                return PhaseRun::Skipped;
            }
            info!(phase, tick = now.0, "phase re-enabled after cool-down");
            *health = PhaseHealth::default();
        }

        match f() {
            Ok(value) => {
                health.consecutive_failures = 0;
                PhaseRun::Ran(value)
            }
            Err(err) => {
                health.consecutive_failures += 1;
                error!(
                    phase,
                    tick = now.0,
                    failures = health.consecutive_failures,
                    error = %err,
                    "phase failed"
                );
                if health.consecutive_failures >= self.config.max_failures {
                    let until = now.plus(self.config.cooldown_ticks);
                    warn!(phase, until = until.0, "phase disabled");
                    health.disabled_until = Some(until);
                }
                PhaseRun::Failed
            }
        }
    }
}
