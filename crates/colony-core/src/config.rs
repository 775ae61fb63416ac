//! Tunable configuration for every component.
//!
//! Every section has a `Default` matching the values the controller ships
//! with, and every field is `#[serde(default)]`, so a TOML file only needs the
//! keys it wants to override:
//!
//! ```toml
//! [priority]
//! age_factor = 0.4
//!
//! [store.retry]
//! max_retries = 5
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Aging / saturation constants of the priority calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// k1: logarithmic aging factor, expected in [0.2, 0.5].
    pub age_factor: f64,
    /// k2: linear saturation factor, expected in [0.8, 1.0].
    pub saturation_factor: f64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            age_factor: 0.3,
            saturation_factor: 1.0,
        }
    }
}

/// Per-agent scoring used when binding agents to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub capability_weight: f64,
    pub proximity_weight: f64,
    pub idle_weight: f64,
    /// D: distance at which proximity score reaches 0.
    pub proximity_range: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capability_weight: 0.5,
            proximity_weight: 0.3,
            idle_weight: 0.2,
            proximity_range: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Tasks older than this are dropped regardless of status.
    pub expiry_ticks: u64,
    /// Completed/Failed tasks are kept this long for inspection.
    pub retention_ticks: u64,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            expiry_ticks: 1500,
            retention_ticks: 20,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub max_harvesters_per_source: u32,
    pub builders_per_site: u32,
    pub upgraders_per_controller: u32,
    pub attackers_per_hostile: u32,
    /// Structures below this hit ratio get a repair task.
    pub repair_threshold: f64,
    /// Controller downgrade countdown below which upgrading becomes an emergency.
    pub downgrade_emergency_ticks: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_harvesters_per_source: 3,
            builders_per_site: 3,
            upgraders_per_controller: 2,
            attackers_per_hostile: 4,
            repair_threshold: 0.5,
            downgrade_emergency_ticks: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Bounds of the suggested wait handed to workers requesting supply.
    pub wait_min_ticks: u64,
    pub wait_max_ticks: u64,
    /// Extra ticks added to the round trip estimate.
    pub wait_margin_ticks: u64,
    /// Drops smaller than this are not worth a trip.
    pub min_drop_amount: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            wait_min_ticks: 5,
            wait_max_ticks: 50,
            wait_margin_ticks: 3,
            min_drop_amount: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsmConfig {
    /// Agents with fewer ticks left than this wrap up their job.
    pub ttl_safety_ticks: u32,
    /// Range of build/upgrade/repair actions.
    pub work_range: u32,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            ttl_safety_ticks: 20,
            work_range: 3,
        }
    }
}

/// Phase boundary guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Consecutive failures before a phase is disabled.
    pub max_failures: u32,
    /// How long a disabled phase stays off.
    pub cooldown_ticks: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown_ticks: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyConfig {
    pub priority: PriorityConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub generator: GeneratorConfig,
    pub matcher: MatcherConfig,
    pub fsm: FsmConfig,
    pub guard: GuardConfig,
}

impl ColonyConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ColonyConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.priority;
        if !(0.2..=0.5).contains(&p.age_factor) {
            return Err(ConfigError::Invalid(format!(
                "priority.age_factor={} outside [0.2, 0.5]",
                p.age_factor
            )));
        }
        if !(0.8..=1.0).contains(&p.saturation_factor) {
            return Err(ConfigError::Invalid(format!(
                "priority.saturation_factor={} outside [0.8, 1.0]",
                p.saturation_factor
            )));
        }
        if self.scheduler.proximity_range == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.proximity_range must be > 0".to_string(),
            ));
        }
        if self.matcher.wait_min_ticks > self.matcher.wait_max_ticks {
            return Err(ConfigError::Invalid(
                "matcher.wait_min_ticks > matcher.wait_max_ticks".to_string(),
            ));
        }
        if self.store.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "store.retry.multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ColonyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.priority.age_factor, 0.3);
        assert_eq!(config.priority.saturation_factor, 1.0);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = ColonyConfig::from_toml_str(
            r#"
            [priority]
            age_factor = 0.4

            [store.retry]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.priority.age_factor, 0.4);
        assert_eq!(config.priority.saturation_factor, 1.0);
        assert_eq!(config.store.retry.max_retries, 5);
        assert_eq!(config.store.expiry_ticks, 1500);
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn out_of_range_constants_are_rejected() {
        let err = ColonyConfig::from_toml_str("[priority]\nsaturation_factor = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn broken_toml_is_a_parse_error() {
        let err = ColonyConfig::from_toml_str("[priority\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
