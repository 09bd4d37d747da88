//! Engine configuration.

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable selecting the [`MovePolicy`].
pub const MOVE_POLICY_VAR: &str = "DENTAL_CFG_MOVE_POLICY";

/// Environment variable with the tier count used when no plan is loaded.
pub const NETWORK_TIERS_VAR: &str = "DENTAL_CFG_NETWORK_TIERS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: unknown move policy '{value}', expected 'preserve' or 'adopt'")]
    MovePolicy { var: &'static str, value: String },

    #[error("{var}: '{value}' is not a tier count between 1 and 255")]
    NetworkTiers { var: &'static str, value: String },
}

/// What happens to a benefit's own cost shares when it moves to another class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovePolicy {
    /// Benefit records move with the benefit unchanged; the destination
    /// default only applies where the benefit has no record of its own.
    #[default]
    PreserveOverrides,
    /// Benefit records are overwritten by the destination class default
    /// wherever one exists.
    AdoptDestinationDefault,
}

impl FromStr for MovePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" => Ok(MovePolicy::PreserveOverrides),
            "adopt" => Ok(MovePolicy::AdoptDestinationDefault),
            _ => Err(ConfigError::MovePolicy {
                var: MOVE_POLICY_VAR,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub move_policy: MovePolicy,
    /// Tiers addressable when the loaded bundle carries no plan.
    pub network_tiers: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            move_policy: MovePolicy::default(),
            network_tiers: 1,
        }
    }
}

impl EngineConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();
        if let Some(value) = lookup(MOVE_POLICY_VAR) {
            config.move_policy = value.parse()?;
        }
        if let Some(value) = lookup(NETWORK_TIERS_VAR) {
            config.network_tiers = value
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|tiers| *tiers > 0)
                .ok_or(ConfigError::NetworkTiers {
                    var: NETWORK_TIERS_VAR,
                    value,
                })?;
        }
        Ok(config)
    }
}
