//! Configuration for the validation engine
//!
//! The statistical thresholds themselves (confidence level, margin) live on
//! each rule; this config carries the run-wide knobs shared by the sample
//! size determiners and the gating entry point.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Run-wide engine configuration
///
/// # Example
/// ```
/// use latgate::config::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.statistical_power, 0.8);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target statistical power for sample-size estimation
    ///
    /// Probability of detecting a real effect of at least the rule's margin.
    /// 0.8 is the conventional default; 0.9 is more conservative and
    /// requires proportionally more samples.
    pub statistical_power: f64,

    /// Wall-clock budget handed to the measurement source for the
    /// preliminary run that seeds sample-size estimation
    pub preliminary_budget: Duration,

    /// Floor applied to the minimum detectable difference, in nanoseconds
    ///
    /// A rule with a 0% margin would otherwise ask the power analysis to
    /// resolve an infinitesimal effect, which needs unbounded samples. Any
    /// resolved margin below this floor is raised to it.
    pub margin_floor_ns: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            statistical_power: 0.8,
            preliminary_budget: Duration::from_secs(10),
            margin_floor_ns: 1e-5,
        }
    }
}

impl EngineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.statistical_power > 0.0 && self.statistical_power < 1.0) {
            return Err(EngineError::InvalidConfiguration(format!(
                "statistical_power must be in (0, 1), got {}",
                self.statistical_power
            )));
        }

        if self.preliminary_budget.is_zero() {
            return Err(EngineError::InvalidConfiguration(
                "preliminary_budget must be non-zero".to_string(),
            ));
        }

        if !(self.margin_floor_ns > 0.0 && self.margin_floor_ns.is_finite()) {
            return Err(EngineError::InvalidConfiguration(format!(
                "margin_floor_ns must be a positive finite value, got {}",
                self.margin_floor_ns
            )));
        }

        Ok(())
    }
}
