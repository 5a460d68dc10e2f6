//! Adaptive sample-size estimation via power analysis
//!
//! Given a preliminary run, each determiner answers "how many observations
//! per side does the full run need for the hypothesis test to be adequately
//! powered against the target effect size". The auto determiner switches
//! between the small-sample and normal-approximation solvers on the same
//! 30-observation threshold as the hypothesis tests, so callers never know
//! which branch ran.

use crate::error::{EngineError, Result};
use crate::hypothesis::{pooled_standard_error, SMALL_SAMPLE_THRESHOLD};
use crate::samples::MeasuredPair;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use tracing::warn;

/// Upper clamp for required sample counts. "Very large" is an expected and
/// actionable outcome (down-scope the rule), not a failure.
pub const MAX_REQUIRED_SAMPLES: u64 = u64::MAX;

/// Lower clamp: variance needs two observations, so no requirement is ever
/// smaller than this (and never zero).
pub const MIN_REQUIRED_SAMPLES: u64 = 2;

/// Required observations per side for an adequately powered full run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplesRequirement {
    pub samples_for_baseline: u64,
    pub samples_for_treatment: u64,
}

impl SamplesRequirement {
    pub fn minimum() -> Self {
        Self {
            samples_for_baseline: MIN_REQUIRED_SAMPLES,
            samples_for_treatment: MIN_REQUIRED_SAMPLES,
        }
    }

    pub fn maximum() -> Self {
        Self {
            samples_for_baseline: MAX_REQUIRED_SAMPLES,
            samples_for_treatment: MAX_REQUIRED_SAMPLES,
        }
    }

    /// Per-side maximum of two requirements; a run sized this way satisfies
    /// both.
    pub fn elementwise_max(self, other: Self) -> Self {
        Self {
            samples_for_baseline: self.samples_for_baseline.max(other.samples_for_baseline),
            samples_for_treatment: self
                .samples_for_treatment
                .max(other.samples_for_treatment),
        }
    }
}

fn clamp_count(raw: f64) -> u64 {
    if !raw.is_finite() || raw >= MAX_REQUIRED_SAMPLES as f64 {
        warn!(raw, "required sample count clamped to maximum");
        return MAX_REQUIRED_SAMPLES;
    }
    let ceiled = raw.ceil().max(0.0) as u64;
    ceiled.max(MIN_REQUIRED_SAMPLES)
}

fn validate_probability(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value < 1.0) {
        return Err(EngineError::InvalidConfiguration(format!(
            "{} must be strictly in (0, 1), got {}",
            name, value
        )));
    }
    Ok(())
}

fn normal_quantile(p: f64) -> Result<f64> {
    let dist = Normal::new(0.0, 1.0).map_err(|e| {
        EngineError::InvalidConfiguration(format!("standard normal unavailable: {}", e))
    })?;
    Ok(dist.inverse_cdf(p))
}

/// Analytic two-sample mean-difference sample sizes assuming unequal
/// variances, for the small-sample (t-test) branch.
///
/// Uses the preliminary variances as variance estimates and Neyman
/// allocation (counts proportional to each side's standard deviation), with
/// a damped Student-t refinement of the normal-quantile seed at the implied
/// Welch degrees of freedom.
#[derive(Debug, Clone)]
pub struct TTestSampleSizeDeterminer {
    alpha: f64,
    minimum_detectable_difference: f64,
    power: f64,
}

impl TTestSampleSizeDeterminer {
    pub fn new(alpha: f64, minimum_detectable_difference: f64, power: f64) -> Result<Self> {
        validate_probability("alpha", alpha)?;
        validate_probability("power", power)?;
        if !minimum_detectable_difference.is_finite() {
            return Err(EngineError::InvalidConfiguration(format!(
                "minimum_detectable_difference must be finite, got {}",
                minimum_detectable_difference
            )));
        }
        Ok(Self {
            alpha,
            minimum_detectable_difference,
            power,
        })
    }

    pub fn required_samples(&self, preliminary: &MeasuredPair) -> Result<SamplesRequirement> {
        preliminary.baseline.require_at_least(2)?;
        preliminary.treatment.require_at_least(2)?;

        let v1 = preliminary.baseline.variance();
        let v2 = preliminary.treatment.variance();
        let s1 = v1.sqrt();
        let s2 = v2.sqrt();
        let delta = self.minimum_detectable_difference.abs();

        if delta == 0.0 {
            warn!("minimum detectable difference is zero; requirement clamped to maximum");
            return Ok(SamplesRequirement::maximum());
        }

        // Two-sided alpha, Neyman allocation: n_i proportional to s_i.
        let za = normal_quantile(1.0 - self.alpha / 2.0)?;
        let zb = normal_quantile(self.power)?;
        let scale = ((za + zb) / delta).powi(2);
        let mut n1 = (v1 + s1 * s2) * scale;
        let mut n2 = (v2 + s1 * s2) * scale;

        // Refine with Student-t quantiles at the Welch df implied by the
        // current counts; damped so the alternating updates settle.
        for _ in 0..16 {
            let a = v1 / n1.max(2.0);
            let b = v2 / n2.max(2.0);
            let df = (a + b).powi(2)
                / (a.powi(2) / (n1.max(2.0) - 1.0) + b.powi(2) / (n2.max(2.0) - 1.0));
            if !df.is_finite() || df <= 0.0 {
                break;
            }
            let Ok(t) = StudentsT::new(0.0, 1.0, df) else {
                break;
            };
            let ta = t.inverse_cdf(1.0 - self.alpha / 2.0);
            let tb = t.inverse_cdf(self.power);
            let t_scale = ((ta + tb) / delta).powi(2);
            let m1 = (v1 + s1 * s2) * t_scale;
            let m2 = (v2 + s1 * s2) * t_scale;
            let converged = (m1 - n1).abs() < 1e-6 && (m2 - n2).abs() < 1e-6;
            n1 = (n1 + m1) / 2.0;
            n2 = (n2 + m2) / 2.0;
            if converged {
                break;
            }
        }

        Ok(SamplesRequirement {
            samples_for_baseline: clamp_count(n1),
            samples_for_treatment: clamp_count(n2),
        })
    }
}

/// Power analysis for the normal-approximation (z-test) branch.
///
/// Takes the effect size from the observed difference of a preliminary
/// two-sided comparison, and the standard deviation from the pooled
/// standard error scaled back to a single observation. Current policy runs
/// both groups the same number of times, so both returned counts are equal.
#[derive(Debug, Clone)]
pub struct ZTestSampleSizeDeterminer {
    alpha: f64,
    power: f64,
}

impl ZTestSampleSizeDeterminer {
    pub fn new(alpha: f64, power: f64) -> Result<Self> {
        validate_probability("alpha", alpha)?;
        validate_probability("power", power)?;
        Ok(Self { alpha, power })
    }

    pub fn required_samples(&self, preliminary: &MeasuredPair) -> Result<SamplesRequirement> {
        if preliminary.baseline.len() < SMALL_SAMPLE_THRESHOLD
            || preliminary.treatment.len() < SMALL_SAMPLE_THRESHOLD
        {
            return Err(EngineError::InvalidConfiguration(format!(
                "z-test power analysis needs at least {} preliminary observations per side \
                 (got {} baseline, {} treatment); use the t-test determiner",
                SMALL_SAMPLE_THRESHOLD,
                preliminary.baseline.len(),
                preliminary.treatment.len()
            )));
        }

        let observed = preliminary.baseline.mean() - preliminary.treatment.mean();
        if observed == 0.0 {
            warn!("preliminary observed difference is zero; requirement clamped to maximum");
            return Ok(SamplesRequirement::maximum());
        }

        // Standard deviation of a single-iteration difference, recovered
        // from the pooled standard error of the preliminary means.
        let se = pooled_standard_error(&preliminary.baseline, &preliminary.treatment);
        let sd = se * (preliminary.baseline.len() as f64).sqrt();

        let za = normal_quantile(1.0 - self.alpha / 2.0)?;
        let zb = normal_quantile(self.power)?;
        let per_group = 2.0 * (sd * (za + zb) / observed).powi(2);

        let n = clamp_count(per_group);
        Ok(SamplesRequirement {
            samples_for_baseline: n,
            samples_for_treatment: n,
        })
    }
}

/// Switches between the t and z solvers on the preliminary sample counts,
/// mirroring the hypothesis-test selection threshold.
#[derive(Debug, Clone)]
pub struct AutoSampleSizeDeterminer {
    t: TTestSampleSizeDeterminer,
    z: ZTestSampleSizeDeterminer,
}

impl AutoSampleSizeDeterminer {
    pub fn new(alpha: f64, minimum_detectable_difference: f64, power: f64) -> Result<Self> {
        Ok(Self {
            t: TTestSampleSizeDeterminer::new(alpha, minimum_detectable_difference, power)?,
            z: ZTestSampleSizeDeterminer::new(alpha, power)?,
        })
    }

    pub fn required_samples(&self, preliminary: &MeasuredPair) -> Result<SamplesRequirement> {
        if preliminary.baseline.len() < SMALL_SAMPLE_THRESHOLD
            || preliminary.treatment.len() < SMALL_SAMPLE_THRESHOLD
        {
            self.t.required_samples(preliminary)
        } else {
            self.z.required_samples(preliminary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::SampleSet;

    fn pair(baseline: Vec<f64>, treatment: Vec<f64>) -> MeasuredPair {
        MeasuredPair {
            baseline: SampleSet::new(baseline),
            treatment: SampleSet::new(treatment),
        }
    }

    fn noisy(n: usize, base: f64, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| base + amplitude * ((i % 7) as f64 - 3.0))
            .collect()
    }

    #[test]
    fn test_t_branch_returns_per_side_counts() {
        // Baseline much noisier than treatment: Neyman allocation should
        // demand more baseline samples.
        let preliminary = pair(noisy(10, 1000.0, 50.0), noisy(10, 1000.0, 5.0));
        let determiner = TTestSampleSizeDeterminer::new(0.05, 20.0, 0.8).unwrap();
        let req = determiner.required_samples(&preliminary).unwrap();
        assert!(req.samples_for_baseline > req.samples_for_treatment);
        assert!(req.samples_for_baseline >= MIN_REQUIRED_SAMPLES);
    }

    #[test]
    fn test_t_branch_zero_delta_clamps_to_maximum() {
        let preliminary = pair(noisy(10, 1000.0, 5.0), noisy(10, 1000.0, 5.0));
        let determiner = TTestSampleSizeDeterminer::new(0.05, 0.0, 0.8).unwrap();
        let req = determiner.required_samples(&preliminary).unwrap();
        assert_eq!(req, SamplesRequirement::maximum());
    }

    #[test]
    fn test_t_branch_constant_samples_clamp_to_minimum() {
        let preliminary = pair(vec![100.0; 5], vec![100.0; 5]);
        let determiner = TTestSampleSizeDeterminer::new(0.05, 10.0, 0.8).unwrap();
        let req = determiner.required_samples(&preliminary).unwrap();
        assert_eq!(req, SamplesRequirement::minimum());
    }

    #[test]
    fn test_t_branch_power_monotonicity() {
        let preliminary = pair(noisy(12, 1000.0, 30.0), noisy(12, 1000.0, 30.0));
        let low = TTestSampleSizeDeterminer::new(0.05, 25.0, 0.7)
            .unwrap()
            .required_samples(&preliminary)
            .unwrap();
        let high = TTestSampleSizeDeterminer::new(0.05, 25.0, 0.9)
            .unwrap()
            .required_samples(&preliminary)
            .unwrap();
        assert!(high.samples_for_baseline >= low.samples_for_baseline);
        assert!(high.samples_for_treatment >= low.samples_for_treatment);
    }

    #[test]
    fn test_z_branch_equal_allocation() {
        let preliminary = pair(noisy(40, 1000.0, 40.0), noisy(40, 1100.0, 10.0));
        let determiner = ZTestSampleSizeDeterminer::new(0.05, 0.8).unwrap();
        let req = determiner.required_samples(&preliminary).unwrap();
        assert_eq!(req.samples_for_baseline, req.samples_for_treatment);
    }

    #[test]
    fn test_z_branch_rejects_small_preliminary() {
        let preliminary = pair(noisy(10, 1000.0, 5.0), noisy(40, 1000.0, 5.0));
        let determiner = ZTestSampleSizeDeterminer::new(0.05, 0.8).unwrap();
        let err = determiner.required_samples(&preliminary).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_z_branch_zero_observed_difference_clamps_to_maximum() {
        let same = noisy(40, 1000.0, 20.0);
        let preliminary = pair(same.clone(), same);
        let determiner = ZTestSampleSizeDeterminer::new(0.05, 0.8).unwrap();
        let req = determiner.required_samples(&preliminary).unwrap();
        assert_eq!(req, SamplesRequirement::maximum());
    }

    #[test]
    fn test_z_branch_power_monotonicity() {
        let preliminary = pair(noisy(40, 1000.0, 40.0), noisy(40, 1050.0, 40.0));
        let low = ZTestSampleSizeDeterminer::new(0.05, 0.6)
            .unwrap()
            .required_samples(&preliminary)
            .unwrap();
        let high = ZTestSampleSizeDeterminer::new(0.05, 0.95)
            .unwrap()
            .required_samples(&preliminary)
            .unwrap();
        assert!(high.samples_for_baseline >= low.samples_for_baseline);
    }

    #[test]
    fn test_auto_switches_on_threshold() {
        // 29 preliminary observations: t branch (per-side counts may differ)
        let small = pair(noisy(29, 1000.0, 80.0), noisy(29, 1000.0, 8.0));
        let auto = AutoSampleSizeDeterminer::new(0.05, 30.0, 0.8).unwrap();
        let req = auto.required_samples(&small).unwrap();
        assert_ne!(req.samples_for_baseline, req.samples_for_treatment);

        // 30 observations: z branch (always equal allocation)
        let large = pair(noisy(30, 1000.0, 80.0), noisy(30, 1050.0, 8.0));
        let req = auto.required_samples(&large).unwrap();
        assert_eq!(req.samples_for_baseline, req.samples_for_treatment);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(TTestSampleSizeDeterminer::new(0.0, 10.0, 0.8).is_err());
        assert!(TTestSampleSizeDeterminer::new(0.05, f64::NAN, 0.8).is_err());
        assert!(ZTestSampleSizeDeterminer::new(0.05, 1.0).is_err());
        assert!(AutoSampleSizeDeterminer::new(1.2, 10.0, 0.8).is_err());
    }

    #[test]
    fn test_elementwise_max() {
        let a = SamplesRequirement {
            samples_for_baseline: 10,
            samples_for_treatment: 50,
        };
        let b = SamplesRequirement {
            samples_for_baseline: 30,
            samples_for_treatment: 20,
        };
        let merged = a.elementwise_max(b);
        assert_eq!(merged.samples_for_baseline, 30);
        assert_eq!(merged.samples_for_treatment, 50);
    }
}
