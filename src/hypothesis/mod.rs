//! Two-sample hypothesis testing with automatic test selection
//!
//! Compares the mean latency of two sample sets against a hypothesized
//! difference under a directional alternative. Small samples use Welch's
//! t-test (unequal variances, Welch-Satterthwaite degrees of freedom); once
//! both sides have at least [`SMALL_SAMPLE_THRESHOLD`] observations the
//! normal approximation takes over. Callers never pick the branch.


pub use t_test::welch_t_test;
pub use z_test::z_test;

use crate::error::{EngineError, Result};
use crate::samples::SampleSet;
use serde::{Deserialize, Serialize};
use statrs::distribution::ContinuousCDF;
use std::fmt;
use tracing::debug;

/// Below this per-side observation count the t-test path is used.
/// Fixed design constant, not configurable.
pub const SMALL_SAMPLE_THRESHOLD: usize = 30;

/// Directional alternative hypothesis about sample1 - sample2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alternative {
    /// Two-sided: the means differ
    Different,
    /// One-sided: mean of sample1 exceeds mean of sample2
    FirstGreater,
    /// One-sided: mean of sample1 is below mean of sample2
    FirstSmaller,
}

impl Alternative {
    /// Human-readable form for diagnostic messages
    pub fn describe(&self, first: &str, second: &str) -> String {
        match self {
            Alternative::Different => format!("{} != {}", first, second),
            Alternative::FirstGreater => format!("{} > {}", first, second),
            Alternative::FirstSmaller => format!("{} < {}", first, second),
        }
    }
}

/// Which distribution decided the test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestKind {
    StudentsT,
    ZNormal,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::StudentsT => write!(f, "t-test"),
            TestKind::ZNormal => write!(f, "z-test"),
        }
    }
}

/// Outcome of one two-sample test; produced once per evaluation, never mutated
#[derive(Debug, Clone)]
pub struct HypothesisTestResult {
    /// p <= alpha for the stated alternative
    pub significant: bool,
    /// Confidence interval for the true difference at level 1 - alpha,
    /// in nanoseconds; one-sided alternatives carry +/- infinity on the
    /// open side
    pub confidence_interval: (f64, f64),
    /// Difference of sample means (sample1 - sample2), nanoseconds
    pub observed_difference: f64,
    /// Which test path ran
    pub kind: TestKind,
}

/// Test `sample1 - sample2` against `hypothesized_difference` under
/// `alternative` at significance `alpha`, selecting the t or z path from
/// the sample counts.
pub fn test_hypothesis(
    sample1: &SampleSet,
    sample2: &SampleSet,
    hypothesized_difference: f64,
    alternative: Alternative,
    alpha: f64,
) -> Result<HypothesisTestResult> {
    validate_alpha(alpha)?;
    sample1.require_at_least(2)?;
    sample2.require_at_least(2)?;

    if sample1.len() < SMALL_SAMPLE_THRESHOLD || sample2.len() < SMALL_SAMPLE_THRESHOLD {
        debug!(
            n1 = sample1.len(),
            n2 = sample2.len(),
            "selected t-test path (small sample)"
        );
        welch_t_test(sample1, sample2, hypothesized_difference, alternative, alpha)
    } else {
        debug!(
            n1 = sample1.len(),
            n2 = sample2.len(),
            "selected z-test path (normal approximation)"
        );
        z_test(sample1, sample2, hypothesized_difference, alternative, alpha)
    }
}

pub(crate) fn validate_alpha(alpha: f64) -> Result<()> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(EngineError::InvalidConfiguration(format!(
            "alpha must be strictly in (0, 1), got {}",
            alpha
        )));
    }
    Ok(())
}

/// Pooled standard error of the mean difference: sqrt(v1/n1 + v2/n2)
pub(crate) fn pooled_standard_error(sample1: &SampleSet, sample2: &SampleSet) -> f64 {
    let n1 = sample1.len() as f64;
    let n2 = sample2.len() as f64;
    (sample1.variance() / n1 + sample2.variance() / n2).sqrt()
}

/// Shared significance + interval computation once the distribution is fixed
pub(crate) fn conclude<D: ContinuousCDF<f64, f64>>(
    dist: &D,
    observed_difference: f64,
    standard_error: f64,
    hypothesized_difference: f64,
    alternative: Alternative,
    alpha: f64,
    kind: TestKind,
) -> HypothesisTestResult {
    let statistic = (observed_difference - hypothesized_difference) / standard_error;
    let p_value = match alternative {
        Alternative::Different => 2.0 * (1.0 - dist.cdf(statistic.abs())),
        Alternative::FirstGreater => 1.0 - dist.cdf(statistic),
        Alternative::FirstSmaller => dist.cdf(statistic),
    };
    let confidence_interval = match alternative {
        Alternative::Different => {
            let q = dist.inverse_cdf(1.0 - alpha / 2.0);
            (
                observed_difference - q * standard_error,
                observed_difference + q * standard_error,
            )
        }
        Alternative::FirstGreater => {
            let q = dist.inverse_cdf(1.0 - alpha);
            (observed_difference - q * standard_error, f64::INFINITY)
        }
        Alternative::FirstSmaller => {
            let q = dist.inverse_cdf(1.0 - alpha);
            (f64::NEG_INFINITY, observed_difference + q * standard_error)
        }
    };

    HypothesisTestResult {
        significant: p_value <= alpha,
        confidence_interval,
        observed_difference,
        kind,
    }
}

/// Both variances zero: the samples are constants and the test collapses to
/// a sign comparison. Intervals have zero width on the closed side.
pub(crate) fn conclude_degenerate(
    observed_difference: f64,
    hypothesized_difference: f64,
    alternative: Alternative,
    alpha: f64,
    kind: TestKind,
) -> HypothesisTestResult {
    let delta = observed_difference - hypothesized_difference;
    let p_value = match alternative {
        Alternative::Different => {
            if delta == 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Alternative::FirstGreater => {
            if delta > 0.0 {
                0.0
            } else if delta < 0.0 {
                1.0
            } else {
                0.5
            }
        }
        Alternative::FirstSmaller => {
            if delta < 0.0 {
                0.0
            } else if delta > 0.0 {
                1.0
            } else {
                0.5
            }
        }
    };
    let confidence_interval = match alternative {
        Alternative::Different => (observed_difference, observed_difference),
        Alternative::FirstGreater => (observed_difference, f64::INFINITY),
        Alternative::FirstSmaller => (f64::NEG_INFINITY, observed_difference),
    };
    HypothesisTestResult {
        significant: p_value <= alpha,
        confidence_interval,
        observed_difference,
        kind,
    }
}
