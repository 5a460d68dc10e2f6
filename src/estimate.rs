//! Run-time projection for the full measurement run
//!
//! Projects how long the full run must be for every validator to be
//! adequately powered, from the preliminary per-iteration means and each
//! rule's required sample counts. The projection is handed back to the
//! measurement source as a single scalar budget; translating that budget
//! into per-iteration timing is the source's concern, not ours.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::samples::CaseResults;
use crate::validator::LatencyValidator;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Knobs for a measurement run. Carries the single duration budget the
/// measurement source interprets.
#[derive(Debug, Clone, Serialize)]
pub struct RunParameters {
    pub desired_max_latency: Duration,
}

/// Projected cost of the full run
#[derive(Debug, Clone, Serialize)]
pub struct RunEstimate {
    /// Binding constraint: the largest per-validator projection
    pub estimated_time: Duration,
    /// Projection per validator, keyed by its description, in input order
    pub per_validator: Vec<(String, Duration)>,
    /// Parameters to hand to the measurement source for the full run
    pub run_parameters: RunParameters,
}

/// Project the full-run duration for each validator against a preliminary
/// run.
///
/// Per validator, per case: both groups run the larger of the two required
/// counts (equal-run policy), each iteration costing that side's observed
/// preliminary mean; case durations sum. The overall estimate is the max
/// across validators, since all rules execute against the same physical run.
pub fn estimate_run(
    preliminary: &CaseResults,
    validators: &[&LatencyValidator],
    config: &EngineConfig,
) -> Result<RunEstimate> {
    config.validate()?;

    let mut per_validator = Vec::with_capacity(validators.len());
    let mut max_nanos = 0.0_f64;

    for validator in validators {
        let mut total_nanos = 0.0_f64;
        for (case, pair) in preliminary.iter() {
            let requirement = validator.required_samples(pair, config)?;
            let iterations = requirement
                .samples_for_baseline
                .max(requirement.samples_for_treatment) as f64;
            let case_nanos = iterations * (pair.baseline.mean() + pair.treatment.mean());
            debug!(%case, iterations, case_nanos, "projected case duration");
            total_nanos += case_nanos;
        }
        max_nanos = max_nanos.max(total_nanos);
        per_validator.push((validator.describe(), saturating_duration(total_nanos)));
    }

    let estimated_time = saturating_duration(max_nanos);
    Ok(RunEstimate {
        estimated_time,
        per_validator,
        run_parameters: RunParameters {
            desired_max_latency: estimated_time,
        },
    })
}

/// Nanoseconds (possibly huge or infinite after clamped sample counts) to a
/// Duration, saturating instead of failing.
fn saturating_duration(nanos: f64) -> Duration {
    if nanos <= 0.0 {
        return Duration::ZERO;
    }
    let secs = nanos / 1e9;
    if !secs.is_finite() || secs >= u64::MAX as f64 {
        warn!(nanos, "estimated duration clamped to maximum");
        return Duration::MAX;
    }
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::{CaseResults, MeasuredPair, ParameterCase, SampleSet};
    use crate::validator::{LatencyValidatorBuilder, Margin};

    fn noisy(n: usize, base: f64) -> Vec<f64> {
        (0..n).map(|i| base + 4.0 * ((i % 5) as f64 - 2.0)).collect()
    }

    fn preliminary(cases: &[(&str, f64, f64)]) -> CaseResults {
        CaseResults::from_pairs(cases.iter().map(|(name, baseline, treatment)| {
            (
                ParameterCase::new([("case", *name)]),
                MeasuredPair {
                    baseline: SampleSet::new(noisy(10, *baseline)),
                    treatment: SampleSet::new(noisy(10, *treatment)),
                },
            )
        }))
        .unwrap()
    }

    #[test]
    fn test_single_validator_estimate() {
        let validator =
            LatencyValidatorBuilder::fail_if_slower_than(Margin::Percent(10.0), 0.95).unwrap();
        let prelim = preliminary(&[("sort", 1000.0, 1050.0)]);

        let estimate = estimate_run(&prelim, &[&validator], &EngineConfig::default()).unwrap();
        assert_eq!(estimate.per_validator.len(), 1);
        assert_eq!(estimate.per_validator[0].1, estimate.estimated_time);
        assert_eq!(
            estimate.run_parameters.desired_max_latency,
            estimate.estimated_time
        );
        assert!(estimate.estimated_time > Duration::ZERO);
    }

    #[test]
    fn test_overall_estimate_is_max_across_validators() {
        // A 1% margin demands far more samples than a 50% margin, so it is
        // the binding constraint.
        let demanding =
            LatencyValidatorBuilder::fail_if_slower_than(Margin::Percent(1.0), 0.95).unwrap();
        let loose =
            LatencyValidatorBuilder::fail_if_slower_than(Margin::Percent(50.0), 0.95).unwrap();
        let prelim = preliminary(&[("sort", 1000.0, 1050.0)]);

        let estimate =
            estimate_run(&prelim, &[&loose, &demanding], &EngineConfig::default()).unwrap();
        let loose_time = estimate.per_validator[0].1;
        let demanding_time = estimate.per_validator[1].1;
        assert!(demanding_time > loose_time);
        assert_eq!(estimate.estimated_time, demanding_time);
    }

    #[test]
    fn test_cases_accumulate() {
        let validator =
            LatencyValidatorBuilder::fail_if_slower_than(Margin::Percent(10.0), 0.95).unwrap();
        let one = preliminary(&[("a", 1000.0, 1050.0)]);
        let two = preliminary(&[("a", 1000.0, 1050.0), ("b", 1000.0, 1050.0)]);

        let config = EngineConfig::default();
        let single = estimate_run(&one, &[&validator], &config).unwrap();
        let double = estimate_run(&two, &[&validator], &config).unwrap();
        assert!(double.estimated_time > single.estimated_time);
    }

    #[test]
    fn test_clamped_requirement_saturates_duration() {
        // Identical sides with >= 30 preliminary observations: the z-branch
        // observes a zero difference and clamps the requirement to the
        // maximum, which must saturate the projection, not panic.
        let same: Vec<f64> = noisy(30, 1000.0);
        let prelim = CaseResults::from_pairs([(
            ParameterCase::unparameterized(),
            MeasuredPair {
                baseline: SampleSet::new(same.clone()),
                treatment: SampleSet::new(same),
            },
        )])
        .unwrap();
        let validator =
            LatencyValidatorBuilder::fail_if_slower_than(Margin::Percent(10.0), 0.95).unwrap();

        let estimate = estimate_run(&prelim, &[&validator], &EngineConfig::default()).unwrap();
        // Clamped counts project to an absurd but representable duration;
        // the caller reads this as "down-scope the rule".
        const ONE_YEAR: Duration = Duration::from_secs(365 * 24 * 3600);
        assert!(estimate.estimated_time > ONE_YEAR);
    }

    #[test]
    fn test_empty_preliminary_yields_zero_estimate() {
        let validator =
            LatencyValidatorBuilder::fail_if_slower_than(Margin::Percent(10.0), 0.95).unwrap();
        let prelim = CaseResults::from_pairs([]).unwrap();
        let estimate = estimate_run(&prelim, &[&validator], &EngineConfig::default()).unwrap();
        assert_eq!(estimate.estimated_time, Duration::ZERO);
    }
}
