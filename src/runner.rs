//! Measurement-source boundary and the gated-run entry point
//!
//! The engine never executes benchmark code itself. A `MeasurementSource`
//! implementation owns warm-up, iteration scheduling and outlier policy;
//! this module only defines the two calls the engine makes into it and the
//! convenience chain preliminary-run -> estimate -> full-run -> evaluate.

use crate::config::EngineConfig;
use crate::estimate::{estimate_run, RunEstimate, RunParameters};
use crate::samples::CaseResults;
use crate::validator::{LatencyValidator, ValidationResult};
use anyhow::Context;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info};

/// Executes the baseline/treatment pair under controlled conditions and
/// returns per-iteration latencies grouped by parameter case.
///
/// Implementations are expected to be slow and opaque; there is no
/// cancellation contract. Callers wanting bounded run time must act on the
/// run estimate before invoking `run_full`.
pub trait MeasurementSource {
    /// Short calibration run within `budget`, seeding sample-size estimation
    fn run_preliminary(&mut self, budget: Duration) -> anyhow::Result<CaseResults>;

    /// Full-power run sized by `params`
    fn run_full(&mut self, params: &RunParameters) -> anyhow::Result<CaseResults>;
}

/// Everything a gated run produced
#[derive(Debug, Clone)]
pub struct GatedRunOutcome {
    pub estimate: RunEstimate,
    pub results: Vec<ValidationResult>,
}

/// Run the whole gate: preliminary measurement, run-time projection, full
/// measurement, rule evaluation.
pub fn run_gated<S: MeasurementSource>(
    source: &mut S,
    validator: &LatencyValidator,
    config: &EngineConfig,
) -> anyhow::Result<GatedRunOutcome> {
    config.validate()?;

    let preliminary = source
        .run_preliminary(config.preliminary_budget)
        .context("preliminary measurement run failed")?;
    let estimate = estimate_run(&preliminary, &[validator], config)?;
    debug!(
        estimated_time = ?estimate.estimated_time,
        "full run projected from preliminary measurements"
    );

    let full = source
        .run_full(&estimate.run_parameters)
        .context("full measurement run failed")?;
    let results = validator.evaluate(&full)?;

    Ok(GatedRunOutcome { estimate, results })
}

/// Render validation results the way test logs expect them: one header per
/// case, message lines indented beneath it.
pub fn format_results<'a>(results: impl IntoIterator<Item = &'a ValidationResult>) -> String {
    let mut out = String::new();
    for result in results {
        let verdict = if result.is_violation { "failed" } else { "passed" };
        let rule = result
            .triggering_rule
            .as_ref()
            .map(|r| r.description.as_str())
            .unwrap_or("fallback");
        let _ = writeln!(
            out,
            "validation for [{}] {} ({}):",
            result.case, verdict, rule
        );
        for line in result.message.lines() {
            let _ = writeln!(out, "\t{}", line);
        }
    }
    out
}

/// Bridge into an arbitrary test framework: logs every result, then hands
/// the formatted violations to `assert_fail` if any case failed. The
/// delegate keeps this crate framework-agnostic.
pub fn assert_validators_passed(
    results: &[ValidationResult],
    assert_fail: impl FnOnce(&str),
) {
    info!("{}", format_results(results));

    let failed: Vec<&ValidationResult> = results.iter().filter(|r| r.is_violation).collect();
    if !failed.is_empty() {
        assert_fail(&format_results(failed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::{MeasuredPair, ParameterCase, SampleSet};
    use crate::validator::{LatencyValidatorBuilder, Margin, Outcome};

    /// Source that replays canned results and records the budgets it saw
    struct ScriptedSource {
        preliminary: CaseResults,
        full: CaseResults,
        seen_budget: Option<Duration>,
        seen_full_budget: Option<Duration>,
    }

    impl MeasurementSource for ScriptedSource {
        fn run_preliminary(&mut self, budget: Duration) -> anyhow::Result<CaseResults> {
            self.seen_budget = Some(budget);
            Ok(self.preliminary.clone())
        }

        fn run_full(&mut self, params: &RunParameters) -> anyhow::Result<CaseResults> {
            self.seen_full_budget = Some(params.desired_max_latency);
            Ok(self.full.clone())
        }
    }

    fn noisy(n: usize, base: f64) -> Vec<f64> {
        (0..n).map(|i| base + 3.0 * ((i % 5) as f64 - 2.0)).collect()
    }

    fn results(n: usize, baseline: f64, treatment: f64) -> CaseResults {
        CaseResults::from_pairs([(
            ParameterCase::unparameterized(),
            MeasuredPair {
                baseline: SampleSet::new(noisy(n, baseline)),
                treatment: SampleSet::new(noisy(n, treatment)),
            },
        )])
        .unwrap()
    }

    #[test]
    fn test_run_gated_chains_estimate_and_evaluation() {
        let mut source = ScriptedSource {
            preliminary: results(10, 1000.0, 1400.0),
            full: results(50, 1000.0, 1400.0),
            seen_budget: None,
            seen_full_budget: None,
        };
        let validator =
            LatencyValidatorBuilder::fail_if_slower_than(Margin::Percent(10.0), 0.95).unwrap();
        let config = EngineConfig::default();

        let outcome = run_gated(&mut source, &validator, &config).unwrap();

        assert_eq!(source.seen_budget, Some(config.preliminary_budget));
        assert_eq!(
            source.seen_full_budget,
            Some(outcome.estimate.run_parameters.desired_max_latency)
        );
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].is_violation);
    }

    #[test]
    fn test_run_gated_passes_when_treatment_holds() {
        let mut source = ScriptedSource {
            preliminary: results(10, 1000.0, 1000.0),
            full: results(50, 1000.0, 1000.0),
            seen_budget: None,
            seen_full_budget: None,
        };
        let validator =
            LatencyValidatorBuilder::fail_if_slower_than(Margin::Percent(10.0), 0.95).unwrap();

        let outcome = run_gated(&mut source, &validator, &EngineConfig::default()).unwrap();
        assert!(!outcome.results[0].is_violation);
    }

    #[test]
    fn test_assert_bridge_fires_only_on_violation() {
        let validator = LatencyValidatorBuilder::new()
            .if_slower_than(Margin::Percent(10.0), 0.95, Outcome::Fail)
            .otherwise(Outcome::Pass)
            .unwrap();

        let failing = validator.evaluate(&results(50, 1000.0, 2000.0)).unwrap();
        let mut captured = None;
        assert_validators_passed(&failing, |msg| captured = Some(msg.to_string()));
        let message = captured.expect("violation should trigger the delegate");
        assert!(message.contains("failed"));

        let passing = validator.evaluate(&results(50, 1000.0, 1000.0)).unwrap();
        let mut fired = false;
        assert_validators_passed(&passing, |_| fired = true);
        assert!(!fired);
    }

    #[test]
    fn test_format_results_indents_message_lines() {
        let validator = LatencyValidatorBuilder::new()
            .if_slower_than(Margin::Percent(10.0), 0.95, Outcome::Fail)
            .otherwise(Outcome::Pass)
            .unwrap();
        let evaluated = validator.evaluate(&results(50, 1000.0, 2000.0)).unwrap();

        let formatted = format_results(&evaluated);
        assert!(formatted.starts_with("validation for"));
        assert!(formatted.contains("\tcondition 1"));
    }
}
