//! Directional latency rules and their compilation into validators
//!
//! A rule is a closed variant (direction x margin kind x confidence x
//! outcome), not an opaque callable, so rule lists are serializable and the
//! compilation step is testable in isolation. The builder is persistent:
//! every append returns a new value and the previous builder stays valid,
//! so partially built chains can be shared across test definitions.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::hypothesis::{test_hypothesis, Alternative, HypothesisTestResult};
use crate::sample_size::{AutoSampleSizeDeterminer, SamplesRequirement};
use crate::samples::{CaseResults, MeasuredPair, ParameterCase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use tracing::debug;

/// Which way the treatment is hypothesized to move relative to baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Faster,
    Slower,
}

/// Outcome bound to a matched rule (or to the fallback)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Pass,
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "pass"),
            Outcome::Fail => write!(f, "fail"),
        }
    }
}

/// Minimum effect a rule demands before it matches
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Margin {
    /// Percentage of the baseline mean, resolved at evaluation time against
    /// the observed baseline
    Percent(f64),
    /// Absolute interval in nanoseconds, used as-is
    Nanos(f64),
}

impl Margin {
    /// Resolve to nanoseconds against an observed baseline mean
    pub fn resolve(&self, baseline_mean: f64) -> f64 {
        match self {
            Margin::Percent(p) => baseline_mean * p / 100.0,
            Margin::Nanos(ns) => *ns,
        }
    }

    fn validate(&self) -> Result<()> {
        let raw = match self {
            Margin::Percent(p) => *p,
            Margin::Nanos(ns) => *ns,
        };
        if !raw.is_finite() || raw < 0.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "margin must be finite and non-negative, got {}",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Margin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Margin::Percent(p) => write!(f, "{}%", p),
            Margin::Nanos(ns) => write!(f, "{:.2} ns", ns),
        }
    }
}

/// One directional condition bound to an outcome.
///
/// Rule order inside a builder is semantically significant: it sets the
/// short-circuit precedence and which trailing rules can be pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub direction: Direction,
    pub margin: Margin,
    pub confidence_level: f64,
    pub on_match: Outcome,
}

impl Rule {
    pub fn describe(&self) -> String {
        let direction = match self.direction {
            Direction::Faster => "faster",
            Direction::Slower => "slower",
        };
        format!(
            "if treatment {} than baseline by at least {} at {}% confidence then {}",
            direction,
            self.margin,
            self.confidence_level * 100.0,
            self.on_match
        )
    }

    fn alternative(&self) -> Alternative {
        match self.direction {
            // Treatment faster: baseline duration exceeds treatment duration
            Direction::Faster => Alternative::FirstGreater,
            Direction::Slower => Alternative::FirstSmaller,
        }
    }

    /// Hypothesized baseline-minus-treatment difference under the null,
    /// signed so a positive value means "baseline exceeds treatment by the
    /// margin".
    fn hypothesized_difference(&self, baseline_mean: f64) -> f64 {
        let resolved = self.margin.resolve(baseline_mean);
        match self.direction {
            Direction::Faster => resolved,
            Direction::Slower => -resolved,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(EngineError::InvalidConfiguration(format!(
                "confidence level must be strictly in (0, 1), got {}",
                self.confidence_level
            )));
        }
        self.margin.validate()
    }
}

/// Append-only, persistent rule-chain builder.
///
/// Each combinator returns a new builder; the receiver is untouched and
/// stays reusable. `otherwise` is the only way to obtain a validator.
#[derive(Debug, Clone, Default)]
pub struct LatencyValidatorBuilder {
    steps: Vec<Rule>,
}

impl LatencyValidatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// "Treatment faster than baseline by at least `by_at_least`, at
    /// `confidence_level`, then `then`"
    #[must_use]
    pub fn if_faster_than(&self, by_at_least: Margin, confidence_level: f64, then: Outcome) -> Self {
        self.append(Rule {
            direction: Direction::Faster,
            margin: by_at_least,
            confidence_level,
            on_match: then,
        })
    }

    /// Symmetric "slower than" combinator
    #[must_use]
    pub fn if_slower_than(&self, by_at_least: Margin, confidence_level: f64, then: Outcome) -> Self {
        self.append(Rule {
            direction: Direction::Slower,
            margin: by_at_least,
            confidence_level,
            on_match: then,
        })
    }

    fn append(&self, rule: Rule) -> Self {
        let mut steps = self.steps.clone();
        steps.push(rule);
        Self { steps }
    }

    /// Rules accumulated so far, in declaration order
    pub fn rules(&self) -> &[Rule] {
        &self.steps
    }

    /// Terminal call: compile the accumulated rules into a validator.
    ///
    /// Trailing rules bound to the fallback outcome are pruned (if no prior
    /// rule matched, the fallback already yields the same result), then each
    /// surviving rule gets a Bonferroni-corrected alpha of
    /// (1 - confidence) / k across the k survivors.
    pub fn otherwise(&self, fallback: Outcome) -> Result<LatencyValidator> {
        for rule in &self.steps {
            rule.validate()?;
        }

        let mut rules = self.steps.clone();
        while rules.last().map(|r| r.on_match) == Some(fallback) {
            rules.pop();
        }

        let count = rules.len();
        let compiled = rules
            .into_iter()
            .map(|rule| {
                let alpha = (1.0 - rule.confidence_level) / count as f64;
                debug!(rule = %rule.describe(), alpha, "compiled rule");
                CompiledRule { rule, alpha }
            })
            .collect();

        Ok(LatencyValidator {
            rules: compiled,
            fallback,
        })
    }

    /// Gate that fails when the treatment is provably slower
    pub fn fail_if_slower_than(
        by_at_least: Margin,
        confidence_level: f64,
    ) -> Result<LatencyValidator> {
        Self::new()
            .if_slower_than(by_at_least, confidence_level, Outcome::Fail)
            .otherwise(Outcome::Pass)
    }

    /// Gate that passes only when the treatment is provably faster
    pub fn pass_only_if_faster_than(
        by_at_least: Margin,
        confidence_level: f64,
    ) -> Result<LatencyValidator> {
        Self::new()
            .if_faster_than(by_at_least, confidence_level, Outcome::Pass)
            .otherwise(Outcome::Fail)
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: Rule,
    alpha: f64,
}

impl CompiledRule {
    fn test(&self, pair: &MeasuredPair) -> Result<HypothesisTestResult> {
        let hypothesized = self.rule.hypothesized_difference(pair.baseline.mean());
        test_hypothesis(
            &pair.baseline,
            &pair.treatment,
            hypothesized,
            self.rule.alternative(),
            self.alpha,
        )
    }

    fn required_samples(
        &self,
        preliminary: &MeasuredPair,
        config: &EngineConfig,
    ) -> Result<SamplesRequirement> {
        let detectable = self
            .rule
            .margin
            .resolve(preliminary.baseline.mean())
            .abs()
            .max(config.margin_floor_ns);
        AutoSampleSizeDeterminer::new(self.alpha, detectable, config.statistical_power)?
            .required_samples(preliminary)
    }
}

/// The rule that decided a validation result
#[derive(Debug, Clone, Serialize)]
pub struct TriggeredRule {
    /// Zero-based position in the compiled rule list
    pub index: usize,
    pub description: String,
}

/// One verdict per parameter case.
///
/// `is_violation` means "report this as a failing assertion"; a matched rule
/// bound to `Pass` yields `is_violation = false` even though its statistical
/// condition held.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub case: ParameterCase,
    pub triggering_rule: Option<TriggeredRule>,
    pub message: String,
    pub is_violation: bool,
}

/// Compiled, immutable rule chain. Safe to share and reuse across runs.
#[derive(Debug, Clone)]
pub struct LatencyValidator {
    rules: Vec<CompiledRule>,
    fallback: Outcome,
}

impl LatencyValidator {
    /// Surviving rules with their corrected alphas, in evaluation order
    pub fn rules(&self) -> impl Iterator<Item = (&Rule, f64)> + '_ {
        self.rules.iter().map(|c| (&c.rule, c.alpha))
    }

    pub fn fallback(&self) -> Outcome {
        self.fallback
    }

    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self.rules.iter().map(|c| c.rule.describe()).collect();
        parts.push(format!("otherwise {}", self.fallback));
        parts.join("; ")
    }

    /// Evaluate every parameter case independently, in case order.
    ///
    /// Rules run in declaration order; the first significant rule decides
    /// the case and later rules are not evaluated. No match means the
    /// fallback decides.
    pub fn evaluate(&self, results: &CaseResults) -> Result<Vec<ValidationResult>> {
        results
            .iter()
            .map(|(case, pair)| self.evaluate_case(case, pair))
            .collect()
    }

    fn evaluate_case(&self, case: &ParameterCase, pair: &MeasuredPair) -> Result<ValidationResult> {
        let mut message = String::new();

        for (index, compiled) in self.rules.iter().enumerate() {
            let outcome = compiled.test(pair)?;
            let hypothesized = compiled.rule.hypothesized_difference(pair.baseline.mean());
            let support = if outcome.significant {
                "do support"
            } else {
                "cannot support"
            };
            let _ = writeln!(
                message,
                "condition {} ({}): {}",
                index + 1,
                compiled.rule.describe(),
                if outcome.significant { "matched" } else { "no match" }
            );
            let _ = writeln!(
                message,
                "  {} {} by at least {}",
                support,
                compiled
                    .rule
                    .alternative()
                    .describe("baseline duration", "treatment duration"),
                compiled.rule.margin
            );
            let _ = writeln!(message, "  alpha: {:.6}", compiled.alpha);
            let _ = writeln!(message, "  hypothesized difference: {:.2} ns", hypothesized);
            let _ = writeln!(
                message,
                "  observed difference: {:.2} ns",
                outcome.observed_difference
            );
            let _ = writeln!(
                message,
                "  confidence interval: {} ({})",
                format_interval(outcome.confidence_interval),
                outcome.kind
            );
            let _ = writeln!(
                message,
                "  baseline {}; treatment {}",
                pair.baseline.summary(),
                pair.treatment.summary()
            );

            if outcome.significant {
                return Ok(ValidationResult {
                    case: case.clone(),
                    triggering_rule: Some(TriggeredRule {
                        index,
                        description: compiled.rule.describe(),
                    }),
                    message,
                    is_violation: compiled.rule.on_match == Outcome::Fail,
                });
            }
        }

        let _ = writeln!(
            message,
            "no condition was satisfied, so using the fallback {}",
            self.fallback
        );
        Ok(ValidationResult {
            case: case.clone(),
            triggering_rule: None,
            message,
            is_violation: self.fallback == Outcome::Fail,
        })
    }

    /// Required sample counts for the full run: the elementwise maximum over
    /// all compiled rules. Each rule's minimum detectable difference is its
    /// margin resolved against the preliminary baseline mean, floored at the
    /// configured margin floor.
    pub fn required_samples(
        &self,
        preliminary: &MeasuredPair,
        config: &EngineConfig,
    ) -> Result<SamplesRequirement> {
        config.validate()?;
        let mut requirement = SamplesRequirement::minimum();
        for compiled in &self.rules {
            requirement =
                requirement.elementwise_max(compiled.required_samples(preliminary, config)?);
        }
        Ok(requirement)
    }
}

fn format_interval((low, high): (f64, f64)) -> String {
    let bound = |v: f64| {
        if v == f64::INFINITY {
            "inf".to_string()
        } else if v == f64::NEG_INFINITY {
            "-inf".to_string()
        } else {
            format!("{:.2} ns", v)
        }
    };
    format!("[{}, {}]", bound(low), bound(high))
}
