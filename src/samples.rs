//! Latency sample sets and parameter-case bookkeeping
//!
//! A `SampleSet` is the immutable collection of per-iteration latencies for
//! one side (baseline or treatment) of one parameter case. Count, mean and
//! variance are computed once at construction and cached; rule evaluation
//! reads them in a hot loop.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Immutable latency observations (nanoseconds) with cached summary stats
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    values: Vec<f64>,
    mean: f64,
    variance: f64,
}

impl SampleSet {
    /// Build a sample set from per-iteration latencies in nanoseconds.
    ///
    /// Mean is defined for n >= 1 and sample variance (n-1 denominator) for
    /// n >= 2; below those counts the cached values are 0.0 and operations
    /// that need them fail with `InsufficientSamples` instead of reading
    /// them.
    pub fn new(values: Vec<f64>) -> Self {
        let n = values.len() as f64;
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / n
        };
        let variance = if values.len() < 2 {
            0.0
        } else {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
        };
        Self {
            values,
            mean,
            variance,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Cached sample variance (n-1 denominator); 0.0 when undefined (n < 2)
    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Fail unless this set has at least `required` observations.
    pub fn require_at_least(&self, required: usize) -> Result<()> {
        if self.values.len() < required {
            return Err(EngineError::InsufficientSamples {
                required,
                actual: self.values.len(),
            });
        }
        Ok(())
    }

    /// One-line summary used in diagnostic messages
    pub fn summary(&self) -> String {
        format!(
            "mean {:.2} ns (n={}, sd {:.2} ns)",
            self.mean,
            self.values.len(),
            self.std_dev()
        )
    }
}

/// One configuration under which both sides were measured
///
/// Identity is the multiset of (name, value) pairs, independent of
/// declaration order; pairs are canonicalized by sorting at construction so
/// the derived `Eq`/`Ord`/`Hash` see one representation. `Ord` keys the
/// deterministic case enumeration order used during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterCase {
    params: Vec<(String, String)>,
}

impl ParameterCase {
    pub fn new<N, V>(params: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut params: Vec<(String, String)> = params
            .into_iter()
            .map(|(n, v)| (n.into(), v.into()))
            .collect();
        params.sort();
        Self { params }
    }

    /// A case with no parameters (single unparameterized comparison)
    pub fn unparameterized() -> Self {
        Self { params: Vec::new() }
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl fmt::Display for ParameterCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            return write!(f, "<default>");
        }
        let joined = self
            .params
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", joined)
    }
}

/// Baseline and treatment sample sets for one parameter case
#[derive(Debug, Clone)]
pub struct MeasuredPair {
    pub baseline: SampleSet,
    pub treatment: SampleSet,
}

/// All measured cases of one completed run
///
/// Invariant: each case maps to exactly one baseline and one treatment
/// sample set. Constructors enforce this; any other cardinality is an
/// `AmbiguousCaseMapping` error, not a skipped case.
#[derive(Debug, Clone, Default)]
pub struct CaseResults {
    cases: BTreeMap<ParameterCase, MeasuredPair>,
}

impl CaseResults {
    /// Pair up per-side maps produced by a measurement source.
    ///
    /// Every case must appear in both maps; a case present on only one side
    /// means the source measured an asymmetric run.
    pub fn from_sides(
        baseline: BTreeMap<ParameterCase, SampleSet>,
        mut treatment: BTreeMap<ParameterCase, SampleSet>,
    ) -> Result<Self> {
        let mut cases = BTreeMap::new();
        for (case, baseline_samples) in baseline {
            let Some(treatment_samples) = treatment.remove(&case) else {
                return Err(EngineError::AmbiguousCaseMapping {
                    case: case.to_string(),
                    detail: "case has a baseline sample set but no treatment sample set"
                        .to_string(),
                });
            };
            cases.insert(
                case,
                MeasuredPair {
                    baseline: baseline_samples,
                    treatment: treatment_samples,
                },
            );
        }
        if let Some((case, _)) = treatment.into_iter().next() {
            return Err(EngineError::AmbiguousCaseMapping {
                case: case.to_string(),
                detail: "case has a treatment sample set but no baseline sample set".to_string(),
            });
        }
        Ok(Self { cases })
    }

    /// Collect (case, pair) tuples, rejecting duplicate cases.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ParameterCase, MeasuredPair)>) -> Result<Self> {
        let mut cases = BTreeMap::new();
        for (case, pair) in pairs {
            if cases.insert(case.clone(), pair).is_some() {
                return Err(EngineError::AmbiguousCaseMapping {
                    case: case.to_string(),
                    detail: "more than one measurement pair for the same case".to_string(),
                });
            }
        }
        Ok(Self { cases })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterCase, &MeasuredPair)> {
        self.cases.iter()
    }

    pub fn get(&self, case: &ParameterCase) -> Option<&MeasuredPair> {
        self.cases.get(case)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
