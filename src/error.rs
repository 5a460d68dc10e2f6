//! Error types for the statistical validation engine
//!
//! The expected "no rule matched, use the fallback" path is a normal `Ok`
//! result, never an error. Errors here are fatal configuration or invariant
//! violations that must not be swallowed by callers.

use thiserror::Error;

/// Errors raised by the validation engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// A parameter is outside its valid range (alpha, confidence level,
    /// power) or an operation was invoked on data it cannot apply to
    /// (z-test power analysis on small samples).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A sample set is too small for the requested statistic. Variance is
    /// undefined below 2 observations; surfaced immediately, never retried.
    #[error("insufficient samples: need at least {required}, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    /// A parameter case did not map to exactly one baseline and one
    /// treatment sample set. Indicates a measurement-source defect the
    /// engine cannot repair.
    #[error("ambiguous case mapping for [{case}]: {detail}")]
    AmbiguousCaseMapping { case: String, detail: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
