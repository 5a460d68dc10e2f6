//! Latgate - statistical latency-regression gate
//!
//! This library decides, at a calibrated confidence level, whether a
//! treatment implementation is faster, slower, or statistically
//! indistinguishable from a baseline, and composes ordered directional
//! rules into one pass/fail verdict per parameter case. Measurement
//! execution is delegated to a caller-supplied [`runner::MeasurementSource`].

pub mod config;
pub mod error;
pub mod estimate;
pub mod hypothesis;
pub mod runner;
pub mod sample_size;
pub mod samples;
pub mod validator;
