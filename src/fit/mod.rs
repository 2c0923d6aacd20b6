//! Model fitting.
//!
//! Responsibilities:
//!
//! - linear least squares for polynomial baselines
//! - bounded Levenberg-Marquardt for Magic Formula variants
//! - goodness-of-fit on the full input sample set
//! - per-command-level fits (parallel)

pub mod fitter;

pub use fitter::*;
