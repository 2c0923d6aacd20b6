//! `tire-fit` library crate.
//!
//! The binary (`tirefit`) is a thin wrapper around this library so that:
//!
//! - the conversion, conditioning and fitting stages are testable without spawning processes
//! - a plotting front-end can drive the same `DataController` and `ModelFitter`

pub mod app;
pub mod cli;
pub mod config;
pub mod convert;
pub mod data;
pub mod domain;
pub mod downsample;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod signal;
