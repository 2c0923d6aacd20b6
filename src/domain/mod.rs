//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`UnitSystem`, `SignConvention`, `QuantityKind`)
//! - the synchronized channel table (`Channel`, `Dataset`)
//! - fit outputs (`ModelKind`, `FitResult`, `FitQuality`)

pub mod dataset;
pub mod types;

pub use dataset::*;
pub use types::*;
