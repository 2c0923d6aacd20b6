//! Tire model families.
//!
//! Models are implemented as small, pure functions on `ModelKind` so that the
//! fitter can stay generic.

pub mod model;

pub use model::*;
