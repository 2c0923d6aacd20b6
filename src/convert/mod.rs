//! Unit-system, sign-convention and command-level transformations.
//!
//! The lookup tables (`ConversionTable`, `SignTable`) are immutable after
//! construction and shared via `Arc`.

pub mod command;
pub mod convention;
pub mod units;

pub use command::*;
pub use convention::*;
pub use units::*;
