//! Dataset ownership and synthetic data.

pub mod manager;
pub mod sample;

pub use manager::{DataManager, SharedDataManager};
pub use sample::{SampleConfig, generate_sample};
