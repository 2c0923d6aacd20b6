//! Input/output helpers.
//!
//! - ASCII rig-log import (`ingest`)
//! - MATLAB import (`mat`, with `level5` for its text variables)
//! - fit JSON and dataset exports (`export`)

pub mod export;
pub mod ingest;
mod level5;
pub mod mat;

pub use export::*;
pub use ingest::*;
pub use mat::*;

use std::path::Path;

use crate::domain::Dataset;
use crate::error::TireError;

/// Import a rig log, choosing the reader by file extension.
pub fn import_file(path: &Path) -> Result<Dataset, TireError> {
    if !path.exists() {
        return Err(TireError::import(path, "file not found"));
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mat" => read_mat(path),
        "dat" | "txt" | "csv" => read_dat(path),
        other => Err(TireError::import(
            path,
            format!("unsupported file type '.{other}' (expected .mat, .dat, .txt or .csv)"),
        )),
    }
}
