//! Error taxonomy shared by every stage of the pipeline.
//!
//! Errors carry enough context (path, dataset id, quantity kind, model kind) for the
//! caller to render a precise message without looking at any state again. Each
//! variant maps to a process exit code for the `tirefit` binary.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{DatasetId, ModelKind};

#[derive(Debug, Clone, Error)]
pub enum TireError {
    /// Source file unreadable or not shaped like a rig log.
    #[error("Import of '{}' failed: {message}", .path.display())]
    Import { path: PathBuf, message: String },

    /// Unsupported unit/convention pair or a unit-system mismatch.
    #[error("Conversion error: {message}")]
    Conversion { message: String },

    /// A dataset invariant would be violated (length mismatch, duplicate channel, ...).
    #[error("Validation error{}: {message}", fmt_dataset(.dataset))]
    Validation {
        dataset: Option<DatasetId>,
        message: String,
    },

    #[error(transparent)]
    Fit(#[from] FitError),

    /// Configuration could not be loaded or failed validation.
    #[error("Config error: {message}")]
    Config { message: String },

    #[error("I/O error on '{}': {message}", .path.display())]
    Io { path: PathBuf, message: String },
}

/// Model fitting failures.
#[derive(Debug, Clone, Error)]
pub enum FitError {
    #[error(
        "{model} did not converge after {iterations} iterations (sse={sse:.6e}, last params={last_params:?})"
    )]
    NotConverged {
        model: ModelKind,
        iterations: usize,
        sse: f64,
        last_params: Vec<f64>,
    },

    #[error("{model}: singular Jacobian at iteration {iterations} (last params={last_params:?})")]
    SingularJacobian {
        model: ModelKind,
        iterations: usize,
        last_params: Vec<f64>,
    },

    #[error("{model}: invalid bounds or initial guess: {message}")]
    InvalidBounds { model: ModelKind, message: String },

    #[error("{model}: need at least {required} finite samples, found {found}")]
    InsufficientData {
        model: ModelKind,
        required: usize,
        found: usize,
    },

    #[error("Unknown model kind '{0}' (expected poly1..poly5, mf, mf-shifted)")]
    UnknownModel(String),
}

impl TireError {
    pub fn import(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Import {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    pub fn validation(dataset: Option<&DatasetId>, message: impl Into<String>) -> Self {
        Self::Validation {
            dataset: dataset.cloned(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Exit code used by the binary.
    ///
    /// - 2: bad input file, config, or filesystem problem
    /// - 3: data rejected by a conversion or validation rule
    /// - 4: numerical failure while fitting
    pub fn exit_code(&self) -> u8 {
        match self {
            TireError::Import { .. } | TireError::Config { .. } | TireError::Io { .. } => 2,
            TireError::Conversion { .. } | TireError::Validation { .. } => 3,
            TireError::Fit(_) => 4,
        }
    }
}

fn fmt_dataset(dataset: &Option<DatasetId>) -> String {
    match dataset {
        Some(id) => format!(" in dataset '{id}'"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_taxonomy() {
        assert_eq!(TireError::import("a.dat", "bad").exit_code(), 2);
        assert_eq!(TireError::config("bad").exit_code(), 2);
        assert_eq!(TireError::conversion("bad").exit_code(), 3);
        assert_eq!(TireError::validation(None, "bad").exit_code(), 3);
        let fit: TireError = FitError::UnknownModel("x".into()).into();
        assert_eq!(fit.exit_code(), 4);
    }

    #[test]
    fn validation_message_names_dataset() {
        let id = DatasetId::from("run7");
        let msg = TireError::validation(Some(&id), "length mismatch").to_string();
        assert!(msg.contains("run7"), "{msg}");
        assert!(msg.contains("length mismatch"), "{msg}");
    }
}
