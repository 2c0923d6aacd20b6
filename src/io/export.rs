//! Exports: fitted parameters (JSON) and datasets (ASCII rig-log format).
//!
//! Fit JSON is the portable representation of a fitted model:
//! - model kind tag + flat parameter map (+ optional standard errors)
//! - fit quality (R², RMSE, SSE, n)
//! - dataset provenance (id, channels, unit system, sign convention)
//!
//! Floats are written with `serde_json`'s `float_roundtrip` feature so re-reading an
//! export reproduces every value bit-for-bit.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, FitQuality, FitResult, ModelKind, SignConvention, UnitSystem};
use crate::error::TireError;
use crate::io::ingest::{
    META_NOTES, META_RIM_WIDTH, META_SIGN_CONVENTION, META_TEST_DATE, META_TIRE_NAME, META_UNIT_SYSTEM,
};

pub const TOOL_NAME: &str = "tirefit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitExport {
    pub tool: String,
    pub exported_at: DateTime<Utc>,
    pub dataset_id: String,
    pub x_channel: String,
    pub y_channel: String,
    pub unit_system: Option<UnitSystem>,
    pub sign_convention: SignConvention,
    pub model: ModelKind,
    pub parameters: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainties: Option<BTreeMap<String, f64>>,
    pub quality: FitQuality,
}

impl FitExport {
    pub fn new(dataset: &Dataset, fit: &FitResult) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            exported_at: Utc::now(),
            dataset_id: dataset.id.to_string(),
            x_channel: fit.x_channel.clone(),
            y_channel: fit.y_channel.clone(),
            unit_system: dataset.unit_system,
            sign_convention: dataset.sign_convention,
            model: fit.model,
            parameters: fit.parameters.clone(),
            uncertainties: fit.uncertainties.clone(),
            quality: fit.quality.clone(),
        }
    }

    /// Parameter values in model order.
    pub fn values(&self) -> Vec<f64> {
        self.model
            .param_names()
            .iter()
            .map(|n| self.parameters.get(n).copied().unwrap_or(f64::NAN))
            .collect()
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.model.evaluate(x, &self.values())
    }
}

pub fn write_fit_json(path: &Path, export: &FitExport) -> Result<(), TireError> {
    let file = File::create(path).map_err(|e| TireError::io(path, format!("cannot create fit JSON: {e}")))?;
    serde_json::to_writer_pretty(BufWriter::new(file), export)
        .map_err(|e| TireError::io(path, format!("cannot write fit JSON: {e}")))?;
    Ok(())
}

pub fn read_fit_json(path: &Path) -> Result<FitExport, TireError> {
    let file = File::open(path).map_err(|e| TireError::import(path, format!("cannot open fit JSON: {e}")))?;
    let export: FitExport =
        serde_json::from_reader(file).map_err(|e| TireError::import(path, format!("invalid fit JSON: {e}")))?;
    export.model.validate()?;
    Ok(export)
}

/// Write a dataset as a tab-separated rig log readable by `read_dat`.
pub fn write_dat(path: &Path, dataset: &Dataset) -> Result<(), TireError> {
    let file = File::create(path).map_err(|e| TireError::io(path, format!("cannot create file: {e}")))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{}", header_line(dataset)).map_err(|e| TireError::io(path, e))?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(out);
    let channels = dataset.channels();
    let io_err = |e: csv::Error| TireError::io(path, e);

    writer
        .write_record(channels.iter().map(|c| c.name.as_str()))
        .map_err(io_err)?;
    writer
        .write_record(channels.iter().map(|c| c.unit.as_str()))
        .map_err(io_err)?;
    let mut row = Vec::with_capacity(channels.len());
    for i in 0..dataset.len() {
        row.clear();
        row.extend(channels.iter().map(|c| c.values[i].to_string()));
        writer.write_record(&row).map_err(io_err)?;
    }
    writer.flush().map_err(|e| TireError::io(path, e))?;
    Ok(())
}

fn header_line(dataset: &Dataset) -> String {
    let meta = &dataset.meta;
    let mut pairs = vec![format!("{META_TIRE_NAME}={}", clean(&meta.tire_id))];
    if let Some(w) = meta.rim_width {
        pairs.push(format!("{META_RIM_WIDTH}={w}"));
    }
    if let Some(s) = dataset.unit_system {
        pairs.push(format!("{META_UNIT_SYSTEM}={s}"));
    }
    pairs.push(format!("{META_SIGN_CONVENTION}={}", dataset.sign_convention));
    if let Some(d) = meta.test_date {
        pairs.push(format!("{META_TEST_DATE}={}", d.format("%Y-%m-%d")));
    }
    if !meta.notes.is_empty() {
        pairs.push(format!("{META_NOTES}={}", clean(&meta.notes)));
    }
    pairs.join(";")
}

/// Header values cannot contain the pair separator or a line break.
fn clean(value: &str) -> String {
    value.replace([';', '\n', '\r'], " ")
}
