//! Formatted terminal output.
//!
//! Formatting lives here so the conversion and fitting code never prints, and
//! output changes stay in one place.

use crate::app::pipeline::{FitOutcome, RunOutput};
use crate::domain::{Channel, Dataset, FitQuality, ModelKind, Provenance};
use crate::fit::LevelFit;
use crate::io::export::FitExport;
use std::collections::BTreeMap;

/// Dataset header plus one line per channel with its range and NaN count.
pub fn format_dataset_summary(dataset: &Dataset) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {} ===\n", dataset.id));
    if !dataset.path.as_os_str().is_empty() {
        out.push_str(&format!("File: {}\n", dataset.path.display()));
    }
    let meta = &dataset.meta;
    if !meta.tire_id.is_empty() {
        out.push_str(&format!("Tire: {}\n", meta.tire_id));
    }
    if let Some(w) = meta.rim_width {
        out.push_str(&format!("Rim width: {w}\n"));
    }
    if let Some(d) = meta.test_date {
        out.push_str(&format!("Test date: {d}\n"));
    }
    if !meta.notes.is_empty() {
        out.push_str(&format!("Notes: {}\n", meta.notes));
    }
    out.push_str(&format!(
        "Units: {} | Convention: {} | Rows: {} | Channels: {}\n\n",
        dataset
            .unit_system
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        dataset.sign_convention,
        dataset.len(),
        dataset.channels().len()
    ));

    out.push_str(&format!(
        "{:<10} {:<8} {:<16} {:<9} {:>12} {:>12} {:>6}\n",
        "channel", "unit", "kind", "source", "min", "max", "nan"
    ));
    out.push_str(&format!(
        "{:-<10} {:-<8} {:-<16} {:-<9} {:-<12} {:-<12} {:-<6}\n",
        "", "", "", "", "", "", ""
    ));
    for ch in dataset.channels() {
        out.push_str(&channel_row(ch));
    }
    out
}

fn channel_row(ch: &Channel) -> String {
    let (min, max, nan) = ch.values.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0usize),
        |(lo, hi, nan), &v| {
            if v.is_finite() { (lo.min(v), hi.max(v), nan) } else { (lo, hi, nan + 1) }
        },
    );
    let source = match ch.provenance {
        Provenance::Raw => "raw",
        Provenance::Derived => "derived",
        Provenance::Command => "command",
    };
    let range = |v: f64| {
        if v.is_finite() { format!("{v:>12.3}") } else { format!("{:>12}", "-") }
    };
    format!(
        "{:<10} {:<8} {:<16} {:<9} {} {} {:>6}\n",
        truncate(&ch.name, 10),
        truncate(&ch.unit, 8),
        ch.kind.label(),
        source,
        range(min),
        range(max),
        nan
    )
}

/// Model, parameter table (with standard errors when available) and quality.
pub fn format_fit(
    model: ModelKind,
    x_channel: &str,
    y_channel: &str,
    parameters: &BTreeMap<String, f64>,
    uncertainties: Option<&BTreeMap<String, f64>>,
    quality: &FitQuality,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Model: {model} ({y_channel} vs {x_channel})\n"));
    for name in model.param_names() {
        let value = parameters.get(&name).copied().unwrap_or(f64::NAN);
        match uncertainties.and_then(|u| u.get(&name)) {
            Some(se) => out.push_str(&format!("  {name:<3} = {value:>14.6e} ± {se:.3e}\n")),
            None => out.push_str(&format!("  {name:<3} = {value:>14.6e}\n")),
        }
    }
    out.push_str(&format_quality(quality));
    out
}

fn format_quality(q: &FitQuality) -> String {
    format!(
        "R² = {:.5} | RMSE = {:.4e} | SSE = {:.4e} | n = {}\n",
        q.r_squared, q.rmse, q.sse, q.n
    )
}

/// One line per command level; failed levels show their error.
pub fn format_level_fits(channel: &str, fits: &[LevelFit]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>10} {:>6} {:>9} {:>12}  {}\n",
        channel, "rows", "R²", "RMSE", "parameters"
    ));
    out.push_str(&format!("{:->10} {:->6} {:->9} {:->12}  {:-<10}\n", "", "", "", "", ""));
    for lf in fits {
        match &lf.result {
            Ok(fit) => out.push_str(&format!(
                "{:>10} {:>6} {:>9.5} {:>12.4e}  {}\n",
                lf.level,
                lf.rows,
                fit.quality.r_squared,
                fit.quality.rmse,
                fmt_vec(&fit.values())
            )),
            Err(e) => out.push_str(&format!("{:>10} {:>6}  failed: {e}\n", lf.level, lf.rows)),
        }
    }
    out
}

/// Summary of a `fit` run.
pub fn format_run_summary(run: &RunOutput) -> String {
    let mut out = String::new();
    let ds = &run.stored;
    out.push_str(&format!(
        "=== tirefit: {} ({}, {}) ===\n",
        ds.id,
        ds.unit_system
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown units".to_string()),
        ds.sign_convention
    ));
    out.push_str(&format!("Rows: {} stored, {} after conditions", ds.len(), run.subset.len()));
    if let Some(n) = run.fit_rows {
        out.push_str(&format!(", {n} driving the fit"));
    }
    out.push('\n');
    if let Some(report) = &run.outliers {
        out.push_str(&format!("Outliers masked: {}\n", report.flagged()));
    }
    out.push('\n');

    match &run.outcome {
        FitOutcome::Single(fit) => out.push_str(&format_fit(
            fit.model,
            &fit.x_channel,
            &fit.y_channel,
            &fit.parameters,
            fit.uncertainties.as_ref(),
            &fit.quality,
        )),
        FitOutcome::PerLevel(levels) => {
            let channel = levels
                .iter()
                .find_map(|l| l.result.as_ref().ok())
                .map(|f| format!("{} vs {}", f.y_channel, f.x_channel))
                .unwrap_or_default();
            out.push_str(&format!("Per-level fits {channel}\n"));
            out.push_str(&format_level_fits("level", levels));
        }
    }
    out
}

/// Summary of a saved fit.
pub fn format_export(export: &FitExport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== {} fit of '{}' ({}) ===\n",
        export.tool,
        export.dataset_id,
        export.exported_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Units: {} | Convention: {}\n",
        export
            .unit_system
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        export.sign_convention
    ));
    out.push_str(&format_fit(
        export.model,
        &export.x_channel,
        &export.y_channel,
        &export.parameters,
        export.uncertainties.as_ref(),
        &export.quality,
    ));
    out
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.4e}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
