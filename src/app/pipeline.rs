//! End-to-end run shared by the CLI commands.
//!
//! import -> units -> convention -> command channels -> filter -> outliers
//! -> condition subset -> downsample -> fit
//!
//! Downsampling only chooses the rows that drive the fit. Fit quality is always
//! reported on the full conditioned subset.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use crate::app::controller::DataController;
use crate::config::PipelineConfig;
use crate::data::DataManager;
use crate::domain::{Condition, Dataset, DatasetId, FitResult, ModelKind, Provenance, QuantityKind, UnitSystem};
use crate::downsample::DataDownsampler;
use crate::error::TireError;
use crate::fit::{FitRequest, LevelFit, ModelFitter};
use crate::signal::{OutlierReport, apply_filter, mask_outliers};

/// What to fit after conditioning.
#[derive(Debug, Clone)]
pub struct FitJob {
    pub model: ModelKind,
    pub x_channel: String,
    pub y_channel: String,
    /// Fit every level of this command channel separately.
    pub by_level: Option<String>,
    /// Keep only rows matching every condition before fitting.
    pub conditions: Vec<Condition>,
    /// Unit system of a file that does not declare one.
    pub assume_units: Option<UnitSystem>,
    /// Store the dataset under this name instead of the file stem.
    pub name: Option<String>,
}

impl FitJob {
    pub fn new(model: ModelKind, x_channel: impl Into<String>, y_channel: impl Into<String>) -> Self {
        Self {
            model,
            x_channel: x_channel.into(),
            y_channel: y_channel.into(),
            by_level: None,
            conditions: Vec::new(),
            assume_units: None,
            name: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FitOutcome {
    Single(FitResult),
    PerLevel(Vec<LevelFit>),
}

/// All computed outputs of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Dataset as stored after conversions and command channels.
    pub stored: Arc<Dataset>,
    /// Rows the fit was evaluated on.
    pub subset: Dataset,
    pub outliers: Option<OutlierReport>,
    /// Rows that drove the fit when downsampling is enabled.
    pub fit_rows: Option<usize>,
    pub outcome: FitOutcome,
}

/// Import one file and prepare it (conversions and command channels) in a fresh store.
pub fn prepare(
    controller: &DataController,
    input: &Path,
    config: &PipelineConfig,
    assume_units: Option<UnitSystem>,
) -> Result<Arc<Dataset>, TireError> {
    let id = controller
        .import_data(&[input.to_path_buf()])?
        .into_iter()
        .next()
        .ok_or_else(|| TireError::import(input, "nothing imported"))?;

    let mut current = controller.get_dataset(&id)?;
    if current.unit_system.is_none() {
        if let Some(system) = assume_units {
            current = controller.assign_unit_system(&id, system)?;
        }
    }
    if let Some(to) = config.unit_system {
        current = controller.convert_units(&id, to)?;
    }
    if let Some(to) = config.sign_convention {
        current = controller.convert_convention(&id, to)?;
    }
    if matches!(current.unit_system, Some(UnitSystem::Uscs | UnitSystem::Metric)) {
        current = controller.add_command_channels(&id)?;
    } else {
        debug!("'{id}': no command levels for unit system {:?}", current.unit_system);
    }
    Ok(current)
}

pub fn run_fit(input: &Path, config: &PipelineConfig, job: &FitJob) -> Result<RunOutput, TireError> {
    config.validate()?;
    job.model.validate()?;
    let controller = DataController::new(DataManager::shared(), config.command_options());
    let mut stored = prepare(&controller, input, config, job.assume_units)?;
    if let Some(name) = &job.name {
        let new_id = DatasetId::from(name.as_str());
        controller.rename_dataset(&stored.id, new_id.clone())?;
        stored = controller.get_dataset(&new_id)?;
    }

    // Conditioning builds derived datasets; the stored entry keeps the raw samples.
    let mut conditioned = (*stored).clone();
    if let Some(spec) = config.filter_spec() {
        let names: Vec<String> = conditioned
            .channels()
            .iter()
            .filter(|c| c.provenance != Provenance::Command)
            .filter(|c| matches!(c.kind, QuantityKind::Force | QuantityKind::Moment))
            .map(|c| c.name.clone())
            .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        conditioned = apply_filter(&conditioned, &refs, &spec)?;
    }
    let outliers = match config.outlier_threshold {
        Some(threshold) => {
            let (masked, report) =
                mask_outliers(&conditioned, &job.y_channel, config.outlier_method, threshold)?;
            conditioned = masked;
            Some(report)
        }
        None => None,
    };

    let rows = conditioned.rows_matching(&job.conditions)?;
    let subset = conditioned.select_rows(&rows)?;
    if subset.is_empty() {
        return Err(TireError::validation(Some(&subset.id), "no rows match the fit conditions"));
    }

    let mut request = FitRequest::new(job.model, job.x_channel.clone(), job.y_channel.clone());
    let mut fit_rows = None;
    if let Some(strategy) = config.downsample() {
        let keep = DataDownsampler.indices(&subset, &strategy)?;
        fit_rows = Some(keep.len());
        request = request.with_fit_rows(keep);
    }

    let fitter = ModelFitter::default();
    let outcome = match &job.by_level {
        Some(channel) => FitOutcome::PerLevel(fitter.fit_by_level(&subset, &request, channel)?),
        None => FitOutcome::Single(fitter.fit(&subset, &request)?),
    };
    info!("Pipeline finished for '{}'", stored.id);

    Ok(RunOutput {
        stored,
        subset,
        outliers,
        fit_rows,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleConfig, generate_sample};
    use crate::domain::SignConvention;
    use crate::io::export::write_dat;
    use std::path::PathBuf;

    fn sample_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("tirefit-pipe-{}-{name}", std::process::id()));
        write_dat(&path, &generate_sample(&SampleConfig::default()).unwrap()).unwrap();
        path
    }

    #[test]
    fn converts_then_fits_one_level() {
        let path = sample_file("one.dat");
        let config = PipelineConfig::from_toml_str(
            r#"
            unit_system = "Metric"
            sign_convention = "ISO"
            downsample_strategy = "grid"
            downsample_factor = 2
            "#,
        )
        .unwrap();
        let mut job = FitJob::new(ModelKind::MagicFormula, "SA", "FY");
        // ISO flips FZ, so the -100 lbf level becomes +445 N.
        job.conditions = vec![Condition::new("CmdFZ", vec![445.0])];
        let out = run_fit(&path, &config, &job).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(out.stored.unit_system, Some(UnitSystem::Metric));
        assert_eq!(out.stored.sign_convention, SignConvention::Iso);
        let FitOutcome::Single(fit) = out.outcome else {
            panic!("expected a single fit");
        };
        assert!(out.fit_rows.unwrap_or(0) < out.subset.len());
        assert_eq!(fit.quality.n, out.subset.len());
        assert!(fit.quality.r_squared > 0.98, "{:?}", fit.quality);
    }

    #[test]
    fn fits_every_level() {
        let path = sample_file("levels.dat");
        let mut job = FitJob::new(ModelKind::Polynomial { degree: 3 }, "SA", "FY");
        job.by_level = Some("CmdFZ".into());
        job.name = Some("front-left".into());
        let out = run_fit(&path, &PipelineConfig::default(), &job).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(out.stored.id, DatasetId::from("front-left"));
        assert_eq!(out.stored.meta.name, "front-left");
        assert_eq!(out.subset.id, DatasetId::from("front-left"));

        let FitOutcome::PerLevel(levels) = out.outcome else {
            panic!("expected per-level fits");
        };
        let found: Vec<f64> = levels.iter().map(|l| l.level).collect();
        assert_eq!(found, vec![-50.0, -100.0, -150.0]);
        assert!(levels.iter().all(|l| l.result.is_ok()));
    }

    #[test]
    fn outlier_masking_keeps_rows() {
        let path = sample_file("outliers.dat");
        let config = PipelineConfig::from_toml_str("outlier_threshold = 3.0\nfilter_cutoff = 20.0").unwrap();
        let out = run_fit(&path, &config, &FitJob::new(ModelKind::Polynomial { degree: 1 }, "SA", "FY")).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(out.subset.len(), 1000);
        assert_eq!(out.outliers.unwrap().mask.len(), 1000);
    }

    #[test]
    fn empty_condition_match_is_an_error() {
        let path = sample_file("empty.dat");
        let mut job = FitJob::new(ModelKind::MagicFormula, "SA", "FY");
        job.conditions = vec![Condition::new("CmdFZ", vec![-350.0])];
        let err = run_fit(&path, &PipelineConfig::default(), &job).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, TireError::Validation { .. }), "{err}");
    }
}
