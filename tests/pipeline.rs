use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tire_fit::app::pipeline::{FitJob, FitOutcome, run_fit};
use tire_fit::config::PipelineConfig;
use tire_fit::convert::{
    CmdChannelGenerator, CommandOptions, ConventionConverter, ConversionTable, SignTable, UnitSystemConverter,
};
use tire_fit::domain::{ModelKind, SignConvention, UnitSystem};
use tire_fit::downsample::{DataDownsampler, DownsampleStrategy};
use tire_fit::fit::{FitRequest, ModelFitter};
use tire_fit::data::{SampleConfig, generate_sample};
use tire_fit::io::export::{FitExport, read_fit_json, write_dat, write_fit_json};
use tire_fit::io::import_file;

fn temp(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tirefit-it-{}-{name}", std::process::id()))
}

/// 1000-row USCS/SAE cornering log: three load blocks, one slip sweep per block.
fn write_rig_log(path: &PathBuf) {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut text = String::from("Tire_Name=Hoosier 43075;Unit_System=USCS;Sign_Convention=SAE\nFZ\tSA\tFY\nlb\tdeg\tlb\n");
    let loads = [-50.0, -100.0, -150.0];
    let block = 334;
    for i in 0..1000 {
        let fz: f64 = loads[i / block] + rng.gen_range(-0.5..0.5);
        let phase = (i % block) as f64 / block as f64;
        let tri = if phase < 0.25 {
            4.0 * phase
        } else if phase < 0.75 {
            2.0 - 4.0 * phase
        } else {
            4.0 * phase - 4.0
        };
        let sa = 10.0 * tri + rng.gen_range(-0.05..0.05);
        let fy = -(20.0 * sa - 0.05 * sa.powi(3)) * fz.abs() / 100.0 + rng.gen_range(-1.0..1.0);
        text.push_str(&format!("{fz}\t{sa}\t{fy}\n"));
    }
    std::fs::write(path, text).unwrap();
}

#[test]
fn import_convert_command_downsample_fit() {
    let path = temp("rig.dat");
    write_rig_log(&path);
    let raw = import_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(raw.len(), 1000);
    assert_eq!(raw.unit_system, Some(UnitSystem::Uscs));
    assert_eq!(raw.sign_convention, SignConvention::Sae);

    let signs = SignTable::shared();
    let units = UnitSystemConverter::new(ConversionTable::shared());
    let convention = ConventionConverter::new(Arc::clone(&signs));
    let commands = CmdChannelGenerator::new(ConventionConverter::new(signs), CommandOptions::default());

    let metric = units.convert_dataset(&raw, UnitSystem::Metric).unwrap();
    let iso = convention.convert_dataset_convention(&metric, SignConvention::Iso);
    let ds = commands.with_command_channels(&iso).unwrap();

    // Inputs are untouched.
    assert_eq!(raw.unit_system, Some(UnitSystem::Uscs));
    assert_eq!(metric.sign_convention, SignConvention::Sae);

    // Levels are [0, -222, -445, -667] N in SAE; ISO flips FZ.
    let cmd = ds.values("CmdFZ").unwrap();
    assert_eq!(cmd.len(), 1000);
    for &v in cmd.iter().filter(|v| v.is_finite()) {
        assert!([0.0, -222.0, -445.0, -667.0].contains(&-v), "unexpected level {v}");
    }
    let at_445 = cmd.iter().filter(|&&v| v == 445.0).count();
    assert!(at_445 > 250, "{at_445} rows at 445 N");

    let strategy = DownsampleStrategy::Grid {
        factor: 5,
        x_channel: "SA".into(),
    };
    let keep = DataDownsampler.indices(&ds, &strategy).unwrap();
    assert!(keep.len() <= 201, "kept {}", keep.len());
    assert_eq!(keep.first(), Some(&0));
    assert_eq!(keep.last(), Some(&999));
    let reduced = DataDownsampler.downsample(&ds, &strategy).unwrap();
    for ch in reduced.channels() {
        assert_eq!(ch.len(), keep.len());
    }

    let request = FitRequest::new(ModelKind::Polynomial { degree: 3 }, "SA", "FY").with_fit_rows(keep);
    let fits = ModelFitter::default().fit_by_level(&ds, &request, "CmdFZ").unwrap();
    let level = fits.iter().find(|l| l.level == 445.0).unwrap();
    let fit = level.result.as_ref().unwrap();

    assert!((2..=4).contains(&fit.parameters.len()));
    assert!((0.0..=1.0).contains(&fit.quality.r_squared));
    assert!(fit.quality.r_squared > 0.95, "{:?}", fit.quality);
    // Quality covers every row of the level, not just the downsampled ones.
    assert_eq!(fit.quality.n, level.rows);
}

#[test]
fn fit_export_round_trips_through_the_pipeline() {
    let path = temp("export.dat");
    write_dat(&path, &generate_sample(&SampleConfig::default()).unwrap()).unwrap();
    let config = PipelineConfig::from_toml_str("unit_system = \"Metric\"\ndownsample_strategy = \"smart\"").unwrap();
    let mut job = FitJob::new(ModelKind::MagicFormula, "SA", "FY");
    job.conditions = vec![tire_fit::domain::Condition::new("CmdFZ", vec![-667.0])];
    let run = run_fit(&path, &config, &job).unwrap();
    let _ = std::fs::remove_file(&path);

    let FitOutcome::Single(fit) = &run.outcome else {
        panic!("expected a single fit");
    };
    let json = temp("fit.json");
    let export = FitExport::new(&run.subset, fit);
    write_fit_json(&json, &export).unwrap();
    let back = read_fit_json(&json).unwrap();
    let _ = std::fs::remove_file(&json);

    assert_eq!(back, export);
    assert_eq!(back.model, ModelKind::MagicFormula);
    assert_eq!(back.unit_system, Some(UnitSystem::Metric));
    for x in [-8.0, -2.0, 0.5, 6.0] {
        assert_eq!(back.evaluate(x), fit.model.evaluate(x, &fit.values()));
    }
}
