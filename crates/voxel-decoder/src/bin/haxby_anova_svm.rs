//! Face vs house decoding on the Haxby dataset with ANOVA + SVM.
//!
//! Runs start to finish without arguments: fetches the dataset if needed,
//! cross-validates the decoder, prints the accuracy and writes the weight map.

use std::path::PathBuf;

use clap::Parser;
use voxel_decoder::config::DecodingConfig;
use voxel_decoder::{workflow, CvScheme, LinearSvcParams, MaskerParams, SelectionSize, TargetClasses};

#[derive(Parser)]
#[command(name = "haxby_anova_svm", about = "Decode face vs house from fMRI with ANOVA + SVM")]
struct Cli {
    /// Dataset directory.
    #[arg(long, env = "HAXBY_DATA")]
    data_dir: Option<PathBuf>,

    /// Directory for memoized masking results.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Always recompute the masked feature matrix.
    #[arg(long)]
    no_cache: bool,

    /// Smoothing FWHM in millimetres [default: 4].
    #[arg(long, conflicts_with = "no_smoothing")]
    smoothing_fwhm: Option<f32>,

    #[arg(long)]
    no_smoothing: bool,

    /// Skip per-session z-scoring of voxel time courses.
    #[arg(long)]
    no_standardize: bool,

    /// Voxels kept by the ANOVA selector [default: 500].
    #[arg(long, short = 'k')]
    n_features: Option<usize>,

    /// SVM penalty [default: 1].
    #[arg(long, short = 'c')]
    c: Option<f64>,

    /// Seed for the SVM solver [default: 42].
    #[arg(long)]
    seed: Option<u64>,

    /// Cross-validation scheme.
    #[arg(long, value_enum, default_value_t = CvScheme::Default)]
    cv: CvScheme,

    /// Folds for the k-fold schemes [default: 3].
    #[arg(long)]
    n_folds: Option<usize>,

    /// The two conditions to discriminate.
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"])]
    classes: Option<Vec<String>>,

    /// Weight map output [default: haxby_face_vs_house.nii].
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Rendered map output [default: haxby_face_vs_house.png].
    #[arg(long)]
    plot: Option<PathBuf>,

    #[arg(long)]
    no_plot: bool,

    /// Write a JSON run report here.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn build_config(cli: Cli) -> Result<DecodingConfig, Box<dyn std::error::Error>> {
    let mut masker = MaskerParams::default();
    if cli.no_smoothing {
        masker.smoothing_fwhm = None;
    } else if let Some(fwhm) = cli.smoothing_fwhm {
        masker.smoothing_fwhm = Some(fwhm);
    }
    masker.standardize = !cli.no_standardize;

    let defaults = LinearSvcParams::default();
    let svm = LinearSvcParams {
        c: cli.c.unwrap_or(defaults.c),
        seed: cli.seed.unwrap_or(defaults.seed),
        ..defaults
    };

    let targets = match cli.classes.as_deref() {
        Some([first, second]) => TargetClasses::new(first.as_str(), second.as_str())?,
        _ => TargetClasses::default(),
    };

    let config = DecodingConfig::builder()
        .maybe_data_dir(cli.data_dir)
        .maybe_cache_dir(cli.cache_dir)
        .use_cache(!cli.no_cache)
        .targets(targets)
        .masker(masker)
        .maybe_n_features(cli.n_features.map(SelectionSize::K))
        .svm(svm)
        .cv(cli.cv)
        .maybe_n_folds(cli.n_folds)
        .maybe_output(cli.output)
        .maybe_plot_path(cli.plot)
        .render_plot(!cli.no_plot)
        .maybe_report(cli.report)
        .build()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(cli)?;
    let report = workflow::run(&config)?;

    println!(
        "Classification accuracy: {:.4} / Chance level: {:.6}",
        report.accuracy, report.chance_level
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
