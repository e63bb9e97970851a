mod batches;
mod config;
mod error;

use std::{error::Error as _, io::Write as _, path::PathBuf, process::ExitCode};

use chrono::Local;
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::LevelFilter;

use pcd_augmenter::LasAugmenter;
use pcd_interpolator::{NearestNeighborInterpolator, Weighting};
use pcd_pipeline::{LasTileStore, Orchestrator, PipelineError, TileReport};

use crate::{batches::BatchReader, config::expand_globs, error::AppError};

#[derive(Parser, Debug)]
#[command(
    name = "pcd-interp",
    about = "Projects sub-sampled per-tile predictions back onto full-resolution point clouds",
    author = "MIERUNE Inc.",
    version = "0.0.1"
)]
struct Cli {
    /// JSON Lines files of prediction batches; glob patterns are expanded
    #[arg(short, long, required = true, num_args = 1.., value_name = "FILE")]
    batches: Vec<String>,

    /// JSON array of {"code", "name"} entries, in class index order
    #[arg(short, long, required = true, value_name = "FILE")]
    classes: PathBuf,

    /// Class names that get a probability channel
    #[arg(short, long, num_args = 0.., value_name = "NAME")]
    probas: Vec<String>,

    /// Output directory; without it results are computed but not written
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    #[arg(short, default_value_t = 1)]
    k: usize,

    #[arg(long, value_enum, default_value_t = WeightingArg::InverseDistance)]
    weighting: WeightingArg,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WeightingArg {
    InverseDistance,
    Uniform,
}

impl From<WeightingArg> for Weighting {
    fn from(arg: WeightingArg) -> Self {
        match arg {
            WeightingArg::InverseDistance => Weighting::InverseSquaredDistance,
            WeightingArg::Uniform => Weighting::Uniform,
        }
    }
}

fn summarize(reports: &[TileReport]) {
    for report in reports {
        match &report.output {
            Some(output) => log::info!(
                "{:?}: {} points from {} samples -> {:?}",
                report.tile,
                report.points,
                report.sampled_points,
                output
            ),
            None => log::info!(
                "{:?}: {} points from {} samples (not written)",
                report.tile,
                report.points,
                report.sampled_points
            ),
        }
    }

    let (correct, total) = reports
        .iter()
        .filter_map(|report| Some((report.accuracy? * report.points as f64, report.points)))
        .fold((0.0, 0), |(correct, total), (c, n)| (correct + c, total + n));
    if total > 0 {
        log::info!(
            "overall accuracy: {:.4} over {} points",
            correct / total as f64,
            total
        );
    }
}

fn run(args: Cli) -> Result<Vec<TileReport>, AppError> {
    let classes = config::load_class_dictionary(&args.classes)?;
    log::info!("class dictionary: {} classes", classes.len());

    let augmenter = LasAugmenter::new(classes, &args.probas)?;
    let interpolator = NearestNeighborInterpolator::new(args.k, args.weighting.into())?;

    if let Some(output) = &args.output {
        std::fs::create_dir_all(output).map_err(|source| AppError::Io {
            path: output.clone(),
            source,
        })?;
    }

    let batch_files = expand_globs(&args.batches)?;
    log::info!("batch files: {:?}", batch_files);

    let store = LasTileStore::new(augmenter, args.output);
    let mut orchestrator = Orchestrator::new(store, interpolator);
    for batch in BatchReader::new(batch_files) {
        orchestrator.push_batch(batch.map_err(PipelineError::batch_source)?)?;
    }
    Ok(orchestrator.finish()?)
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .init();

    log::info!("batches: {:?}", args.batches);
    log::info!("class dictionary: {:?}", args.classes);
    log::info!("probability channels: {:?}", args.probas);
    log::info!("output folder: {:?}", args.output);
    log::info!("k: {}, weighting: {:?}", args.k, args.weighting);

    let start = std::time::Instant::now();
    match run(args) {
        Ok(reports) => {
            summarize(&reports);
            log::info!(
                "interpolated {} tiles in {:?}",
                reports.len(),
                start.elapsed()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{}", err);
            let mut source = err.source();
            while let Some(cause) = source {
                log::error!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
