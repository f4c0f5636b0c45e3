use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::data::calibration::{CalibrationProfile, UnitConverter};
use crate::data::export::{DatasetExporter, ExportRequest};
use crate::data::filter::FilterPredicate;
use crate::data::payload::scale_payload_dirs;
use crate::remote::worker::segment_all;
use crate::remote::SegmentClient;

/// Accelerometer dataset preparation for fall detection
#[derive(Parser, Debug)]
#[command(name = "fallprep", version, about, long_about = None)]
pub struct Cli {
    /// JSON pipeline configuration; built-in profiles are used when absent.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Filter a recording table and write one CSV per labeled sample
    Export(ExportArgs),

    /// Normalize a directory of raw `;`-terminated sensor logs
    ConvertLogs(ConvertLogsArgs),

    /// Rewrite exported JSON sample payloads in g
    ScalePayloads(ScalePayloadsArgs),

    /// Request and commit fixed-length segments for remote samples
    Segment,

    /// Print the total duration of remote samples
    Lengths(LengthsArgs),
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Recording table (.parquet, .json or .csv)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory, created when missing
    #[arg(short, long)]
    pub output: PathBuf,

    /// Label used in output file names
    #[arg(short, long)]
    pub label: String,

    /// Lowest activity id to keep (inclusive)
    #[arg(long, default_value_t = 101)]
    pub activity_min: i64,

    /// Highest activity id to keep (inclusive)
    #[arg(long, default_value_t = 135)]
    pub activity_max: i64,

    /// Sensor placement, compared ignoring case
    #[arg(long, default_value = "waist")]
    pub device: String,

    /// Dataset profile name
    #[arg(long, default_value = "fallalld")]
    pub profile: String,
}

#[derive(Args, Debug)]
pub struct ConvertLogsArgs {
    #[arg(short, long)]
    pub input: PathBuf,

    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(long, default_value = "sisfall")]
    pub profile: String,
}

#[derive(Args, Debug)]
pub struct ScalePayloadsArgs {
    /// Directories holding the JSON sample files
    #[arg(required = true)]
    pub dirs: Vec<PathBuf>,

    /// Calibration name (g_units, adxl345_16g, lsm9ds1_8g)
    #[arg(long, default_value = "lsm9ds1_8g")]
    pub calibration: String,
}

#[derive(Args, Debug)]
pub struct LengthsArgs {
    /// Sample ids; all ids of the configured category when empty
    pub ids: Vec<u64>,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            PipelineConfig::from_json(path)
                .with_context(|| format!("loading configuration {}", path.display()))
        }
        None => {
            let cfg = PipelineConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Export(args) => {
            let profile = config.profile(&args.profile)?.clone();
            let exporter = DatasetExporter::new(profile, config.target_hz)?;
            let request = ExportRequest {
                label: args.label,
                predicate: FilterPredicate::new(args.activity_min, args.activity_max, args.device)?,
                output_dir: args.output,
            };
            let summary = exporter.run(&args.input, &request)?;
            log::info!(
                "✅ {} CSV files exported to {}",
                summary.exported,
                request.output_dir.display()
            );
        }
        Commands::ConvertLogs(args) => {
            let profile = config.profile(&args.profile)?.clone();
            let exporter = DatasetExporter::new(profile, config.target_hz)?;
            exporter.convert_logs(&args.input, &args.output)?;
        }
        Commands::ScalePayloads(args) => {
            let calibration = CalibrationProfile::by_name(&args.calibration)
                .with_context(|| format!("unknown calibration '{}'", args.calibration))?;
            let converter = UnitConverter::new(calibration)?;
            scale_payload_dirs(&args.dirs, &converter)?;
        }
        Commands::Segment => {
            let client = SegmentClient::new(&config.remote)?;
            let ids = client.list_sample_ids(&config.remote.category, &config.remote.labels)?;
            log::info!("Sample Count: {}", ids.len());
            segment_all(&client, &ids, config.remote.workers)?;
        }
        Commands::Lengths(args) => {
            let client = SegmentClient::new(&config.remote)?;
            let ids = if args.ids.is_empty() {
                client.list_sample_ids(&config.remote.category, &config.remote.labels)?
            } else {
                args.ids
            };
            for id in ids {
                match client.sample_length_ms(id) {
                    Ok(ms) => println!("{id}\t{ms}"),
                    Err(e) => log::error!("sample {id}: {e}"),
                }
            }
        }
    }
    Ok(())
}
