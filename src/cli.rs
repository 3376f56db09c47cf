use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use swot_input::align::MismatchPolicy;
use swot_input::fields::Product;
use swot_input::jobs::ARRAY_INDEX_ENV;

/// SWOT reach/node time-series input builder.
#[derive(Parser)]
#[command(
    name = "swot_input",
    version,
    about = "Assemble SWOT reach, node and lake observations into per-feature datasets"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Build the dataset for one job of a batch.
    Extract(ExtractArgs),
    /// Pull gage discharge and merge its statistics into the reference stores.
    AppendGage(AppendGageArgs),
}

/// Where observation records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Hydrocron timeseries API.
    Hydrocron,
    /// Directory of per-pass attribute tables.
    Local,
    /// JSON capture of previously fetched records.
    Replay,
}

/// Arguments for the `extract` subcommand.
#[derive(clap::Args)]
pub struct ExtractArgs {
    /// JSON job list.
    #[arg(short, long)]
    pub jobs: PathBuf,

    /// Job index; defaults to the batch array index.
    #[arg(short, long, env = ARRAY_INDEX_ENV)]
    pub index: usize,

    /// Output directory; datasets land in `<output>/swot/`.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Record source.
    #[arg(long, value_enum, default_value_t = SourceKind::Hydrocron)]
    pub source: SourceKind,

    /// SWOT product directory (shapefiles or CSV exports) for `--source local`.
    #[arg(long, required_if_eq("source", "local"))]
    pub local_dir: Option<PathBuf>,

    /// Capture file for `--source replay`.
    #[arg(long, required_if_eq("source", "replay"))]
    pub replay: Option<PathBuf>,

    /// Expected product of the selected job (river or lake).
    #[arg(long)]
    pub product: Option<Product>,

    /// Earliest observation time (RFC 3339); overrides the config.
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// Latest observation time (RFC 3339); overrides the config.
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,

    /// Reach/node mismatch policy (lenient or strict); overrides the config.
    #[arg(long)]
    pub policy: Option<MismatchPolicy>,

    /// Path to TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `append-gage` subcommand.
#[derive(clap::Args)]
pub struct AppendGageArgs {
    /// `usgs_id,reach_id` CSV of gages to pull.
    #[arg(short, long)]
    pub targets: PathBuf,

    /// Directory of per-continent reference stores.
    #[arg(short, long)]
    pub store_dir: PathBuf,

    /// First day to pull (YYYY-MM-DD).
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day to pull (YYYY-MM-DD).
    #[arg(long)]
    pub end: NaiveDate,

    /// Path to TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
