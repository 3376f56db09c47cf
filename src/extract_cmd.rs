/// Extract command: build the dataset for one job of a batch.

use anyhow::{Context, Result, bail};
use tracing::{info, info_span};

use swot_input::config::Config;
use swot_input::ingest::hydrocron::HydrocronSource;
use swot_input::ingest::local::LocalSource;
use swot_input::ingest::replay::ReplaySource;
use swot_input::ingest::{RecordSource, TimeRange};
use swot_input::jobs::{Job, JobList};
use swot_input::logging::DataSource;
use swot_input::output::{JsonWriter, OutputWriter};
use swot_input::pipeline;

use crate::cli::{ExtractArgs, SourceKind};

fn open_source(args: &ExtractArgs, config: &Config, range: TimeRange) -> Result<(Box<dyn RecordSource>, DataSource)> {
    Ok(match args.source {
        SourceKind::Hydrocron => {
            let source = HydrocronSource::new(
                &config.hydrocron.base_url,
                config.hydrocron.timeout(),
                config.hydrocron.api_key(),
                range,
                config.retry.clone(),
            )?;
            (Box::new(source), DataSource::Hydrocron)
        }
        SourceKind::Local => {
            let dir = args.local_dir.as_ref().context("--local-dir is required for --source local")?;
            let source = LocalSource::open(dir, range)
                .with_context(|| format!("failed to index attribute tables in {}", dir.display()))?;
            (Box::new(source), DataSource::Local)
        }
        SourceKind::Replay => {
            let path = args.replay.as_ref().context("--replay is required for --source replay")?;
            let source = ReplaySource::load(path, range)
                .with_context(|| format!("failed to load replay capture {}", path.display()))?;
            (Box::new(source), DataSource::Replay)
        }
    })
}

/// Run one extract job.
pub fn run(args: ExtractArgs) -> Result<()> {
    let _cmd = info_span!("extract", index = args.index).entered();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    let policy = args.policy.unwrap_or(config.extract.policy);
    let range = TimeRange::new(
        args.start.or(config.extract.start),
        args.end.or(config.extract.end),
    );

    let jobs = JobList::load(&args.jobs)
        .with_context(|| format!("failed to read job list {}", args.jobs.display()))?;
    let job = jobs.select(args.index).context("invalid job selection")?;
    if let Some(expected) = args.product {
        if job.product() != expected {
            bail!(
                "job {} is a {:?} job, expected {:?}",
                args.index,
                job.product(),
                expected
            );
        }
    }
    info!(feature_id = %job.feature_id(), product = ?job.product(), ?policy, "selected job");

    let (source, data_source) = open_source(&args, &config, range)?;
    let dataset = match job {
        Job::Reach(reach) => pipeline::run_reach(source.as_ref(), data_source, reach, policy),
        Job::Lake(lake) => pipeline::run_lake(source.as_ref(), data_source, lake.lake_id),
    }
    .with_context(|| format!("failed to assemble {}", job.feature_id()))?;

    let writer = JsonWriter::new(&args.output);
    let path = writer.write(&dataset)?;
    info!(path = %path.display(), nt = dataset.time_count(), "extract complete");
    Ok(())
}
