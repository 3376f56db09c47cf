/// Append-gage command: pull USGS daily discharge and merge its statistics
/// into the reference stores.

use anyhow::{Context, Result, bail};
use tracing::{info, info_span};

use swot_input::config::Config;
use swot_input::gage::append::ReferenceMerger;
use swot_input::gage::nwis::NwisClient;
use swot_input::gage::stats::DateWindow;
use swot_input::gage::{collect_statistics, load_targets};

use crate::cli::AppendGageArgs;

/// Run the gage pull and merge.
pub fn run(args: AppendGageArgs) -> Result<()> {
    let _cmd = info_span!("append_gage").entered();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    let window = DateWindow::new(args.start, args.end)?;

    let targets = load_targets(&args.targets)
        .with_context(|| format!("failed to read gage targets {}", args.targets.display()))?;
    if targets.is_empty() {
        bail!("no gage targets in {}", args.targets.display());
    }

    let client = NwisClient::new(&config.nwis.base_url, config.nwis.timeout(), config.retry.clone())?;
    let gages = collect_statistics(&client, &targets, &window);
    let with_data = gages.iter().filter(|g| g.stats.has_data()).count();
    info!(gages = gages.len(), with_data, days = window.len(), "gage statistics computed");

    let merger = ReferenceMerger::new(&args.store_dir);
    let report = merger
        .merge_all(&gages, &window)
        .with_context(|| format!("failed to merge into {}", args.store_dir.display()))?;
    info!(
        continents = report.written.len(),
        untouched = report.untouched.len(),
        "append-gage complete"
    );
    Ok(())
}
