/// USGS gage reference data.
///
/// Daily discharge for each target gage is pulled from NWIS, reduced to
/// summary statistics, and merged into the per-continent reference stores
/// under `model.usgs`:
///
/// - `nwis`: daily-values URL construction, response parsing, fetch
/// - `stats`: masking, unit conversion, summary statistics
/// - `append`: reference-store model and the per-continent merge

pub mod append;
pub mod nwis;
pub mod stats;

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::logging::{self, DataSource};
use crate::model::{FeatureId, InputError};
use stats::{DateWindow, GageStatistics};

/// One gage to pull and the reach it is mapped to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GageTarget {
    /// USGS site number, kept as text to preserve leading zeros.
    pub usgs_id: String,
    pub reach_id: FeatureId,
}

/// A target together with its computed statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct GageRecord {
    pub target: GageTarget,
    pub stats: GageStatistics,
}

/// Parses a `usgs_id,reach_id` CSV.
pub fn parse_targets(csv_text: &str) -> Result<Vec<GageTarget>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());
    let mut targets = Vec::new();
    for row in reader.deserialize() {
        let target: GageTarget = row?;
        if target.usgs_id.is_empty() || !target.usgs_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InputError::InvalidIdentifier(target.usgs_id));
        }
        targets.push(target);
    }
    Ok(targets)
}

pub fn load_targets(path: &Path) -> Result<Vec<GageTarget>, InputError> {
    let text = fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
    let targets = parse_targets(&text)?;
    tracing::info!(path = %path.display(), targets = targets.len(), "loaded gage targets");
    Ok(targets)
}

/// Fetches and summarizes every target.
///
/// A gage whose pull fails keeps all-missing statistics; it is still written
/// so the gage list stays aligned with the target file.
pub fn collect_statistics(
    client: &nwis::NwisClient,
    targets: &[GageTarget],
    window: &DateWindow,
) -> Vec<GageRecord> {
    let mut failed = 0;
    let records = targets
        .iter()
        .map(|target| {
            let stats = match client.fetch_daily(&target.usgs_id, window) {
                Ok(values) => stats::compute(&values, window),
                Err(e) => {
                    failed += 1;
                    logging::log_fetch_failure(DataSource::Nwis, &target.usgs_id, "daily values", &e);
                    GageStatistics::empty(window.len())
                }
            };
            GageRecord {
                target: target.clone(),
                stats,
            }
        })
        .collect();
    logging::log_batch_summary(
        DataSource::Nwis,
        "gage pull",
        targets.len(),
        targets.len() - failed,
        failed,
    );
    records
}
