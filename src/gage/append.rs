/// Reference-store merge of gage statistics.
///
/// The reference store holds one JSON file per continent, named
/// `<continent>_<anything>.json` (e.g. `na_sword_v16_SOS_priors.json`). Only
/// the parts touched here are modelled; everything else in a store file is
/// carried through unchanged:
///
/// ```json
/// {
///   "production_date": "07-Mar-2024 14:05:09",
///   "reaches": {"reach_id": [74267100011, ...], ...},
///   "model": {"usgs": {...}, ...},
///   ...
/// }
/// ```
///
/// Stores are merged one continent at a time; a store with no matching
/// reach is not rewritten.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fill::{FLOAT_FILL, persist_float};
use crate::gage::GageRecord;
use crate::gage::stats::DateWindow;
use crate::logging::{self, DataSource};
use crate::model::{Continent, InputError};
use crate::output::write_json_atomic;

/// Format of the store's `production_date` attribute.
pub const PRODUCTION_DATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

// ---------------------------------------------------------------------------
// Store model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_date: Option<String>,
    pub reaches: StoreReaches,
    #[serde(default)]
    pub model: StoreModel,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReaches {
    /// May contain fill values for unused slots.
    pub reach_id: Vec<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usgs: Option<UsgsGroup>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Gage statistics for the reaches of one continent. Per-gage arrays are
/// indexed by `num_usgs_reaches`; NaN is stored as `fill_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsgsGroup {
    pub fill_value: f64,
    /// 1-based day index of the daily columns.
    pub num_days: Vec<i32>,
    pub usgs_reach_id: Vec<i64>,
    pub usgs_id: Vec<String>,
    /// m^3/s, one row of 20 probabilities per gage.
    pub flow_duration_q: Vec<Vec<f64>>,
    pub max_q: Vec<f64>,
    /// m^3/s, one row of 12 months per gage.
    pub monthly_q: Vec<Vec<f64>>,
    pub mean_q: Vec<f64>,
    pub min_q: Vec<f64>,
    pub two_year_return_q: Vec<f64>,
    /// m^3/s, one row of `num_days` per gage.
    pub usgs_q: Vec<Vec<f64>>,
    /// Days since 1 Jan year 1, one row of `num_days` per gage.
    pub usgs_qt: Vec<Vec<f64>>,
}

impl UsgsGroup {
    pub fn len(&self) -> usize {
        self.usgs_reach_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usgs_reach_id.is_empty()
    }
}

fn filled(values: &[f64]) -> Vec<f64> {
    values.iter().copied().map(persist_float).collect()
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Gages whose reach appears in the store, in gage order.
pub fn matching_gages<'a>(store: &ReferenceStore, gages: &'a [GageRecord]) -> Vec<&'a GageRecord> {
    gages
        .iter()
        .filter(|g| store.reaches.reach_id.contains(&(g.target.reach_id.value() as i64)))
        .collect()
}

/// Builds the `usgs` group for `gages`.
pub fn build_usgs_group(gages: &[&GageRecord], days: usize) -> UsgsGroup {
    UsgsGroup {
        fill_value: FLOAT_FILL,
        num_days: (1..=days as i32).collect(),
        usgs_reach_id: gages.iter().map(|g| g.target.reach_id.value() as i64).collect(),
        usgs_id: gages.iter().map(|g| g.target.usgs_id.clone()).collect(),
        flow_duration_q: gages.iter().map(|g| filled(&g.stats.flow_duration_q)).collect(),
        max_q: gages.iter().map(|g| persist_float(g.stats.max_q)).collect(),
        monthly_q: gages.iter().map(|g| filled(&g.stats.monthly_q)).collect(),
        mean_q: gages.iter().map(|g| persist_float(g.stats.mean_q)).collect(),
        min_q: gages.iter().map(|g| persist_float(g.stats.min_q)).collect(),
        two_year_return_q: gages
            .iter()
            .map(|g| persist_float(g.stats.two_year_return_q))
            .collect(),
        usgs_q: gages.iter().map(|g| filled(&g.stats.usgs_q)).collect(),
        usgs_qt: gages.iter().map(|g| filled(&g.stats.usgs_qt)).collect(),
    }
}

/// Writes the matching gages into `store.model.usgs`, replacing any previous
/// group, and stamps `production_date`. Returns the number of gages written;
/// with no match the store is left untouched.
pub fn merge_gages(
    store: &mut ReferenceStore,
    gages: &[GageRecord],
    window: &DateWindow,
    now: DateTime<Utc>,
) -> usize {
    let matched = matching_gages(store, gages);
    if matched.is_empty() {
        return 0;
    }
    store.model.usgs = Some(build_usgs_group(&matched, window.len()));
    store.production_date = Some(now.format(PRODUCTION_DATE_FORMAT).to_string());
    matched.len()
}

// ---------------------------------------------------------------------------
// Store directory
// ---------------------------------------------------------------------------

/// Continent encoded by a store file name prefix (`na_...json`).
pub fn store_continent(path: &Path) -> Option<Continent> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    let prefix = name.split('_').next()?;
    Continent::from_code(prefix)
}

pub fn read_store(path: &Path) -> Result<ReferenceStore, InputError> {
    let text = fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Per-continent result of a merge run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Gages written per continent; continents without a match are absent.
    pub written: BTreeMap<Continent, usize>,
    pub untouched: Vec<Continent>,
}

/// Merges gage statistics into every continent store in a directory.
pub struct ReferenceMerger {
    store_dir: PathBuf,
}

impl ReferenceMerger {
    pub fn new(store_dir: impl Into<PathBuf>) -> ReferenceMerger {
        ReferenceMerger {
            store_dir: store_dir.into(),
        }
    }

    /// Store files by continent; the first file per continent (by name) wins.
    pub fn store_files(&self) -> Result<BTreeMap<Continent, PathBuf>, InputError> {
        let entries = fs::read_dir(&self.store_dir).map_err(|e| InputError::io(&self.store_dir, e))?;
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            paths.push(entry.map_err(|e| InputError::io(&self.store_dir, e))?.path());
        }
        paths.sort();

        let mut files = BTreeMap::new();
        for path in paths {
            if let Some(continent) = store_continent(&path) {
                files.entry(continent).or_insert(path);
            }
        }
        Ok(files)
    }

    /// Runs the merge for every continent, one after another.
    pub fn merge_all(&self, gages: &[GageRecord], window: &DateWindow) -> Result<MergeReport, InputError> {
        let files = self.store_files()?;
        let mut report = MergeReport::default();

        for (continent, path) in &files {
            let mut store = read_store(path)?;
            let written = merge_gages(&mut store, gages, window, Utc::now());
            if written == 0 {
                tracing::info!(source = %DataSource::Store, %continent, "no gage reaches in store");
                report.untouched.push(*continent);
                continue;
            }
            write_json_atomic(path, &store)?;
            tracing::info!(
                source = %DataSource::Store,
                %continent,
                gages = written,
                path = %path.display(),
                "appended gage statistics"
            );
            report.written.insert(*continent, written);
        }

        let placed: usize = report.written.values().sum();
        logging::log_batch_summary(
            DataSource::Store,
            "gage merge",
            gages.len(),
            placed,
            gages.len().saturating_sub(placed),
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gage::GageTarget;
    use crate::gage::stats::GageStatistics;
    use crate::model::FeatureId;
    use chrono::{NaiveDate, TimeZone};

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        )
        .unwrap()
    }

    fn gage(usgs_id: &str, reach_id: &str, mean: f64) -> GageRecord {
        let mut stats = GageStatistics::empty(3);
        stats.mean_q = mean;
        GageRecord {
            target: GageTarget {
                usgs_id: usgs_id.to_string(),
                reach_id: FeatureId::reach(reach_id).unwrap(),
            },
            stats,
        }
    }

    fn store() -> ReferenceStore {
        serde_json::from_str(
            r#"{
                "reaches": {"reach_id": [74267100011, 74267100021, -999], "river_name": ["A", "B", ""]},
                "model": {"grdc": {"q": [1, 2]}},
                "nodes": {"node_id": []}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_merge_keeps_matching_gages_in_order() {
        let mut store = store();
        let gages = vec![
            gage("05568500", "74267100021", 3.0),
            gage("01010000", "73120000131", 4.0),
            gage("05567500", "74267100011", f64::NAN),
        ];
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
        assert_eq!(merge_gages(&mut store, &gages, &window(), now), 2);

        let usgs = store.model.usgs.as_ref().unwrap();
        assert_eq!(usgs.usgs_id, vec!["05568500", "05567500"]);
        assert_eq!(usgs.usgs_reach_id, vec![74267100021, 74267100011]);
        assert_eq!(usgs.num_days, vec![1, 2, 3]);
        assert_eq!(usgs.mean_q, vec![3.0, FLOAT_FILL]);
        assert_eq!(usgs.flow_duration_q[0].len(), 20);
        assert_eq!(usgs.monthly_q[1], vec![FLOAT_FILL; 12]);
        assert_eq!(usgs.usgs_q[0], vec![FLOAT_FILL; 3]);
        assert_eq!(store.production_date.as_deref(), Some("07-Mar-2024 14:05:09"));

        // Content the merge does not own survives.
        assert!(store.model.extra.contains_key("grdc"));
        assert!(store.extra.contains_key("nodes"));
        assert!(store.reaches.extra.contains_key("river_name"));
    }

    #[test]
    fn test_no_match_leaves_store_untouched() {
        let mut store = store();
        let before = store.clone();
        let gages = vec![gage("01010000", "73120000131", 4.0)];
        assert_eq!(merge_gages(&mut store, &gages, &window(), Utc::now()), 0);
        assert_eq!(store, before);
    }

    #[test]
    fn test_store_continent_from_file_name() {
        assert_eq!(
            store_continent(Path::new("/sos/na_sword_v16_SOS_priors.json")),
            Some(Continent::NorthAmerica)
        );
        assert_eq!(store_continent(Path::new("EU_priors.json")), Some(Continent::Europe));
        assert_eq!(store_continent(Path::new("na_priors.nc")), None);
        assert_eq!(store_continent(Path::new("readme.json")), None);
    }
}
