/// Integration tests for the gage statistics merge.
///
/// Builds gage statistics from synthetic daily values, merges them into
/// per-continent reference stores in a temporary directory and reads the
/// stores back. No NWIS request is made.
///
/// Run with: cargo test --test gage_append

use std::fs;
use std::path::Path;

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use tempfile::TempDir;

use swot_input::fill::FLOAT_FILL;
use swot_input::gage::append::{ReferenceMerger, read_store};
use swot_input::gage::nwis::DailyValue;
use swot_input::gage::stats::{CFS_TO_CMS, DateWindow, GageStatistics, compute, day_number};
use swot_input::gage::{GageRecord, GageTarget, parse_targets};
use swot_input::model::Continent;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn window() -> DateWindow {
    DateWindow::new(date(2024, 1, 1), date(2024, 1, 4)).unwrap()
}

fn daily(site: &str, day: u32, cfs: f64, qualifier: &str) -> DailyValue {
    DailyValue {
        site: site.to_string(),
        date: date(2024, 1, day),
        value_cfs: Some(cfs),
        qualifiers: vec![qualifier.to_string()],
    }
}

fn write_store(dir: &Path, name: &str, reach_ids: &[i64]) {
    let body = serde_json::json!({
        "reaches": {"reach_id": reach_ids, "river_name": []},
        "model": {"grdc": {"grdc_id": [1]}},
        "nodes": {"num_nodes": 3}
    });
    fs::write(dir.join(name), serde_json::to_string_pretty(&body).unwrap()).unwrap();
}

fn gages() -> Vec<GageRecord> {
    let targets = parse_targets(
        "usgs_id,reach_id\n05568500,74267100011\n01010000,21602600101\n09999999,74267100099\n",
    )
    .unwrap();

    let ilrv = vec![
        daily("05568500", 1, 100.0, "A"),
        daily("05568500", 2, 200.0, "A"),
        daily("05568500", 3, 999.0, "P Ice"),
        daily("05568500", 4, 300.0, "P"),
    ];
    vec![
        GageRecord {
            target: targets[0].clone(),
            stats: compute(&ilrv, &window()),
        },
        GageRecord {
            target: targets[1].clone(),
            stats: compute(&[daily("01010000", 2, 50.0, "A")], &window()),
        },
        // Pull failed: still carried through with missing statistics.
        GageRecord {
            target: targets[2].clone(),
            stats: GageStatistics::empty(window().len()),
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_statistics_skip_ice_and_convert_units() {
    let gages = gages();
    let stats = &gages[0].stats;

    assert_abs_diff_eq!(stats.mean_q, 200.0 * CFS_TO_CMS, epsilon = 1e-9);
    assert_abs_diff_eq!(stats.min_q, 100.0 * CFS_TO_CMS, epsilon = 1e-9);
    assert_abs_diff_eq!(stats.max_q, 300.0 * CFS_TO_CMS, epsilon = 1e-9);
    assert_abs_diff_eq!(stats.monthly_q[0], 200.0 * CFS_TO_CMS, epsilon = 1e-9);
    assert!(stats.monthly_q[1].is_nan());

    assert_eq!(stats.usgs_q.len(), 4);
    assert!(stats.usgs_q[2].is_nan());
    assert_eq!(stats.usgs_qt[0], day_number(date(2024, 1, 1)));
    assert!(stats.usgs_qt[2].is_nan());
}

#[test]
fn test_merge_writes_each_continent_store() {
    let dir = TempDir::new().unwrap();
    write_store(dir.path(), "na_sword_v16_SOS_priors.json", &[74267100011, 74267100099, 74267100021]);
    write_store(dir.path(), "eu_sword_v16_SOS_priors.json", &[21602600101]);
    write_store(dir.path(), "af_sword_v16_SOS_priors.json", &[11111100011]);
    fs::write(dir.path().join("README.txt"), "not a store").unwrap();

    let merger = ReferenceMerger::new(dir.path());
    let report = merger.merge_all(&gages(), &window()).unwrap();

    assert_eq!(report.written.get(&Continent::NorthAmerica), Some(&2));
    assert_eq!(report.written.get(&Continent::Europe), Some(&1));
    assert_eq!(report.untouched, vec![Continent::Africa]);

    let na = read_store(&dir.path().join("na_sword_v16_SOS_priors.json")).unwrap();
    let usgs = na.model.usgs.as_ref().unwrap();
    assert_eq!(usgs.usgs_id, vec!["05568500", "09999999"]);
    assert_eq!(usgs.usgs_reach_id, vec![74267100011, 74267100099]);
    assert_eq!(usgs.num_days, vec![1, 2, 3, 4]);
    assert_eq!(usgs.usgs_q[0].len(), 4);
    assert_eq!(usgs.usgs_q[0][2], FLOAT_FILL);
    assert_eq!(usgs.mean_q[1], FLOAT_FILL);
    assert_eq!(usgs.flow_duration_q[1], vec![FLOAT_FILL; 20]);
    assert!(na.production_date.is_some());
    assert!(na.model.extra.contains_key("grdc"));
    assert!(na.extra.contains_key("nodes"));

    let eu = read_store(&dir.path().join("eu_sword_v16_SOS_priors.json")).unwrap();
    assert_eq!(eu.model.usgs.unwrap().usgs_id, vec!["01010000"]);

    let af = read_store(&dir.path().join("af_sword_v16_SOS_priors.json")).unwrap();
    assert!(af.model.usgs.is_none());
    assert!(af.production_date.is_none());
}

#[test]
fn test_remerge_replaces_previous_gages() {
    let dir = TempDir::new().unwrap();
    write_store(dir.path(), "na_priors.json", &[74267100011, 74267100099]);
    let merger = ReferenceMerger::new(dir.path());

    merger.merge_all(&gages(), &window()).unwrap();
    merger.merge_all(&gages()[..1], &window()).unwrap();

    let na = read_store(&dir.path().join("na_priors.json")).unwrap();
    assert_eq!(na.model.usgs.unwrap().usgs_id, vec!["05568500"]);
}

#[test]
fn test_missing_store_dir_is_an_error() {
    let dir = TempDir::new().unwrap();
    let merger = ReferenceMerger::new(dir.path().join("absent"));
    assert!(merger.merge_all(&gages(), &window()).is_err());
}

#[test]
fn test_targets_keep_file_order() {
    let targets: Vec<GageTarget> = gages().into_iter().map(|g| g.target).collect();
    let ids: Vec<_> = targets.iter().map(|t| t.usgs_id.as_str()).collect();
    assert_eq!(ids, vec!["05568500", "01010000", "09999999"]);
}
