/// Integration tests for per-feature assembly.
///
/// Every test drives the public pipeline with in-memory records or a replay
/// capture; nothing here touches the network.
///
/// Run with: cargo test --test pipeline

use std::collections::{BTreeMap, HashMap};

use approx::assert_abs_diff_eq;

use swot_input::align::MismatchPolicy;
use swot_input::fields::{NODE_FIELDS, Product, REACH_FIELDS};
use swot_input::fill::{FLOAT_FILL, INT_FILL, STR_FILL};
use swot_input::ingest::TimeRange;
use swot_input::ingest::replay::{ReplayCapture, ReplaySource};
use swot_input::logging::DataSource;
use swot_input::model::{FeatureId, FieldValue, InputError, NodeId, ObservationRecord};
use swot_input::pipeline::{self, ReachJob, assemble_lake, assemble_reach};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const REACH: &str = "74267100011";

const PASSES: [&str; 5] = [
    "2023-05-01T10:00:00Z",
    "2023-05-12T10:00:00Z",
    "2023-05-22T10:00:00Z",
    "2023-06-02T10:00:00Z",
    "2023-06-12T10:00:00Z",
];

fn record(time_str: &str, values: &[(&str, f64)]) -> ObservationRecord {
    let fields: BTreeMap<String, FieldValue> = values
        .iter()
        .map(|(name, v)| (name.to_string(), FieldValue::Number(*v)))
        .collect();
    ObservationRecord::new(time_str, fields)
}

fn node_ids(count: u64) -> Vec<NodeId> {
    (1..=count)
        .map(|i| NodeId::parse(&format!("742671000100{i}1")).unwrap())
        .collect()
}

fn job(count: u64) -> ReachJob {
    ReachJob {
        reach_id: FeatureId::reach(REACH).unwrap(),
        node_ids: node_ids(count),
    }
}

/// Five passes with width/wse chosen so the derived area change is exact.
fn reach_records() -> Vec<ObservationRecord> {
    let width = [620.0, 713.0, 628.0, 631.0, 615.0];
    let wse = [103.0, 102.0, 101.0, 102.0, 104.0];
    PASSES
        .iter()
        .enumerate()
        .map(|(t, time_str)| {
            record(
                time_str,
                &[("width", width[t]), ("wse", wse[t]), ("slope", 1e-4), ("reach_q", 0.0)],
            )
        })
        .collect()
}

/// Each node observed a few seconds after every reach pass.
fn node_records(node: usize) -> Vec<ObservationRecord> {
    PASSES
        .iter()
        .enumerate()
        .map(|(t, time_str)| {
            let shifted = time_str.replace(":00Z", &format!(":0{node}Z"));
            record(&shifted, &[("wse", 100.0 + t as f64), ("width", 50.0 + node as f64), ("node_q", 0.0)])
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_full_reach_has_no_fill() {
    let job = job(5);
    let nodes: Vec<_> = (0..5).map(node_records).collect();
    let dataset = assemble_reach(&job, reach_records(), &nodes, MismatchPolicy::Lenient).unwrap();

    assert_eq!(dataset.product, Product::River);
    assert_eq!(dataset.time_count(), 5);
    assert_eq!(dataset.observations, PASSES.to_vec());

    let group = dataset.nodes.as_ref().unwrap();
    assert_eq!(group.node_ids, job.node_ids);
    assert_eq!(group.arrays.len(), NODE_FIELDS.len());
    assert_eq!(dataset.primary.len(), REACH_FIELDS.len());

    let wse = group.arrays.float("wse").unwrap();
    assert_eq!(wse.dim(), (5, 5));
    assert!(wse.iter().all(|v| *v != FLOAT_FILL));
    assert_eq!(wse[[3, 2]], 102.0);
    assert_eq!(group.arrays.float("width").unwrap()[[4, 0]], 54.0);
    assert!(group.arrays.flag("node_q").unwrap().iter().all(|q| *q == 0));
}

#[test]
fn test_empty_area_change_is_derived_and_broadcast() {
    let job = job(3);
    let nodes: Vec<_> = (0..3).map(node_records).collect();
    let dataset = assemble_reach(&job, reach_records(), &nodes, MismatchPolicy::Lenient).unwrap();

    assert!(dataset.area_change_derived);
    let expected = [620.0, 0.0, -628.0, 0.0, 1230.0];
    let reach = dataset.primary.float("d_x_area").unwrap();
    for (got, want) in reach.iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-9);
    }

    let node = dataset.nodes.as_ref().unwrap().arrays.float("d_x_area").unwrap();
    for row in node.rows() {
        assert_eq!(row.to_vec(), reach.to_vec());
    }
}

#[test]
fn test_supplied_area_change_is_kept() {
    let mut records = reach_records();
    records[1]
        .fields
        .insert("d_x_area".to_string(), FieldValue::Number(42.0));
    let job = job(1);
    let dataset = assemble_reach(&job, records, &[node_records(0)], MismatchPolicy::Lenient).unwrap();

    assert!(!dataset.area_change_derived);
    let area = dataset.primary.float("d_x_area").unwrap();
    assert_eq!(area[1], 42.0);
    assert_eq!(area[0], FLOAT_FILL);
}

#[test]
fn test_reach_fields_broadcast_to_every_node() {
    let job = job(4);
    let nodes: Vec<_> = (0..4).map(node_records).collect();
    let dataset = assemble_reach(&job, reach_records(), &nodes, MismatchPolicy::Lenient).unwrap();

    let slope = dataset.nodes.as_ref().unwrap().arrays.float("slope").unwrap();
    assert_eq!(slope.dim(), (4, 5));
    assert!(slope.iter().all(|v| *v == 1e-4));
}

#[test]
fn test_empty_reach_is_fatal() {
    let job = job(2);
    let err = assemble_reach(&job, Vec::new(), &[Vec::new(), Vec::new()], MismatchPolicy::Lenient)
        .unwrap_err();
    assert!(matches!(err, InputError::NoDataAvailable(id) if id == REACH));
}

#[test]
fn test_reach_with_only_undated_passes_is_fatal() {
    let job = job(1);
    let records = vec![
        record("no_data", &[("wse", -999999999999.0)]),
        record("no_data", &[("wse", -999999999999.0)]),
    ];
    let err = assemble_reach(&job, records, &[node_records(0)], MismatchPolicy::Lenient).unwrap_err();
    assert!(matches!(err, InputError::NoDataAvailable(id) if id == REACH));

    let lake_id = FeatureId::lake("7420000123").unwrap();
    let err = assemble_lake(lake_id, vec![record("no_data", &[("wse", 1.0)])]).unwrap_err();
    assert!(matches!(err, InputError::NoDataAvailable(_)));
}

#[test]
fn test_undated_passes_do_not_add_time_steps() {
    let job = job(1);
    let mut records = reach_records();
    records.insert(2, record("no_data", &[("wse", -999999999999.0)]));
    let dataset = assemble_reach(&job, records, &[node_records(0)], MismatchPolicy::Lenient).unwrap();

    assert_eq!(dataset.time_count(), PASSES.len());
    assert_eq!(dataset.observations, PASSES.to_vec());
}

#[test]
fn test_strict_policy_rejects_unmatched_node_date() {
    let job = job(1);
    let mut node = node_records(0);
    node.push(record("2023-07-04T10:00:00Z", &[("wse", 99.0)]));
    let err = assemble_reach(&job, reach_records(), &[node.clone()], MismatchPolicy::Strict)
        .unwrap_err();
    assert!(matches!(err, InputError::ReachNodeMismatch { .. }));

    // Lenient: the stray record is simply never selected.
    let dataset = assemble_reach(&job, reach_records(), &[node], MismatchPolicy::Lenient).unwrap();
    let wse = dataset.nodes.unwrap().arrays.float("wse").unwrap().clone();
    assert!(wse.iter().all(|v| *v != 99.0));
}

#[test]
fn test_unreachable_node_degrades_to_fill() {
    let reach_id = FeatureId::reach(REACH).unwrap();
    let job = job(2);

    let mut capture = ReplayCapture {
        reaches: HashMap::from([(reach_id, reach_records())]),
        ..ReplayCapture::default()
    };
    // Only the first node is in the capture.
    capture.nodes.insert(job.node_ids[0], node_records(0));
    let source = ReplaySource::new(capture, TimeRange::default());

    let dataset = pipeline::run_reach(&source, DataSource::Replay, &job, MismatchPolicy::Lenient).unwrap();
    let arrays = &dataset.nodes.as_ref().unwrap().arrays;

    let wse = arrays.float("wse").unwrap();
    assert_eq!(wse[[0, 0]], 100.0);
    assert!(wse.row(1).iter().all(|v| *v == FLOAT_FILL));
    assert!(arrays.flag("node_q").unwrap().row(1).iter().all(|q| *q == INT_FILL));
    assert_eq!(arrays.text("time_str").unwrap()[[1, 3]], STR_FILL);
}

#[test]
fn test_missing_reach_in_source_is_fatal() {
    let source = ReplaySource::new(ReplayCapture::default(), TimeRange::default());
    let err = pipeline::run_reach(&source, DataSource::Replay, &job(1), MismatchPolicy::Lenient)
        .unwrap_err();
    assert!(matches!(err, InputError::NoDataAvailable(_)));
}

#[test]
fn test_lake_is_a_single_group() {
    let lake_id = FeatureId::lake("7420000123").unwrap();
    let records = vec![
        record("2023-05-12T10:00:00Z", &[("wse", 181.2)]),
        record("2023-05-01T10:00:00Z", &[("wse", 180.9)]),
    ];
    let dataset = assemble_lake(lake_id, records).unwrap();

    assert_eq!(dataset.product, Product::Lake);
    assert!(dataset.nodes.is_none());
    assert_eq!(dataset.primary.float("wse").unwrap().to_vec(), vec![180.9, 181.2]);
}

#[test]
fn test_time_range_limits_replayed_passes() {
    use chrono::{TimeZone, Utc};

    let reach_id = FeatureId::reach(REACH).unwrap();
    let job = job(1);
    let mut capture = ReplayCapture {
        reaches: HashMap::from([(reach_id, reach_records())]),
        ..ReplayCapture::default()
    };
    capture.nodes.insert(job.node_ids[0], node_records(0));
    let range = TimeRange::new(
        Some(Utc.with_ymd_and_hms(2023, 5, 10, 0, 0, 0).unwrap()),
        Some(Utc.with_ymd_and_hms(2023, 5, 31, 0, 0, 0).unwrap()),
    );
    let source = ReplaySource::new(capture, range);

    let dataset = pipeline::run_reach(&source, DataSource::Replay, &job, MismatchPolicy::Strict).unwrap();
    assert_eq!(dataset.observations, vec![PASSES[1], PASSES[2]]);
}
