/// Per-feature assembly: source -> align -> derive -> build.
///
/// One call produces one complete, fill-normalized dataset for a reach (or
/// lake). The assembly functions are pure and do no I/O; `run_reach` and
/// `run_lake` wrap them with record fetching and the failure policy:
///
/// - reach/lake series unobtainable or empty: fatal for the job
/// - node series unobtainable: logged, the node's rows become fill
/// - strict mismatch policy violation: fatal for the job

use ndarray::{Array1, Ix1, Ix2};
use serde::Deserialize;

use crate::align::{AlignedNode, MismatchPolicy, ReachSeries, TimeAligner};
use crate::area::resolve_area_change;
use crate::dense::{FilledArrays, build_node_arrays, build_series_arrays};
use crate::fields::{LAKE_FIELDS, NODE_FIELDS, Product, REACH_FIELDS};
use crate::ingest::RecordSource;
use crate::logging::{self, DataSource};
use crate::model::{Continent, FeatureId, InputError, NodeId, ObservationRecord};

// ---------------------------------------------------------------------------
// Jobs and results
// ---------------------------------------------------------------------------

/// A reach and its nodes, in the order the node rows are written.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReachJob {
    pub reach_id: FeatureId,
    pub node_ids: Vec<NodeId>,
}

/// Node group of a river dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGroup {
    pub node_ids: Vec<NodeId>,
    pub arrays: FilledArrays<Ix2>,
}

/// Everything written for one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDataset {
    pub feature_id: FeatureId,
    pub product: Product,
    /// One label per instant on the time axis (the reach `time_str`).
    pub observations: Vec<String>,
    pub primary: FilledArrays<Ix1>,
    pub nodes: Option<NodeGroup>,
    /// True when `d_x_area` was rebuilt from width and elevation.
    pub area_change_derived: bool,
}

impl FeatureDataset {
    pub fn continent(&self) -> Continent {
        self.feature_id.continent()
    }

    pub fn time_count(&self) -> usize {
        self.observations.len()
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Assembles a river dataset from already-fetched records.
///
/// `node_records[i]` belongs to `job.node_ids[i]`; an empty vector is a
/// node with no observations.
pub fn assemble_reach(
    job: &ReachJob,
    reach_records: Vec<ObservationRecord>,
    node_records: &[Vec<ObservationRecord>],
    policy: MismatchPolicy,
) -> Result<FeatureDataset, InputError> {
    if node_records.len() != job.node_ids.len() {
        return Err(InputError::ShapeMismatch {
            field: "node records".to_string(),
            expected: job.node_ids.len(),
            found: node_records.len(),
        });
    }
    let series = ReachSeries::from_records(reach_records);
    if series.is_empty() {
        return Err(InputError::NoDataAvailable(job.reach_id.to_string()));
    }
    let time_count = series.len();

    let aligner = TimeAligner::new(policy);
    let aligned = job
        .node_ids
        .iter()
        .zip(node_records)
        .map(|(node_id, records)| aligner.align(job.reach_id, &series, *node_id, records))
        .collect::<Result<Vec<AlignedNode<'_>>, _>>()?;

    let mut reach = build_series_arrays(REACH_FIELDS, &series);

    let derived = match (reach.float("d_x_area"), reach.float("width"), reach.float("wse")) {
        (Some(supplied), Some(width), Some(wse)) => {
            resolve_area_change(&supplied.to_vec(), &width.to_vec(), &wse.to_vec())?
        }
        _ => None,
    };
    let area_change_derived = derived.is_some();
    if let Some(derived) = derived {
        reach.replace_float("d_x_area", Array1::from(derived))?;
    }

    let nodes = build_node_arrays(NODE_FIELDS, &aligned, &reach, time_count)?;

    let observed: usize = aligned.iter().map(AlignedNode::observed_count).sum();
    tracing::debug!(
        reach_id = %job.reach_id,
        nt = time_count,
        nx = job.node_ids.len(),
        observed_cells = observed,
        area_change_derived,
        "assembled reach"
    );

    Ok(FeatureDataset {
        feature_id: job.reach_id,
        product: Product::River,
        observations: series.time_labels(),
        primary: reach.into_filled(),
        nodes: Some(NodeGroup {
            node_ids: job.node_ids.clone(),
            arrays: nodes.into_filled(),
        }),
        area_change_derived,
    })
}

/// Assembles a lake dataset: a single group, no node level.
pub fn assemble_lake(
    lake_id: FeatureId,
    records: Vec<ObservationRecord>,
) -> Result<FeatureDataset, InputError> {
    let series = ReachSeries::from_records(records);
    if series.is_empty() {
        return Err(InputError::NoDataAvailable(lake_id.to_string()));
    }
    Ok(FeatureDataset {
        feature_id: lake_id,
        product: Product::Lake,
        observations: series.time_labels(),
        primary: build_series_arrays(LAKE_FIELDS, &series).into_filled(),
        nodes: None,
        area_change_derived: false,
    })
}

// ---------------------------------------------------------------------------
// Fetch + assemble
// ---------------------------------------------------------------------------

/// Fetches a reach and its nodes from `source` and assembles the dataset.
pub fn run_reach(
    source: &dyn RecordSource,
    data_source: DataSource,
    job: &ReachJob,
    policy: MismatchPolicy,
) -> Result<FeatureDataset, InputError> {
    let reach_id = job.reach_id.to_string();
    let reach_records = source
        .feature_series(Product::River, job.reach_id)
        .inspect_err(|e| logging::log_fetch_failure(data_source, &reach_id, "reach series", e))?;

    let mut failed = 0;
    let node_records: Vec<Vec<ObservationRecord>> = job
        .node_ids
        .iter()
        .map(|node_id| match source.node_series(*node_id) {
            Ok(records) => records,
            Err(e) => {
                failed += 1;
                logging::log_fetch_failure(data_source, &node_id.to_string(), "node series", &e);
                Vec::new()
            }
        })
        .collect();
    logging::log_batch_summary(
        data_source,
        &format!("reach {reach_id} node fetch"),
        job.node_ids.len(),
        job.node_ids.len() - failed,
        failed,
    );

    assemble_reach(job, reach_records, &node_records, policy)
}

/// Fetches a prior lake from `source` and assembles the dataset.
pub fn run_lake(
    source: &dyn RecordSource,
    data_source: DataSource,
    lake_id: FeatureId,
) -> Result<FeatureDataset, InputError> {
    let records = source
        .feature_series(Product::Lake, lake_id)
        .inspect_err(|e| logging::log_fetch_failure(data_source, &lake_id.to_string(), "lake series", e))?;
    assemble_lake(lake_id, records)
}
