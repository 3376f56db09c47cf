/// Persisted per-feature datasets.
///
/// Each assembled feature is written as one self-describing JSON document
/// under `<output>/swot/<id>_SWOT.json`: root dimensions and coordinate
/// variables, global attributes, and one group per product level (`reach` +
/// `node`, or `lake`). Every variable records its dimension names, shape,
/// fill value and descriptive attributes next to its row-major data, so a
/// reader needs nothing but the file to interpret it.
///
/// Files are written to a temporary name and renamed into place; a failed
/// job never leaves a partial dataset behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

use crate::dense::{ArrayData, FieldArray, FilledArrays};
use crate::fill::{FLOAT_FILL, INT_FILL, STR_FILL};
use crate::fields::Product;
use crate::model::InputError;
use crate::pipeline::FeatureDataset;

/// Format of the `history` creation stamp.
pub const HISTORY_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

/// Top-level persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDataset {
    pub attributes: GlobalAttributes,
    pub dimensions: BTreeMap<String, usize>,
    /// Coordinate variables (`nt`, and `nx` for rivers).
    pub coordinates: BTreeMap<String, PersistedVariable>,
    pub groups: BTreeMap<String, PersistedGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAttributes {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reach_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lake_id: Option<u64>,
    pub continent: String,
    pub history: String,
    /// One label per `nt` entry.
    pub observations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedGroup {
    pub variables: BTreeMap<String, PersistedVariable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedVariable {
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<FillValue>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    pub data: VariableData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

/// Flattened (row-major) variable data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum VariableData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Text(Vec<String>),
}

impl VariableData {
    pub fn len(&self) -> usize {
        match self {
            VariableData::Float(v) => v.len(),
            VariableData::Int(v) => v.len(),
            VariableData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            VariableData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&[i64]> {
        match self {
            VariableData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            VariableData::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl PersistedDataset {
    pub fn variable(&self, group: &str, name: &str) -> Option<&PersistedVariable> {
        self.groups.get(group)?.variables.get(name)
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn row_major<T: Clone, D: Dimension>(a: &Array<T, D>) -> Vec<T> {
    a.iter().cloned().collect()
}

fn field_variable<D: Dimension>(field: &FieldArray<D>, dims: &[&str]) -> PersistedVariable {
    let spec = field.spec;
    let mut attributes = BTreeMap::new();
    attributes.insert("long_name".to_string(), AttributeValue::Text(spec.long_name.to_string()));
    if !spec.units.is_empty() {
        attributes.insert("units".to_string(), AttributeValue::Text(spec.units.to_string()));
    }
    if let Some(min) = spec.valid_min {
        attributes.insert("valid_min".to_string(), AttributeValue::Number(min));
    }
    if let Some(max) = spec.valid_max {
        attributes.insert("valid_max".to_string(), AttributeValue::Number(max));
    }
    attributes.insert("comment".to_string(), AttributeValue::Text(spec.comment.to_string()));

    let (fill_value, data) = match &field.data {
        ArrayData::Float(a) => (FillValue::Float(FLOAT_FILL), VariableData::Float(row_major(a))),
        ArrayData::Flag(a) => (
            FillValue::Int(INT_FILL as i64),
            VariableData::Int(a.iter().map(|v| *v as i64).collect()),
        ),
        ArrayData::Text(a) => (FillValue::Text(STR_FILL.to_string()), VariableData::Text(row_major(a))),
    };
    PersistedVariable {
        dims: dims.iter().map(|d| d.to_string()).collect(),
        shape: field.data.shape().to_vec(),
        fill_value: Some(fill_value),
        attributes,
        data,
    }
}

fn id_variable(long_name: &str, comment: &str, dims: &[&str], values: Vec<i64>) -> PersistedVariable {
    let mut attributes = BTreeMap::new();
    attributes.insert("long_name".to_string(), AttributeValue::Text(long_name.to_string()));
    attributes.insert("comment".to_string(), AttributeValue::Text(comment.to_string()));
    PersistedVariable {
        dims: dims.iter().map(|d| d.to_string()).collect(),
        shape: if dims.is_empty() { Vec::new() } else { vec![values.len()] },
        fill_value: None,
        attributes,
        data: VariableData::Int(values),
    }
}

fn coordinate(long_name: &str, units: &str, dim: &str, values: Vec<i64>) -> PersistedVariable {
    let mut attributes = BTreeMap::new();
    attributes.insert("long_name".to_string(), AttributeValue::Text(long_name.to_string()));
    attributes.insert("units".to_string(), AttributeValue::Text(units.to_string()));
    PersistedVariable {
        dims: vec![dim.to_string()],
        shape: vec![values.len()],
        fill_value: None,
        attributes,
        data: VariableData::Int(values),
    }
}

fn group_of<D: Dimension>(arrays: &FilledArrays<D>, dims: &[&str]) -> PersistedGroup {
    PersistedGroup {
        variables: arrays
            .iter()
            .map(|field| (field.spec.name.to_string(), field_variable(field, dims)))
            .collect(),
    }
}

const REACH_ID_COMMENT: &str = "Unique reach identifier from the prior river database. \
    The format of the identifier is CBBBBBRRRRT, where C=continent, B=basin, R=reach, T=type.";
const NODE_ID_COMMENT: &str = "Unique node identifier from the prior river database. \
    The format of the identifier is CBBBBBRRRRNNNT, where C=continent, B=basin, R=reach, N=node, T=type.";
const LAKE_ID_COMMENT: &str = "Unique lake identifier from the prior lake database. \
    The format of the identifier is CBBNNNNNNT, where C=continent, B=basin, N=lake, T=type.";

/// Builds the persisted document for an assembled feature.
pub fn to_persisted(dataset: &FeatureDataset, created: DateTime<Utc>) -> PersistedDataset {
    let id = dataset.feature_id.value();
    let nt = dataset.time_count();

    let mut dimensions = BTreeMap::new();
    dimensions.insert("nt".to_string(), nt);
    let mut coordinates = BTreeMap::new();
    coordinates.insert(
        "nt".to_string(),
        coordinate("time steps", "pass", "nt", (0..nt as i64).collect()),
    );

    let mut groups = BTreeMap::new();
    let mut primary = group_of(&dataset.primary, &["nt"]);
    let (reach_id, lake_id) = match dataset.product {
        Product::River => {
            primary.variables.insert(
                "reach_id".to_string(),
                id_variable("reach ID from prior river database", REACH_ID_COMMENT, &[], vec![id as i64]),
            );
            (Some(id), None)
        }
        Product::Lake => {
            primary.variables.insert(
                "lake_id".to_string(),
                id_variable("lake ID from prior lake database", LAKE_ID_COMMENT, &[], vec![id as i64]),
            );
            (None, Some(id))
        }
    };
    groups.insert(dataset.product.primary_group().to_string(), primary);

    if let Some(nodes) = &dataset.nodes {
        let nx = nodes.node_ids.len();
        dimensions.insert("nx".to_string(), nx);
        coordinates.insert(
            "nx".to_string(),
            coordinate("number of nodes", "node", "nx", (1..=nx as i64).collect()),
        );
        let mut node_group = group_of(&nodes.arrays, &["nx", "nt"]);
        node_group.variables.insert(
            "reach_id".to_string(),
            id_variable("reach ID from prior river database", REACH_ID_COMMENT, &[], vec![id as i64]),
        );
        node_group.variables.insert(
            "node_id".to_string(),
            id_variable(
                "node ID of the node in the prior river database",
                NODE_ID_COMMENT,
                &["nx"],
                nodes.node_ids.iter().map(|n| n.value() as i64).collect(),
            ),
        );
        groups.insert("node".to_string(), node_group);
    }

    let label = match dataset.product {
        Product::River => "Reach",
        Product::Lake => "Lake",
    };
    PersistedDataset {
        attributes: GlobalAttributes {
            title: format!("SWOT Data for {label} {id}"),
            reach_id,
            lake_id,
            continent: dataset.continent().code().to_string(),
            history: created.format(HISTORY_FORMAT).to_string(),
            observations: dataset.observations.clone(),
        },
        dimensions,
        coordinates,
        groups,
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Persists assembled datasets.
pub trait OutputWriter {
    /// Writes one dataset and returns where it landed.
    fn write(&self, dataset: &FeatureDataset) -> Result<PathBuf, InputError>;
}

/// Writes `<output_dir>/swot/<id>_SWOT.json`.
pub struct JsonWriter {
    output_dir: PathBuf,
}

impl JsonWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> JsonWriter {
        JsonWriter {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, dataset: &FeatureDataset) -> PathBuf {
        self.output_dir
            .join("swot")
            .join(format!("{}_SWOT.json", dataset.feature_id))
    }
}

impl OutputWriter for JsonWriter {
    fn write(&self, dataset: &FeatureDataset) -> Result<PathBuf, InputError> {
        let path = self.path_for(dataset);
        let document = to_persisted(dataset, Utc::now());
        write_json_atomic(&path, &document)?;
        tracing::info!(
            feature_id = %dataset.feature_id,
            path = %path.display(),
            nt = dataset.time_count(),
            "wrote dataset"
        );
        Ok(path)
    }
}

/// Serializes `value` next to `path` and renames it into place.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), InputError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| InputError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| InputError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| InputError::io(path, e))
}

/// Reads a dataset written by `JsonWriter`.
pub fn read_dataset(path: &Path) -> Result<PersistedDataset, InputError> {
    let text = fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}
