/// Dense field arrays for one feature.
///
/// Reach and lake fields become 1-D arrays of length `nt`; node fields
/// become 2-D `(nx, nt)` arrays with rows in the caller's node order. Arrays
/// are never truncated: every cell holds either a value or a fill.
///
/// Flags are converted to `i32` (with `INT_FILL`) while building. Floats
/// stay NaN for missing values until `FieldArrays::into_filled`, which is the
/// only place NaN turns into `FLOAT_FILL`.

use ndarray::{Array, Array2, Dimension, Ix1, Ix2};

use crate::align::{AlignedNode, ReachSeries};
use crate::area::broadcast_to_nodes;
use crate::fields::{FieldKind, FieldOrigin, FieldSpec};
use crate::fill::{INT_FILL, STR_FILL, coerce_flag_value, persist_float};
use crate::model::{InputError, ObservationRecord};

// ---------------------------------------------------------------------------
// Array types
// ---------------------------------------------------------------------------

/// Typed storage for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData<D: Dimension> {
    Float(Array<f64, D>),
    Flag(Array<i32, D>),
    Text(Array<String, D>),
}

impl<D: Dimension> ArrayData<D> {
    pub fn shape(&self) -> &[usize] {
        match self {
            ArrayData::Float(a) => a.shape(),
            ArrayData::Flag(a) => a.shape(),
            ArrayData::Text(a) => a.shape(),
        }
    }
}

/// One named field and its data.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldArray<D: Dimension> {
    pub spec: &'static FieldSpec,
    pub data: ArrayData<D>,
}

/// All fields of one output group, in vocabulary order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldArrays<D: Dimension> {
    arrays: Vec<FieldArray<D>>,
}

impl<D: Dimension> FieldArrays<D> {
    pub fn get(&self, name: &str) -> Option<&FieldArray<D>> {
        self.arrays.iter().find(|a| a.spec.name == name)
    }

    pub fn float(&self, name: &str) -> Option<&Array<f64, D>> {
        match self.get(name).map(|a| &a.data) {
            Some(ArrayData::Float(a)) => Some(a),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<&Array<i32, D>> {
        match self.get(name).map(|a| &a.data) {
            Some(ArrayData::Flag(a)) => Some(a),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&Array<String, D>> {
        match self.get(name).map(|a| &a.data) {
            Some(ArrayData::Text(a)) => Some(a),
            _ => None,
        }
    }

    /// Swaps in a new float array for an existing float field.
    pub fn replace_float(&mut self, name: &str, values: Array<f64, D>) -> Result<(), InputError> {
        let field = self
            .arrays
            .iter_mut()
            .find(|a| a.spec.name == name)
            .ok_or_else(|| InputError::Config(format!("no field named {name}")))?;
        match &mut field.data {
            ArrayData::Float(current) if current.shape() == values.shape() => {
                *current = values;
                Ok(())
            }
            ArrayData::Float(current) => Err(InputError::ShapeMismatch {
                field: name.to_string(),
                expected: current.len(),
                found: values.len(),
            }),
            _ => Err(InputError::Config(format!("{name} is not a float field"))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldArray<D>> {
        self.arrays.iter()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Replaces NaN with `FLOAT_FILL` in every float field.
    ///
    /// Consumes the in-memory arrays, so the pass cannot run twice.
    pub fn into_filled(self) -> FilledArrays<D> {
        let arrays = self
            .arrays
            .into_iter()
            .map(|field| {
                let data = match field.data {
                    ArrayData::Float(a) => ArrayData::Float(a.mapv_into(persist_float)),
                    other => other,
                };
                FieldArray {
                    spec: field.spec,
                    data,
                }
            })
            .collect();
        FilledArrays(FieldArrays { arrays })
    }
}

/// Arrays after fill normalization; the only form the writer accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledArrays<D: Dimension>(FieldArrays<D>);

impl<D: Dimension> std::ops::Deref for FilledArrays<D> {
    type Target = FieldArrays<D>;

    fn deref(&self) -> &FieldArrays<D> {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn float_of(record: Option<&ObservationRecord>, name: &str) -> f64 {
    record.and_then(|r| r.float(name)).unwrap_or(f64::NAN)
}

fn flag_of(record: Option<&ObservationRecord>, name: &str) -> i32 {
    match record {
        Some(r) => coerce_flag_value(r.value(name)),
        None => INT_FILL,
    }
}

fn text_of(record: Option<&ObservationRecord>, name: &str) -> String {
    record
        .and_then(|r| r.text(name))
        .unwrap_or(STR_FILL)
        .to_string()
}

/// Builds `(nt,)` arrays for every field of a reach or lake vocabulary.
pub fn build_series_arrays(fields: &'static [FieldSpec], series: &ReachSeries) -> FieldArrays<Ix1> {
    let records = series.records();
    let arrays = fields
        .iter()
        .map(|spec| {
            let data = match spec.kind {
                FieldKind::Float => ArrayData::Float(
                    records.iter().map(|r| float_of(Some(r), spec.name)).collect(),
                ),
                FieldKind::Flag => ArrayData::Flag(
                    records.iter().map(|r| flag_of(Some(r), spec.name)).collect(),
                ),
                FieldKind::Text => ArrayData::Text(
                    records.iter().map(|r| text_of(Some(r), spec.name)).collect(),
                ),
            };
            FieldArray { spec, data }
        })
        .collect();
    FieldArrays { arrays }
}

fn broadcast_field(
    spec: &'static FieldSpec,
    reach: &FieldArrays<Ix1>,
    node_count: usize,
    time_count: usize,
) -> Result<ArrayData<Ix2>, InputError> {
    let source = reach.get(spec.name).ok_or_else(|| {
        InputError::Config(format!("node field {} has no reach-level source", spec.name))
    })?;
    if source.data.shape() != [time_count] {
        return Err(InputError::ShapeMismatch {
            field: spec.name.to_string(),
            expected: time_count,
            found: source.data.shape().first().copied().unwrap_or(0),
        });
    }
    Ok(match &source.data {
        ArrayData::Float(a) => ArrayData::Float(broadcast_to_nodes(a, node_count)),
        ArrayData::Flag(a) => ArrayData::Flag(broadcast_to_nodes(a, node_count)),
        ArrayData::Text(a) => ArrayData::Text(broadcast_to_nodes(a, node_count)),
    })
}

/// Builds `(nx, nt)` arrays from aligned node rows.
///
/// `nodes` must already be in output order and each must carry exactly
/// `time_count` rows. Reach-origin fields are copied from `reach`, so any
/// reach-level derivation has to happen before this is called.
pub fn build_node_arrays(
    fields: &'static [FieldSpec],
    nodes: &[AlignedNode<'_>],
    reach: &FieldArrays<Ix1>,
    time_count: usize,
) -> Result<FieldArrays<Ix2>, InputError> {
    for node in nodes {
        if node.rows.len() != time_count {
            return Err(InputError::ShapeMismatch {
                field: format!("node {}", node.node_id),
                expected: time_count,
                found: node.rows.len(),
            });
        }
    }
    let shape = (nodes.len(), time_count);
    let cell = |i: usize, t: usize| nodes[i].rows[t];

    let mut arrays = Vec::with_capacity(fields.len());
    for spec in fields {
        let data = match (spec.origin, spec.kind) {
            (FieldOrigin::Reach, _) => broadcast_field(spec, reach, nodes.len(), time_count)?,
            (FieldOrigin::Observed, FieldKind::Float) => ArrayData::Float(Array2::from_shape_fn(
                shape,
                |(i, t)| float_of(cell(i, t), spec.name),
            )),
            (FieldOrigin::Observed, FieldKind::Flag) => ArrayData::Flag(Array2::from_shape_fn(
                shape,
                |(i, t)| flag_of(cell(i, t), spec.name),
            )),
            (FieldOrigin::Observed, FieldKind::Text) => ArrayData::Text(Array2::from_shape_fn(
                shape,
                |(i, t)| text_of(cell(i, t), spec.name),
            )),
        };
        arrays.push(FieldArray { spec, data });
    }
    Ok(FieldArrays { arrays })
}
