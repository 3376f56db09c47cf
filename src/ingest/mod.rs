/// Record sources: where raw reach, node and lake observations come from.
///
/// Every source answers the same two questions (the series for a top-level
/// feature, the series for one node) so the pipeline never knows whether
/// records came from Hydrocron, a directory of attribute tables, or a replay
/// fixture.

pub mod hydrocron;
pub mod local;
pub mod replay;
pub mod retry;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::fields::Product;
use crate::model::{FeatureId, FieldValue, InputError, NodeId, ObservationRecord};

/// Supplies raw observation records keyed by identifier.
pub trait RecordSource {
    /// All records for a reach (`Product::River`) or prior lake
    /// (`Product::Lake`). Order is not significant.
    fn feature_series(
        &self,
        product: Product,
        id: FeatureId,
    ) -> Result<Vec<ObservationRecord>, InputError>;

    /// All records for one node. Order is not significant.
    fn node_series(&self, id: NodeId) -> Result<Vec<ObservationRecord>, InputError>;
}

/// Inclusive observation time window. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> TimeRange {
        TimeRange { start, end }
    }

    /// Records without a parsed instant are always kept; the aligner
    /// decides what to do with them.
    pub fn contains(&self, instant: Option<DateTime<Utc>>) -> bool {
        let Some(t) = instant else { return true };
        self.start.is_none_or(|s| t >= s) && self.end.is_none_or(|e| t <= e)
    }

    pub fn filter(&self, records: Vec<ObservationRecord>) -> Vec<ObservationRecord> {
        records.into_iter().filter(|r| self.contains(r.instant)).collect()
    }
}

/// Parses a CSV attribute table (header row + one row per observation).
///
/// Numeric cells become numbers, empty cells missing, anything else text.
/// The `time_str` column supplies each record's timestamp.
pub fn parse_csv_records(csv_text: &str) -> Result<Vec<ObservationRecord>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(csv_text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut fields = BTreeMap::new();
        for (name, cell) in headers.iter().zip(row.iter()) {
            let value = if name == "time_str" {
                FieldValue::Text(cell.to_string())
            } else {
                FieldValue::from_cell(cell)
            };
            fields.insert(name.to_string(), value);
        }
        records.push(ObservationRecord::from_fields(fields));
    }
    Ok(records)
}
