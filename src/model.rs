/// Identifiers, observation records, and the crate-wide error type.
///
/// Every other module imports its shared vocabulary from here. Observation
/// records are deliberately loose (a field-name -> value map) because the
/// record sources disagree on column sets; the typed shape is imposed later
/// by the field registry and the dense array builder.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fill::{STR_FILL, is_missing};

// ---------------------------------------------------------------------------
// Continents
// ---------------------------------------------------------------------------

/// Continent code encoded by the first digit of every SWORD identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Continent {
    #[serde(rename = "AF")]
    Africa,
    #[serde(rename = "EU")]
    Europe,
    #[serde(rename = "AS")]
    Asia,
    #[serde(rename = "OC")]
    Oceania,
    #[serde(rename = "SA")]
    SouthAmerica,
    #[serde(rename = "NA")]
    NorthAmerica,
}

impl Continent {
    /// Maps the leading identifier digit to its continent.
    ///
    /// Digits 3 and 4 both denote Asia; 7, 8 and 9 all denote North America.
    pub fn from_digit(digit: u32) -> Option<Continent> {
        match digit {
            1 => Some(Continent::Africa),
            2 => Some(Continent::Europe),
            3 | 4 => Some(Continent::Asia),
            5 => Some(Continent::Oceania),
            6 => Some(Continent::SouthAmerica),
            7..=9 => Some(Continent::NorthAmerica),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Continent::Africa => "AF",
            Continent::Europe => "EU",
            Continent::Asia => "AS",
            Continent::Oceania => "OC",
            Continent::SouthAmerica => "SA",
            Continent::NorthAmerica => "NA",
        }
    }

    pub fn from_code(code: &str) -> Option<Continent> {
        match code.to_ascii_uppercase().as_str() {
            "AF" => Some(Continent::Africa),
            "EU" => Some(Continent::Europe),
            "AS" => Some(Continent::Asia),
            "OC" => Some(Continent::Oceania),
            "SA" => Some(Continent::SouthAmerica),
            "NA" => Some(Continent::NorthAmerica),
            _ => None,
        }
    }
}

impl fmt::Display for Continent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Number of digits in a reach identifier (CBBBBBRRRRT).
pub const REACH_ID_DIGITS: usize = 11;
/// Number of digits in a node identifier (CBBBBBRRRRNNNT).
pub const NODE_ID_DIGITS: usize = 14;
/// Number of digits in a prior lake identifier (CBBNNNNNNT).
pub const LAKE_ID_DIGITS: usize = 10;

/// Identifier of a top-level feature: a river reach or a prior lake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdRepr", into = "u64")]
pub struct FeatureId(u64);

/// Identifier of a node inside a reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdRepr", into = "u64")]
pub struct NodeId(u64);

/// Job lists and attribute tables carry identifiers as either numbers or
/// strings; both are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u64),
    Text(String),
}

fn parse_digits(raw: &str, allowed: &[usize]) -> Result<u64, InputError> {
    let trimmed = raw.trim();
    if !allowed.contains(&trimmed.len()) || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InputError::InvalidIdentifier(raw.to_string()));
    }
    let value: u64 = trimmed
        .parse()
        .map_err(|_| InputError::InvalidIdentifier(raw.to_string()))?;
    let leading = trimmed.as_bytes()[0] - b'0';
    if Continent::from_digit(leading as u32).is_none() {
        return Err(InputError::InvalidIdentifier(raw.to_string()));
    }
    Ok(value)
}

fn leading_digit(value: u64) -> u32 {
    let mut v = value;
    while v >= 10 {
        v /= 10;
    }
    v as u32
}

impl FeatureId {
    /// Parses an 11-digit reach identifier.
    pub fn reach(raw: &str) -> Result<FeatureId, InputError> {
        parse_digits(raw, &[REACH_ID_DIGITS]).map(FeatureId)
    }

    /// Parses a 10-digit prior lake identifier.
    pub fn lake(raw: &str) -> Result<FeatureId, InputError> {
        parse_digits(raw, &[LAKE_ID_DIGITS]).map(FeatureId)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn continent(&self) -> Continent {
        // Construction guarantees a valid leading digit.
        Continent::from_digit(leading_digit(self.0)).unwrap_or(Continent::NorthAmerica)
    }

    /// First ten digits of a reach identifier (CBBBBBRRRR), shared with
    /// every node that belongs to the reach.
    pub fn reach_prefix(&self) -> u64 {
        self.0 / 10
    }
}

impl NodeId {
    pub fn parse(raw: &str) -> Result<NodeId, InputError> {
        parse_digits(raw, &[NODE_ID_DIGITS]).map(NodeId)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The reach prefix (CBBBBBRRRR) this node belongs to.
    pub fn reach_prefix(&self) -> u64 {
        self.0 / 10_000
    }
}

impl FromStr for FeatureId {
    type Err = InputError;

    /// Accepts either a reach or a lake identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_digits(s, &[REACH_ID_DIGITS, LAKE_ID_DIGITS]).map(FeatureId)
    }
}

impl FromStr for NodeId {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::parse(s)
    }
}

impl TryFrom<IdRepr> for FeatureId {
    type Error = InputError;

    fn try_from(repr: IdRepr) -> Result<Self, Self::Error> {
        match repr {
            IdRepr::Number(n) => n.to_string().parse(),
            IdRepr::Text(s) => s.parse(),
        }
    }
}

impl TryFrom<IdRepr> for NodeId {
    type Error = InputError;

    fn try_from(repr: IdRepr) -> Result<Self, Self::Error> {
        match repr {
            IdRepr::Number(n) => n.to_string().parse(),
            IdRepr::Text(s) => s.parse(),
        }
    }
}

impl From<FeatureId> for u64 {
    fn from(id: FeatureId) -> u64 {
        id.0
    }
}

impl From<NodeId> for u64 {
    fn from(id: NodeId) -> u64 {
        id.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Observation records
// ---------------------------------------------------------------------------

/// One scalar value in a raw observation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    /// Interprets an attribute-table cell: empty -> missing, numeric -> number.
    pub fn from_cell(cell: &str) -> FieldValue {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return FieldValue::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) => FieldValue::Number(v),
            Err(_) => FieldValue::Text(trimmed.to_string()),
        }
    }

    /// Numeric view of the value. Fill sentinels and NaN read as `None`.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            FieldValue::Number(v) => *v,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
            FieldValue::Missing => return None,
        };
        if is_missing(v) { None } else { Some(v) }
    }
}

/// A single observation instant for one reach, node or lake.
///
/// `time_str` is kept verbatim (it is written back out as the observation
/// label); `instant` is its parsed form, `None` for the `no_data` sentinel
/// or anything unparseable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordRepr", into = "RecordRepr")]
pub struct ObservationRecord {
    pub time_str: String,
    pub instant: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Serialize, Deserialize)]
struct RecordRepr {
    time_str: String,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

impl From<RecordRepr> for ObservationRecord {
    fn from(repr: RecordRepr) -> Self {
        ObservationRecord::new(repr.time_str, repr.fields)
    }
}

impl From<ObservationRecord> for RecordRepr {
    fn from(record: ObservationRecord) -> Self {
        RecordRepr {
            time_str: record.time_str,
            fields: record.fields,
        }
    }
}

impl ObservationRecord {
    pub fn new(time_str: impl Into<String>, fields: BTreeMap<String, FieldValue>) -> Self {
        let time_str = time_str.into();
        let instant = parse_timestamp(&time_str);
        ObservationRecord {
            time_str,
            instant,
            fields,
        }
    }

    /// Builds a record from a flat row, taking the timestamp from its
    /// `time_str` column (or the text fill when the column is absent).
    pub fn from_fields(fields: BTreeMap<String, FieldValue>) -> Self {
        let time_str = match fields.get("time_str") {
            Some(FieldValue::Text(s)) => s.clone(),
            _ => STR_FILL.to_string(),
        };
        ObservationRecord::new(time_str, fields)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_f64)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        if name == "time_str" {
            return Some(&self.time_str);
        }
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// Parses an observation timestamp.
///
/// Accepts RFC 3339 (`2023-04-08T06:33:07Z`) and the naive forms used in
/// SWOT attribute tables (`2023-04-08T06:33:07`, `2023-04-08 06:33:07.123`),
/// which are taken as UTC. The `no_data` sentinel yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(STR_FILL) || trimmed == "no data" {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = trimmed.trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| dt.and_utc())
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while fetching, assembling or writing SWOT inputs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    /// Non-2xx HTTP response from a remote service.
    #[error("HTTP error: {0}")]
    HttpError(u16),

    /// The request never produced a response (connect failure, timeout).
    #[error("Request failed: {0}")]
    Request(String),

    /// A response body or attribute table could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The source holds no observations for this feature.
    #[error("No data available for feature: {0}")]
    NoDataAvailable(String),

    /// Every allowed attempt failed with a transient error.
    #[error("Retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<InputError> },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A node was observed at an instant the reach was not (strict policy).
    #[error("Node {node_id} observed at {time_str}, which is not an observation instant of reach {reach_id}")]
    ReachNodeMismatch {
        reach_id: FeatureId,
        node_id: NodeId,
        time_str: String,
    },

    #[error("Shape mismatch for {field}: expected {expected}, found {found}")]
    ShapeMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("I/O error on {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl InputError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            InputError::HttpError(code) => *code == 429 || (500..600).contains(code),
            InputError::Request(_) => true,
            _ => false,
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: impl fmt::Display) -> InputError {
        InputError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for InputError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => InputError::HttpError(status.as_u16()),
            None if err.is_decode() => InputError::ParseError(err.to_string()),
            None => InputError::Request(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for InputError {
    fn from(err: serde_json::Error) -> Self {
        InputError::ParseError(err.to_string())
    }
}

impl From<csv::Error> for InputError {
    fn from(err: csv::Error) -> Self {
        InputError::ParseError(err.to_string())
    }
}

impl From<shapefile::Error> for InputError {
    fn from(err: shapefile::Error) -> Self {
        InputError::ParseError(err.to_string())
    }
}
