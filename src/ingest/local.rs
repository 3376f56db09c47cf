/// Local SWOT attribute tables.
///
/// Reads a directory of per-pass RiverSP / LakeSP products: the shapefiles
/// as distributed (`.shp` with its `.dbf` attribute table) or CSV exports of
/// the same tables. File names keep the SWOT product convention:
///
/// ```text
/// SWOT_L2_HR_RiverSP_Reach_<cycle>_<pass>_<continent>_<start>_<end>_<crid>_<counter>.shp
/// SWOT_L2_HR_RiverSP_Node_ ...
/// SWOT_L2_HR_LakeSP_Prior_ ...
/// ```
///
/// Only first-processing files (product counter ending in `1`) are read;
/// reprocessed copies of the same pass would otherwise double-count
/// observations. Cycle and pass come from the file name and are added to
/// each row when the table does not carry them.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::fields::Product;
use crate::ingest::{RecordSource, TimeRange, parse_csv_records};
use crate::model::{FeatureId, FieldValue, InputError, NodeId, ObservationRecord};

use shapefile::dbase;

/// Table formats the local source reads, by file extension.
const TABLE_EXTENSIONS: [&str; 2] = ["shp", "csv"];

/// Which attribute table a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Reach,
    Node,
    PriorLake,
}

impl TableKind {
    fn id_column(&self) -> &'static str {
        match self {
            TableKind::Reach => "reach_id",
            TableKind::Node => "node_id",
            TableKind::PriorLake => "lake_id",
        }
    }
}

/// Metadata parsed from one attribute-table file name.
#[derive(Debug, Clone, PartialEq)]
pub struct PassFile {
    pub kind: TableKind,
    pub cycle: u32,
    pub pass: u32,
    pub first_processing: bool,
    pub path: PathBuf,
}

/// Parses a SWOT product file name; `None` if it does not follow the
/// convention.
pub fn parse_pass_file_name(path: &Path) -> Option<PassFile> {
    let stem = path.file_stem()?.to_str()?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 8 || parts[0] != "SWOT" {
        return None;
    }
    let kind = match (parts[3], parts[4]) {
        ("RiverSP", "Reach") => TableKind::Reach,
        ("RiverSP", "Node") => TableKind::Node,
        ("LakeSP", "Prior") => TableKind::PriorLake,
        _ => return None,
    };
    let cycle = parts[5].parse().ok()?;
    let pass = parts[6].parse().ok()?;
    let counter = parts.last()?;
    Some(PassFile {
        kind,
        cycle,
        pass,
        first_processing: counter.ends_with('1'),
        path: path.to_path_buf(),
    })
}

/// Reads the attribute records of a shapefile (its `.dbf` table).
///
/// Geometry is skipped. The `time_str` column stays text; other character
/// cells are interpreted like CSV cells so numeric ids compare as numbers.
pub fn read_shapefile_records(path: &Path) -> Result<Vec<ObservationRecord>, InputError> {
    let mut reader = shapefile::Reader::from_path(path).map_err(|e| InputError::io(path, e))?;
    let mut records = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (_shape, row) = result?;
        let row: HashMap<String, dbase::FieldValue> = row.into();
        let fields: BTreeMap<String, FieldValue> = row
            .into_iter()
            .map(|(name, value)| {
                let value = attribute_value(&name, value);
                (name, value)
            })
            .collect();
        records.push(ObservationRecord::from_fields(fields));
    }
    Ok(records)
}

fn attribute_value(name: &str, value: dbase::FieldValue) -> FieldValue {
    use dbase::FieldValue as Dbf;
    match value {
        Dbf::Character(Some(text)) if name == "time_str" => FieldValue::Text(text.trim().to_string()),
        Dbf::Character(Some(text)) | Dbf::Memo(text) => FieldValue::from_cell(&text),
        Dbf::Numeric(Some(v)) => FieldValue::Number(v),
        Dbf::Float(Some(v)) => FieldValue::Number(v as f64),
        Dbf::Integer(v) => FieldValue::Number(v as f64),
        Dbf::Double(v) | Dbf::Currency(v) => FieldValue::Number(v),
        Dbf::Logical(Some(b)) => FieldValue::Number(if b { 1.0 } else { 0.0 }),
        _ => FieldValue::Missing,
    }
}

fn read_table(path: &Path) -> Result<Vec<ObservationRecord>, InputError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("shp") => read_shapefile_records(path),
        _ => {
            let text = fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
            parse_csv_records(&text)
        }
    }
}

fn matches_id(value: Option<&FieldValue>, id: u64) -> bool {
    match value {
        Some(FieldValue::Number(v)) => *v == id as f64,
        Some(FieldValue::Text(s)) => s.trim().parse::<u64>().ok() == Some(id),
        _ => false,
    }
}

/// `RecordSource` over a directory of attribute tables.
pub struct LocalSource {
    files: Vec<PassFile>,
    range: TimeRange,
    cache: RefCell<HashMap<PathBuf, Rc<Vec<ObservationRecord>>>>,
}

impl LocalSource {
    /// Indexes the first-processing tables in `dir`, ordered by cycle/pass.
    pub fn open(dir: &Path, range: TimeRange) -> Result<LocalSource, InputError> {
        let entries = fs::read_dir(dir).map_err(|e| InputError::io(dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| InputError::io(dir, e))?.path();
            let extension = path.extension().and_then(|e| e.to_str());
            if !extension.is_some_and(|e| TABLE_EXTENSIONS.contains(&e)) {
                continue;
            }
            match parse_pass_file_name(&path) {
                Some(file) if file.first_processing => files.push(file),
                Some(file) => {
                    tracing::debug!(path = %file.path.display(), "skipping reprocessed table");
                }
                None => {
                    tracing::debug!(path = %path.display(), "skipping unrecognised file");
                }
            }
        }
        files.sort_by(|a, b| (a.cycle, a.pass, &a.path).cmp(&(b.cycle, b.pass, &b.path)));
        tracing::info!(dir = %dir.display(), tables = files.len(), "indexed local attribute tables");
        Ok(LocalSource {
            files,
            range,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn files(&self) -> &[PassFile] {
        &self.files
    }

    fn table(&self, file: &PassFile) -> Result<Rc<Vec<ObservationRecord>>, InputError> {
        if let Some(hit) = self.cache.borrow().get(&file.path) {
            return Ok(Rc::clone(hit));
        }
        let mut records = read_table(&file.path)?;
        for record in &mut records {
            record
                .fields
                .entry("cycle_id".to_string())
                .or_insert(FieldValue::Number(file.cycle as f64));
            record
                .fields
                .entry("pass_id".to_string())
                .or_insert(FieldValue::Number(file.pass as f64));
        }
        let records = Rc::new(records);
        self.cache
            .borrow_mut()
            .insert(file.path.clone(), Rc::clone(&records));
        Ok(records)
    }

    fn collect(&self, kind: TableKind, id: u64) -> Result<Vec<ObservationRecord>, InputError> {
        let mut out = Vec::new();
        for file in self.files.iter().filter(|f| f.kind == kind) {
            let table = self.table(file)?;
            out.extend(
                table
                    .iter()
                    .filter(|r| matches_id(r.value(kind.id_column()), id))
                    .cloned(),
            );
        }
        if out.is_empty() {
            return Err(InputError::NoDataAvailable(id.to_string()));
        }
        Ok(self.range.filter(out))
    }
}

impl RecordSource for LocalSource {
    fn feature_series(
        &self,
        product: Product,
        id: FeatureId,
    ) -> Result<Vec<ObservationRecord>, InputError> {
        let kind = match product {
            Product::River => TableKind::Reach,
            Product::Lake => TableKind::PriorLake,
        };
        self.collect(kind, id.value())
    }

    fn node_series(&self, id: NodeId) -> Result<Vec<ObservationRecord>, InputError> {
        self.collect(TableKind::Node, id.value())
    }
}
