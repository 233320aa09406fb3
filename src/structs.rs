use log::{Log, Metadata, Record as LogRecord};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Simple logger implementation
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &LogRecord) {
        println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// The whole YAML document: the shared `run` section plus one entry
/// per dataset id at the top level.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub run: RunSection,
    #[serde(flatten)]
    pub datasets: BTreeMap<String, DatasetSpec>,
}

/// The `run` section: the list of dataset ids to process plus shared
/// defaults for every field a dataset entry may set itself.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    pub active_ids: Vec<String>,
    #[serde(flatten)]
    pub defaults: DatasetSpec,
}

/// One dataset entry as written in YAML. Every field is optional;
/// missing fields fall back to the `run` section at resolve time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetSpec {
    pub header: Option<Vec<String>>,
    pub sep: Option<String>,
    pub data: Option<Vec<String>>,
    pub out_path: Option<PathBuf>,
    pub out_bname: Option<String>,
    pub out_fmts: Option<BTreeMap<String, String>>,
}

/// A dataset after run-level defaults have been merged in.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub header: Vec<String>,
    pub sep: String,
    pub data: Vec<String>,
    pub out_path: PathBuf,
    pub out_bname: String,
    pub out_fmts: BTreeMap<String, String>,
}

/// A single typed cell. Null only ever comes from ragged-row padding.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl CellValue {
    /// Text rendering used by the csv and markdown writers.
    pub fn render(&self) -> String {
        match self {
            CellValue::Int(v) => v.to_string(),
            CellValue::Float(v) => v.to_string(),
            CellValue::Str(s) => s.clone(),
            CellValue::Null => String::new(),
        }
    }
}

/// Column type after inference over all non-null cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Str,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }
}

/// A named, typed column of cells.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub cells: Vec<CellValue>,
}

/// In-memory table, columns in header order.
#[derive(Debug, Clone)]
pub struct Table {
    pub columns: Vec<Column>,
    pub num_rows: usize,
}
