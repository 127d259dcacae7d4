use indexmap::IndexMap;
use std::fmt::{self, Display};

static EMPTY: CellValue = CellValue::Empty;

/// A scalar value of a record field or a spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    String(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Null and the empty string are both "no value" for the purpose of matching.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(text) => text.is_empty(),
            CellValue::Number(_) | CellValue::Bool(_) => false,
        }
    }

    /// Equality as seen by the reconciler: two empty values match each other, everything
    /// else compares by type and value.
    pub fn same_as(&self, other: &CellValue) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => true,
            (false, false) => self == other,
            _ => false,
        }
    }

    /// Returns None for empty values, which can't identify a row.
    pub fn row_key(&self) -> Option<RowKey> {
        if self.is_empty() {
            return None;
        }
        match self {
            CellValue::Empty => None,
            CellValue::String(text) => Some(RowKey::Text(text.clone())),
            // Adding 0.0 folds -0.0 into 0.0 so both hash the same
            CellValue::Number(number) => Some(RowKey::Number((number + 0.0).to_bits())),
            CellValue::Bool(flag) => Some(RowKey::Bool(*flag)),
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::String(text) => write!(f, "{text}"),
            CellValue::Number(number) => write!(f, "{number}"),
            CellValue::Bool(flag) => write!(f, "{flag}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(value.into())
    }
}

/// Hashable identity of a row, taken from its key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Text(String),
    Number(u64),
    Bool(bool),
}

impl Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Text(text) => write!(f, "{text:?}"),
            RowKey::Number(bits) => write!(f, "{}", f64::from_bits(*bits)),
            RowKey::Bool(flag) => write!(f, "{flag}"),
        }
    }
}

/// A flat record: column name to value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: IndexMap<String, CellValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }

    /// Like [Record::get], but a missing column reads as [CellValue::Empty].
    pub fn value(&self, column: &str) -> &CellValue {
        self.values.get(column).unwrap_or(&EMPTY)
    }

    /// Sets a column. An existing column keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.values
            .iter()
            .map(|(column, value)| (column.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        }
    }
}

/// The canonical dataset handed to the exporters.
///
/// Columns are ordered by first appearance across all records, so a column that only
/// some records have still shows up exactly once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        let mut columns: IndexMap<&str, ()> = IndexMap::new();
        for record in &records {
            for column in record.columns() {
                columns.insert(column, ());
            }
        }
        let columns = columns.into_keys().map(str::to_string).collect();
        Self { columns, records }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records, or records without a single column.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() || self.columns.is_empty()
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
