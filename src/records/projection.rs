use anyhow::{anyhow, bail, ensure, Result};
use std::collections::HashSet;
use std::str::FromStr;

use super::{CellValue, Record, RecordSet};

/// One entry of a `--header` list: `source` selects a column, `source=target` also renames it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    pub source: String,
    pub target: String,
}

impl FromStr for ColumnSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (source, target) = s.split_once('=').unwrap_or((s, s));
        ensure!(!source.is_empty(), "Empty column name in '{s}'");
        ensure!(!target.is_empty(), "Empty target column name in '{s}'");
        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
        })
    }
}

/// Select and rename columns. A selected column that no record has is an error, unless
/// `fill_missing` is set, in which case it's added with empty values.
pub fn project(
    records: &RecordSet,
    selection: &[ColumnSelection],
    fill_missing: bool,
) -> Result<RecordSet> {
    let mut targets = HashSet::new();
    for column in selection {
        if !targets.insert(column.target.as_str()) {
            bail!("Column '{}' selected more than once", column.target);
        }
        if !fill_missing && !records.has_column(&column.source) {
            return Err(anyhow!(
                "Column '{}' not found in records. Available columns: {}",
                column.source,
                records.columns().join(", "),
            ));
        }
    }
    Ok(records
        .records()
        .iter()
        .map(|record| {
            selection
                .iter()
                .map(|column| {
                    (
                        column.target.clone(),
                        record
                            .get(&column.source)
                            .cloned()
                            .unwrap_or(CellValue::Empty),
                    )
                })
                .collect::<Record>()
        })
        .collect())
}
