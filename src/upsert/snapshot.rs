use anyhow::Result;

use super::UpsertError;
use crate::records::Record;
use crate::store::{CellRef, SheetStore};

pub const HEADER_ROW: u32 = 1;
pub const FIRST_COLUMN: u32 = 1;

/// The managed part of a sheet as it was before the upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetSnapshot {
    /// Header cells of the first row, up to the first empty one.
    pub headers: Vec<String>,
    /// Data rows below the header, up to the first row without a key.
    pub rows: Vec<SnapshotRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub position: u32,
    pub record: Record,
}

impl SheetSnapshot {
    /// Column of a header. If a header appears twice, the leftmost one is managed.
    pub fn column_of(&self, header: &str) -> Option<u32> {
        (FIRST_COLUMN..)
            .zip(&self.headers)
            .find(|(_, name)| name.as_str() == header)
            .map(|(col, _)| col)
    }

    /// The last row that belongs to the managed data, the header row if there are no rows.
    pub fn last_row(&self) -> u32 {
        HEADER_ROW + self.rows.len() as u32
    }
}

/// Read the header row and the managed data rows of the store's sheet.
///
/// With a key column, the row scan stops at the first row whose key cell is empty.
/// Without one, it stops at the first row whose managed cells are all empty. Anything below
/// that point is left to the user.
pub fn read_snapshot(store: &impl SheetStore, key_column: Option<&str>) -> Result<SheetSnapshot> {
    log::debug!("Reading sheet '{}'...", store.sheet_name());
    let headers = read_headers(store);
    if headers.is_empty() {
        log::debug!("Sheet '{}' has no header row", store.sheet_name());
        return Ok(SheetSnapshot::default());
    }

    let mut snapshot = SheetSnapshot {
        headers,
        rows: vec![],
    };
    let key_col = match key_column {
        Some(key) => Some(snapshot.column_of(key).ok_or_else(|| UpsertError::Schema {
            column: key.to_string(),
            sheet: store.sheet_name().to_string(),
        })?),
        None => None,
    };

    let mut row = HEADER_ROW + 1;
    loop {
        let reached_end = match key_col {
            Some(key_col) => store.cell(CellRef::new(key_col, row)).is_empty(),
            None => (FIRST_COLUMN..)
                .take(snapshot.headers.len())
                .all(|col| store.cell(CellRef::new(col, row)).is_empty()),
        };
        if reached_end {
            break;
        }
        let record = read_record(store, &snapshot.headers, row);
        snapshot.rows.push(SnapshotRow {
            position: row,
            record,
        });
        row += 1;
    }

    log::debug!(
        "Reading sheet '{}'...done: {} columns, {} rows",
        store.sheet_name(),
        snapshot.headers.len(),
        snapshot.rows.len(),
    );
    Ok(snapshot)
}

fn read_headers(store: &impl SheetStore) -> Vec<String> {
    (FIRST_COLUMN..)
        .map(|col| store.cell(CellRef::new(col, HEADER_ROW)))
        .take_while(|value| !value.is_empty())
        .map(|value| value.to_string())
        .collect()
}

fn read_record(store: &impl SheetStore, headers: &[String], row: u32) -> Record {
    let mut record = Record::new();
    for (col, header) in (FIRST_COLUMN..).zip(headers) {
        if record.contains(header) {
            continue;
        }
        let value = store.cell(CellRef::new(col, row));
        record.insert(header.as_str(), value);
    }
    record
}
