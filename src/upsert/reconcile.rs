use anyhow::Result;
use std::collections::{hash_map::Entry, HashMap, HashSet};

use super::{SheetSnapshot, SnapshotRow, UpsertError};
use crate::records::{RecordSet, RowKey};

/// What has to change in the sheet to make it reflect a record set.
///
/// Record positions are indices into [RecordSet::records], row positions are sheet rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetDiff {
    /// Record set columns the sheet doesn't have yet, in record set order.
    pub new_columns: Vec<String>,
    /// Records whose key isn't in the sheet, in record set order.
    pub new_rows: Vec<usize>,
    /// Records whose row exists but differs in at least one shared column.
    pub changed_rows: Vec<RowChange>,
    /// Records whose row exists and has values for some of the new columns.
    pub backfilled_rows: Vec<RowChange>,
    /// Keys that only exist in the sheet. They are kept as they are.
    pub unmatched_storage_keys: Vec<RowKey>,
}

/// Cells of one existing row that need to be (re)written from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChange {
    pub record: usize,
    pub position: u32,
    pub columns: Vec<String>,
}

impl SheetDiff {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.new_columns.is_empty()
            && self.new_rows.is_empty()
            && self.changed_rows.is_empty()
            && self.backfilled_rows.is_empty()
    }
}

/// Compare a record set against a sheet snapshot.
///
/// Without a key column every record is a new row. With one, records are matched to rows by
/// key; only columns both sides have are compared, and an empty cell equals a missing value.
pub fn reconcile(
    records: &RecordSet,
    snapshot: &SheetSnapshot,
    key_column: Option<&str>,
) -> Result<SheetDiff> {
    let known_headers: HashSet<&str> = snapshot.headers.iter().map(String::as_str).collect();
    let new_columns: Vec<String> = records
        .columns()
        .iter()
        .filter(|column| !known_headers.contains(column.as_str()))
        .cloned()
        .collect();

    let Some(key_column) = key_column else {
        return Ok(SheetDiff {
            new_columns,
            new_rows: (0..records.len()).collect(),
            ..SheetDiff::default()
        });
    };

    let record_keys = record_keys(records, key_column)?;
    let storage_rows = storage_rows(snapshot, key_column);
    let shared_columns: Vec<&str> = records
        .columns()
        .iter()
        .map(String::as_str)
        .filter(|column| known_headers.contains(column))
        .collect();

    let mut diff = SheetDiff {
        new_columns,
        ..SheetDiff::default()
    };
    for (index, (record, key)) in records.records().iter().zip(&record_keys).enumerate() {
        let Some(stored) = storage_rows.get(key) else {
            diff.new_rows.push(index);
            continue;
        };
        let changed: Vec<String> = shared_columns
            .iter()
            .filter(|column| !record.value(column).same_as(stored.record.value(column)))
            .map(|column| column.to_string())
            .collect();
        if !changed.is_empty() {
            log::debug!("Row {} (key {key}) changed in {changed:?}", stored.position);
            diff.changed_rows.push(RowChange {
                record: index,
                position: stored.position,
                columns: changed,
            });
        }
        let backfilled: Vec<String> = diff
            .new_columns
            .iter()
            .filter(|column| !record.value(column).is_empty())
            .cloned()
            .collect();
        if !backfilled.is_empty() {
            diff.backfilled_rows.push(RowChange {
                record: index,
                position: stored.position,
                columns: backfilled,
            });
        }
    }

    let incoming: HashSet<&RowKey> = record_keys.iter().collect();
    diff.unmatched_storage_keys = snapshot
        .rows
        .iter()
        .filter_map(|row| row.record.value(key_column).row_key())
        .filter(|key| !incoming.contains(key))
        .collect();

    Ok(diff)
}

/// Keys of all records. Every record needs a key, and no two records may share one.
fn record_keys(records: &RecordSet, key_column: &str) -> Result<Vec<RowKey>> {
    if !records.has_column(key_column) {
        return Err(UpsertError::invalid_input(format!(
            "Key column '{key_column}' is missing from the records"
        ))
        .into());
    }
    let mut seen = HashSet::new();
    records
        .records()
        .iter()
        .enumerate()
        .map(|(index, record)| -> Result<RowKey> {
            let key = record.value(key_column).row_key().ok_or_else(|| {
                UpsertError::invalid_input(format!(
                    "Record {index} has no value in key column '{key_column}'"
                ))
            })?;
            if !seen.insert(key.clone()) {
                return Err(UpsertError::invalid_input(format!(
                    "Key {key} appears more than once in the records"
                ))
                .into());
            }
            Ok(key)
        })
        .collect()
}

/// The sheet's rows by key. If a key appears twice, the upper row is the one that's managed.
fn storage_rows<'a>(
    snapshot: &'a SheetSnapshot,
    key_column: &str,
) -> HashMap<RowKey, &'a SnapshotRow> {
    let mut rows: HashMap<RowKey, &SnapshotRow> = HashMap::new();
    for row in &snapshot.rows {
        let Some(key) = row.record.value(key_column).row_key() else {
            continue;
        };
        match rows.entry(key) {
            Entry::Occupied(entry) => {
                log::warn!(
                    "Key {} appears more than once in the sheet, only row {} gets updated",
                    entry.key(),
                    entry.get().position
                );
            }
            Entry::Vacant(entry) => {
                entry.insert(row);
            }
        }
    }
    rows
}
