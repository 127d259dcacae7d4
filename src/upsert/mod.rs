//! Merge a record set into a sheet that a human may have edited since the last run.
//!
//! An upsert reads the managed part of the sheet, computes a [SheetDiff] against the records,
//! writes only the cells that differ, commits, then makes the named table cover the data and
//! commits again. Columns and rows that only exist in the sheet are never touched, and
//! neither is anything right of the header row or below the first row without a key.

use anyhow::Result;

use crate::records::RecordSet;
use crate::store::SheetStore;

mod error;
mod guard;
mod reconcile;
mod snapshot;
mod table;
mod writer;

pub use error::UpsertError;
pub use guard::{commit, ConflictResolver, RetryImmediately};
pub use reconcile::{reconcile, RowChange, SheetDiff};
pub use snapshot::{read_snapshot, SheetSnapshot, SnapshotRow, FIRST_COLUMN, HEADER_ROW};
pub use table::{manage_table, TableOutcome};
pub use writer::{apply_diff, Extent, WriteSummary};

pub const DEFAULT_TABLE_NAME: &str = "Table1";
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Column that identifies a record. Without one, every record is appended.
    pub key_column: Option<String>,
    pub table_name: String,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            key_column: None,
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl UpsertOptions {
    pub fn with_key(key_column: &str) -> Self {
        Self {
            key_column: Some(key_column.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub new_columns: Vec<String>,
    /// New columns that weren't added, their column next to the headers has unnamed content.
    pub skipped_columns: Vec<String>,
    pub appended_rows: usize,
    pub updated_rows: usize,
    pub backfilled_rows: usize,
    /// Rows that are only in the sheet. They were left as they are.
    pub preserved_rows: usize,
    pub cells_written: usize,
    pub table: TableOutcome,
}

pub fn upsert(
    store: &mut impl SheetStore,
    records: &RecordSet,
    options: &UpsertOptions,
    resolver: &mut impl ConflictResolver,
) -> Result<UpsertReport> {
    if records.is_empty() {
        return Err(UpsertError::invalid_input("There are no records to write").into());
    }
    let key_column = match &options.key_column {
        Some(key) if key.trim().is_empty() => {
            return Err(UpsertError::invalid_input("The key column name is empty").into());
        }
        Some(key) => Some(key.as_str()),
        None => None,
    };

    let snapshot = read_snapshot(store, key_column)?;
    let diff = reconcile(records, &snapshot, key_column)?;
    log::info!(
        "Sheet '{}': {} new columns, {} new rows, {} changed rows, {} rows only in the sheet",
        store.sheet_name(),
        diff.new_columns.len(),
        diff.new_rows.len(),
        diff.changed_rows.len(),
        diff.unmatched_storage_keys.len(),
    );

    let written = apply_diff(store, &snapshot, &diff, records)?;
    commit(store, resolver).map_err(|err| {
        let lost = format!(
            "{} cell writes to sheet '{}' were not saved ({} new rows, {} updated rows, {} new columns)",
            written.cells_written,
            store.sheet_name(),
            diff.new_rows.len(),
            diff.changed_rows.len(),
            diff.new_columns.len() - written.skipped_columns.len(),
        );
        log::warn!("{lost}");
        err.context(lost)
    })?;

    let table = match manage_table(store, &options.table_name, written.extent) {
        Ok(outcome) => outcome,
        Err(err) => {
            log::warn!("Failed to update table {}: {err:#}", options.table_name);
            TableOutcome::Failed(format!("{err:#}"))
        }
    };
    commit(store, resolver).map_err(|err| {
        let lost = format!(
            "The data of sheet '{}' was saved, but the table update was not ({table})",
            store.sheet_name(),
        );
        log::warn!("{lost}");
        err.context(lost)
    })?;

    let added = |column: &String| !written.skipped_columns.contains(column);
    Ok(UpsertReport {
        appended_rows: diff.new_rows.len(),
        updated_rows: diff.changed_rows.len(),
        backfilled_rows: diff
            .backfilled_rows
            .iter()
            .filter(|change| change.columns.iter().any(added))
            .count(),
        preserved_rows: diff.unmatched_storage_keys.len(),
        cells_written: written.cells_written,
        new_columns: diff.new_columns.into_iter().filter(|column| added(column)).collect(),
        skipped_columns: written.skipped_columns,
        table,
    })
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;
    use crate::records::{CellValue, Record};
    use crate::store::{CellRef, MemoryStore, TableRegion};

    fn record(values: &[(&str, CellValue)]) -> Record {
        values.iter().cloned().collect()
    }

    fn some_records() -> RecordSet {
        RecordSet::new(vec![
            record(&[("id", 1.into()), ("name", "A".into()), ("value", 10.into())]),
            record(&[("id", 2.into()), ("name", "B".into()), ("value", 20.into())]),
            record(&[("id", 3.into()), ("name", "C".into()), ("value", 30.into())]),
        ])
    }

    fn some_rows() -> Vec<Vec<CellValue>> {
        vec![
            vec!["id".into(), "name".into(), "value".into()],
            vec![1.into(), "A".into(), 10.into()],
            vec![2.into(), "B".into(), 20.into()],
            vec![3.into(), "C".into(), 30.into()],
        ]
    }

    fn run(store: &mut MemoryStore, records: &RecordSet) -> UpsertReport {
        upsert(
            store,
            records,
            &UpsertOptions::with_key("id"),
            &mut RetryImmediately::default(),
        )
        .unwrap()
    }

    fn table(last_col: u32, last_row: u32) -> TableRegion {
        TableRegion {
            name: DEFAULT_TABLE_NAME.to_string(),
            first_col: 1,
            first_row: 1,
            last_col,
            last_row,
        }
    }

    #[test]
    fn into_empty_sheet() {
        let mut store = MemoryStore::new("Sheet1");
        let report = run(&mut store, &some_records());
        assert_eq!(some_rows(), store.rows());
        assert_eq!(3, report.appended_rows);
        assert_eq!(report.new_columns, ["id", "name", "value"]);
        assert_eq!(TableOutcome::Created(table(3, 4)), report.table);
        assert_eq!(vec![table(3, 4)], store.tables());
        assert_eq!(2, store.commit_count());
    }

    #[test]
    fn second_run_writes_nothing() {
        let mut store = MemoryStore::new("Sheet1");
        run(&mut store, &some_records());
        let writes = store.write_count();

        let report = run(&mut store, &some_records());
        assert_eq!(writes, store.write_count());
        assert_eq!(0, report.cells_written);
        assert_eq!(TableOutcome::Unchanged(table(3, 4)), report.table);
        assert_eq!(some_rows(), store.rows());
    }

    #[test]
    fn changed_value_is_written_in_place() {
        let mut store = MemoryStore::from_rows("Sheet1", some_rows());
        let mut records = some_records().records().to_vec();
        records[1].insert("value", 25);
        let report = run(&mut store, &RecordSet::new(records));
        assert_eq!(1, report.updated_rows);
        assert_eq!(1, report.cells_written);
        assert_eq!(1, store.write_count());
        assert_eq!(CellValue::from(25), store.cell(CellRef::new(3, 3)));
    }

    #[test]
    fn new_key_is_appended() {
        let mut store = MemoryStore::from_rows("Sheet1", some_rows());
        let mut records = some_records().records().to_vec();
        records.push(record(&[("id", 4.into()), ("name", "D".into()), ("value", 40.into())]));
        let report = run(&mut store, &RecordSet::new(records));
        assert_eq!(1, report.appended_rows);
        assert_eq!(
            vec![CellValue::from(4), "D".into(), 40.into()],
            store.rows()[4]
        );
        assert_eq!(TableOutcome::Created(table(3, 5)), report.table);
    }

    #[test]
    fn custom_column_and_manual_row_are_preserved() {
        let mut rows = some_rows();
        rows[0].push("notes".into());
        rows[1].push(CellValue::Empty);
        rows[2].push("call back".into());
        rows[3].push(CellValue::Empty);
        rows.push(vec![99.into(), "manual".into(), 0.into(), "mine".into()]);
        let mut store = MemoryStore::from_rows("Sheet1", rows.clone());

        let report = run(&mut store, &some_records());
        assert_eq!(1, report.preserved_rows);
        assert_eq!(0, store.write_count());
        assert_eq!(rows, store.rows());
    }

    #[test]
    fn custom_column_stays_when_a_new_column_arrives() {
        let mut rows = some_rows();
        rows[0].push("custom_col".into());
        for (row, note) in rows[1..].iter_mut().zip(["custom_1", "custom_2", "custom_3"]) {
            row.push(note.into());
        }
        let mut store = MemoryStore::from_rows("Sheet1", rows.clone());
        let records: RecordSet = some_records()
            .records()
            .iter()
            .zip(["X", "Y", "Z"])
            .map(|(record, value)| {
                let mut record = record.clone();
                record.insert("new_col", value);
                record
            })
            .collect();

        let report = run(&mut store, &records);
        assert_eq!(report.new_columns, ["new_col"]);
        let mut expected = rows;
        for (row, value) in expected.iter_mut().zip(["new_col", "X", "Y", "Z"]) {
            row.push(value.into());
        }
        assert_eq!(expected, store.rows());
        assert_eq!(TableOutcome::Created(table(5, 4)), report.table);
    }

    #[test]
    fn leftovers_below_the_data_do_not_leak_into_new_rows() {
        let mut store = MemoryStore::from_rows(
            "Sheet1",
            vec![
                vec!["id".into(), "name".into(), "value".into()],
                vec![1.into(), "A".into(), 10.into()],
                vec![CellValue::Empty, "note".into(), 999.into()],
            ],
        );
        let records = RecordSet::new(vec![
            record(&[("id", 1.into()), ("name", "A".into()), ("value", CellValue::Empty)]),
            record(&[("id", 2.into()), ("name", "B".into()), ("value", CellValue::Empty)]),
        ]);
        run(&mut store, &records);
        assert_eq!(
            vec![CellValue::from(2), "B".into(), CellValue::Empty],
            store.rows()[2]
        );

        let report = run(&mut store, &records);
        assert_eq!(0, report.cells_written);
        assert_eq!(0, report.updated_rows);
    }

    #[test]
    fn unnamed_column_next_to_headers_is_not_overwritten() {
        let rows = vec![
            vec![CellValue::from("id"), "name".into(), CellValue::Empty],
            vec![1.into(), "A".into(), "hand note".into()],
        ];
        let mut store = MemoryStore::from_rows("Sheet1", rows.clone());
        let records = RecordSet::new(vec![record(&[
            ("id", 1.into()),
            ("name", "A".into()),
            ("new_col", "X".into()),
        ])]);

        for _ in 0..2 {
            let report = run(&mut store, &records);
            assert!(report.new_columns.is_empty());
            assert_eq!(report.skipped_columns, ["new_col"]);
            assert_eq!(0, report.backfilled_rows);
            assert_eq!(rows, store.rows());
        }
    }

    #[test]
    fn new_column_is_appended_and_backfilled() {
        let mut store = MemoryStore::from_rows("Sheet1", some_rows());
        store.add_table(table(3, 4));
        let records: RecordSet = some_records()
            .records()
            .iter()
            .zip(["x", "y", "z"])
            .map(|(record, category)| {
                let mut record = record.clone();
                record.insert("category", category);
                record
            })
            .collect();
        let report = run(&mut store, &records);
        assert_eq!(report.new_columns, ["category"]);
        assert_eq!(3, report.backfilled_rows);
        assert_eq!(
            vec![
                CellValue::from("category"),
                "x".into(),
                "y".into(),
                "z".into()
            ],
            store
                .rows()
                .iter()
                .map(|row| row[3].clone())
                .collect::<Vec<_>>()
        );
        // Column extent of an existing table is left alone
        assert_eq!(TableOutcome::Unchanged(table(3, 4)), report.table);
    }

    #[test]
    fn deleted_row_is_appended_again() {
        let mut store = MemoryStore::new("Sheet1");
        run(&mut store, &some_records());
        store.delete_row(3);

        let report = run(&mut store, &some_records());
        assert_eq!(1, report.appended_rows);
        assert_eq!(
            vec![
                vec![CellValue::from("id"), "name".into(), "value".into()],
                vec![1.into(), "A".into(), 10.into()],
                vec![3.into(), "C".into(), 30.into()],
                vec![2.into(), "B".into(), 20.into()],
            ],
            store.rows()
        );
    }

    #[test]
    fn deleted_column_is_appended_again() {
        let mut store = MemoryStore::new("Sheet1");
        run(&mut store, &some_records());
        store.delete_column(2);

        run(&mut store, &some_records());
        assert_eq!(
            vec![
                vec![CellValue::from("id"), "value".into(), "name".into()],
                vec![1.into(), 10.into(), "A".into()],
                vec![2.into(), 20.into(), "B".into()],
                vec![3.into(), 30.into(), "C".into()],
            ],
            store.rows()
        );
    }

    #[test]
    fn subset_of_columns_keeps_the_rest() {
        let mut store = MemoryStore::from_rows("Sheet1", some_rows());
        let records = RecordSet::new(vec![
            record(&[("id", 1.into()), ("value", 11.into())]),
            record(&[("id", 2.into()), ("value", 20.into())]),
        ]);
        run(&mut store, &records);
        let mut expected = some_rows();
        expected[1][2] = 11.into();
        assert_eq!(expected, store.rows());
    }

    #[test]
    fn column_order_of_records_does_not_matter() {
        let mut store = MemoryStore::from_rows("Sheet1", some_rows());
        let records = RecordSet::new(vec![
            record(&[("value", 10.into()), ("name", "A".into()), ("id", 1.into())]),
            record(&[("value", 50.into()), ("name", "E".into()), ("id", 5.into())]),
        ]);
        run(&mut store, &records);
        let rows = store.rows();
        assert_eq!(some_rows()[0], rows[0]);
        assert_eq!(vec![CellValue::from(5), "E".into(), 50.into()], rows[4]);
    }

    #[test]
    fn distant_content_survives() {
        let mut store = MemoryStore::from_rows("Sheet1", some_rows());
        store
            .set_cell(CellRef::new(10, 10), &"distant_value".into())
            .unwrap();
        let mut records = some_records().records().to_vec();
        records.push(record(&[("id", 4.into()), ("name", "D".into())]));
        run(&mut store, &records.into_iter().collect());
        assert_eq!(
            CellValue::from("distant_value"),
            store.cell(CellRef::new(10, 10))
        );
    }

    #[test]
    fn header_only_sheet() {
        let mut store = MemoryStore::from_rows("Sheet1", vec![some_rows()[0].clone()]);
        let report = run(&mut store, &some_records());
        assert_eq!(3, report.appended_rows);
        assert_eq!(some_rows(), store.rows());
    }

    #[test]
    fn without_key_everything_is_appended() {
        let mut store = MemoryStore::from_rows("Sheet1", some_rows());
        let report = upsert(
            &mut store,
            &some_records(),
            &UpsertOptions::default(),
            &mut RetryImmediately::default(),
        )
        .unwrap();
        assert_eq!(3, report.appended_rows);
        assert_eq!(7, store.rows().len());
        assert_eq!(TableOutcome::Created(table(3, 7)), report.table);
    }

    #[test]
    fn sheet_without_headers_accepts_any_key() {
        let mut store = MemoryStore::new("Sheet1");
        let records = RecordSet::new(vec![record(&[("uuid", "a".into()), ("n", 1.into())])]);
        let report = upsert(
            &mut store,
            &records,
            &UpsertOptions::with_key("uuid"),
            &mut RetryImmediately::default(),
        )
        .unwrap();
        assert_eq!(1, report.appended_rows);
    }

    #[test]
    fn key_missing_from_headers_writes_nothing() {
        let mut store = MemoryStore::from_rows(
            "Sheet1",
            vec![
                vec!["other_id".into(), "data".into()],
                vec![1.into(), "X".into()],
            ],
        );
        let err = upsert(
            &mut store,
            &some_records(),
            &UpsertOptions::with_key("id"),
            &mut RetryImmediately::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("'id'"));
        assert!(matches!(
            err.downcast_ref::<UpsertError>(),
            Some(UpsertError::Schema { .. })
        ));
        assert_eq!(0, store.write_count());
        assert_eq!(0, store.commit_count());
    }

    #[test]
    fn invalid_input() {
        let mut store = MemoryStore::new("Sheet1");
        let mut resolver = RetryImmediately::default();

        let err = upsert(
            &mut store,
            &RecordSet::default(),
            &UpsertOptions::with_key("id"),
            &mut resolver,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpsertError>(),
            Some(UpsertError::InvalidInput(_))
        ));

        let err = upsert(
            &mut store,
            &some_records(),
            &UpsertOptions::with_key("  "),
            &mut resolver,
        )
        .unwrap_err();
        assert_eq!("Invalid input: The key column name is empty", err.to_string());
        assert_eq!(0, store.write_count());
    }

    #[test]
    fn locked_sheet_is_retried() {
        let mut store = MemoryStore::new("Sheet1");
        store.lock_for_next_commits(2);
        let mut resolver = RetryImmediately::default();
        upsert(
            &mut store,
            &some_records(),
            &UpsertOptions::with_key("id"),
            &mut resolver,
        )
        .unwrap();
        assert_eq!(2, resolver.conflicts);
        assert_eq!(2, store.commit_count());
    }

    #[test]
    fn resolver_error_aborts() {
        struct Refuse;
        impl ConflictResolver for Refuse {
            fn resolve_conflict(&mut self, _location: &str) -> Result<()> {
                bail!("No terminal")
            }
        }

        let mut store = MemoryStore::new("Sheet1");
        store.lock_for_next_commits(1);
        let err = upsert(
            &mut store,
            &some_records(),
            &UpsertOptions::with_key("id"),
            &mut Refuse,
        )
        .unwrap_err();
        assert_eq!(
            "12 cell writes to sheet 'Sheet1' were not saved (3 new rows, 0 updated rows, 3 new columns)",
            err.to_string()
        );
        assert_eq!("No terminal", err.root_cause().to_string());
        assert_eq!(0, store.commit_count());
    }

    #[test]
    fn table_overlap_does_not_block_data() {
        let mut store = MemoryStore::new("Sheet1");
        store.add_table(TableRegion {
            name: "Other".to_string(),
            first_col: 2,
            first_row: 3,
            last_col: 4,
            last_row: 6,
        });
        let report = run(&mut store, &some_records());
        assert_eq!(
            TableOutcome::SkippedOverlap {
                with: "Other".to_string()
            },
            report.table
        );
        assert_eq!(some_rows(), store.rows());
        assert_eq!(2, store.commit_count());
    }
}
