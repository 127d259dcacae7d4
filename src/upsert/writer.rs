use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};

use super::{SheetDiff, SheetSnapshot, FIRST_COLUMN, HEADER_ROW};
use crate::records::{CellValue, RecordSet};
use crate::store::{CellRef, SheetStore};

/// Bottom right corner of the managed data after the diff was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub last_col: u32,
    pub last_row: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub extent: Extent,
    pub cells_written: usize,
    /// New columns that weren't added because the column they would go to isn't free.
    pub skipped_columns: Vec<String>,
}

/// Column name to sheet column, for the managed headers plus the ones appended in this run.
struct ColumnPositions {
    positions: HashMap<String, u32>,
    skipped: HashSet<String>,
    next: u32,
}

impl ColumnPositions {
    fn new(headers: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (col, header) in (FIRST_COLUMN..).zip(headers) {
            positions.entry(header.clone()).or_insert(col);
        }
        Self {
            positions,
            skipped: HashSet::new(),
            next: FIRST_COLUMN + headers.len() as u32,
        }
    }

    fn append(&mut self, header: &str) -> u32 {
        let col = self.next;
        self.positions.insert(header.to_string(), col);
        self.next += 1;
        col
    }

    fn skip(&mut self, header: &str) {
        self.skipped.insert(header.to_string());
    }

    /// Position of a column, `None` if it was skipped.
    fn get(&self, header: &str) -> Result<Option<u32>> {
        if self.skipped.contains(header) {
            return Ok(None);
        }
        self.positions
            .get(header)
            .copied()
            .map(Some)
            .ok_or_else(|| anyhow!("Column '{header}' has no position in the sheet"))
    }

    fn last_col(&self) -> u32 {
        self.next - 1
    }
}

struct CountingWriter<'a, S: SheetStore> {
    store: &'a mut S,
    cells_written: usize,
}

impl<S: SheetStore> CountingWriter<'_, S> {
    fn read(&self, cell: CellRef) -> CellValue {
        self.store.cell(cell)
    }

    fn write(&mut self, cell: CellRef, value: &CellValue) -> Result<()> {
        self.store.set_cell(cell, value)?;
        self.cells_written += 1;
        Ok(())
    }

    /// Write only if the cell doesn't already hold the value.
    fn update(&mut self, cell: CellRef, value: &CellValue) -> Result<()> {
        if self.read(cell).same_as(value) {
            return Ok(());
        }
        self.write(cell, value)
    }

    /// First non-empty cell of a column between the header row and `last_row`.
    fn occupied_cell(&self, col: u32, last_row: u32) -> Option<CellRef> {
        (HEADER_ROW..=last_row)
            .map(|row| CellRef::new(col, row))
            .find(|cell| !self.read(*cell).is_empty())
    }
}

/// Apply a diff to the store's sheet.
///
/// New columns go right of the last managed header, new rows right below the last managed
/// row. Existing rows only get the cells listed in the diff. Nothing else is touched, in
/// particular no column the record set doesn't have and no row it doesn't have a key for.
///
/// A new column needs a free column next to the headers. If that column has content without a
/// header, it belongs to the user, and this and all following new columns are skipped.
pub fn apply_diff(
    store: &mut impl SheetStore,
    snapshot: &SheetSnapshot,
    diff: &SheetDiff,
    records: &RecordSet,
) -> Result<WriteSummary> {
    let mut columns = ColumnPositions::new(&snapshot.headers);
    let mut writer = CountingWriter {
        store,
        cells_written: 0,
    };

    let mut blocked = false;
    for header in &diff.new_columns {
        if !blocked {
            if let Some(cell) = writer.occupied_cell(columns.next, snapshot.last_row()) {
                log::warn!(
                    "Not adding column '{header}' or any column after it, {cell} has content but its column has no header"
                );
                blocked = true;
            }
        }
        if blocked {
            columns.skip(header);
            continue;
        }
        let col = columns.append(header);
        log::debug!("Adding column '{header}' at {}", CellRef::new(col, HEADER_ROW));
        writer.write(CellRef::new(col, HEADER_ROW), &CellValue::from(header.as_str()))?;
    }

    for change in diff.changed_rows.iter().chain(&diff.backfilled_rows) {
        let record = &records.records()[change.record];
        for column in &change.columns {
            let Some(col) = columns.get(column)? else {
                continue;
            };
            writer.write(CellRef::new(col, change.position), record.value(column))?;
        }
    }

    // The slot of a new row belongs to the record, leftovers there are overwritten or cleared
    let first_new_row = snapshot.last_row() + 1;
    for (row, &index) in (first_new_row..).zip(&diff.new_rows) {
        let record = &records.records()[index];
        for column in records.columns() {
            let Some(col) = columns.get(column)? else {
                continue;
            };
            writer.update(CellRef::new(col, row), record.value(column))?;
        }
    }

    let summary = WriteSummary {
        extent: Extent {
            last_col: columns.last_col(),
            last_row: snapshot.last_row() + diff.new_rows.len() as u32,
        },
        cells_written: writer.cells_written,
        skipped_columns: diff
            .new_columns
            .iter()
            .filter(|column| columns.skipped.contains(*column))
            .cloned()
            .collect(),
    };
    log::debug!(
        "Wrote {} cells, data now ends at {}",
        summary.cells_written,
        CellRef::new(summary.extent.last_col, summary.extent.last_row)
    );
    Ok(summary)
}
