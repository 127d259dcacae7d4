use anyhow::{anyhow, ensure, Result};
use std::collections::BTreeMap;

use super::{CellRef, CommitError, SheetStore, TableRegion};
use crate::records::CellValue;

/// A sheet held in a map. Counts writes and commits, and can simulate a locked file.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sheet_name: String,
    cells: BTreeMap<CellRef, CellValue>,
    tables: Vec<TableRegion>,
    foreign_table_names: Vec<String>,
    write_count: usize,
    commit_count: usize,
    pending_lock_conflicts: usize,
}

impl MemoryStore {
    pub fn new(sheet_name: &str) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            ..Self::default()
        }
    }

    /// A sheet pre-filled from a grid, starting at `A1`. Doesn't count as writes.
    pub fn from_rows(sheet_name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        let mut store = Self::new(sheet_name);
        for (row, values) in (1..).zip(rows) {
            for (col, value) in (1..).zip(values) {
                if !value.is_empty() {
                    store.cells.insert(CellRef::new(col, row), value);
                }
            }
        }
        store
    }

    /// The used range as a dense grid from `A1` to the last non-empty row and column.
    pub fn rows(&self) -> Vec<Vec<CellValue>> {
        let last_row = self.cells.keys().map(|cell| cell.row).max().unwrap_or(0);
        let last_col = self.cells.keys().map(|cell| cell.col).max().unwrap_or(0);
        (1..=last_row)
            .map(|row| {
                (1..=last_col)
                    .map(|col| self.cell(CellRef::new(col, row)))
                    .collect()
            })
            .collect()
    }

    /// Number of [SheetStore::set_cell] calls so far.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    /// Make the next `count` commits fail as if another process had the file open.
    pub fn lock_for_next_commits(&mut self, count: usize) {
        self.pending_lock_conflicts = count;
    }

    pub fn add_table(&mut self, region: TableRegion) {
        self.tables.push(region);
    }

    pub fn add_foreign_table_name(&mut self, name: &str) {
        self.foreign_table_names.push(name.to_string());
    }

    /// Remove a row and shift everything below it up, the way a user deleting a row would.
    pub fn delete_row(&mut self, row: u32) {
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .filter(|(cell, _)| cell.row != row)
            .map(|(cell, value)| {
                if cell.row > row {
                    (CellRef::new(cell.col, cell.row - 1), value)
                } else {
                    (cell, value)
                }
            })
            .collect();
    }

    /// Remove a column and shift everything right of it to the left.
    pub fn delete_column(&mut self, col: u32) {
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .filter(|(cell, _)| cell.col != col)
            .map(|(cell, value)| {
                if cell.col > col {
                    (CellRef::new(cell.col - 1, cell.row), value)
                } else {
                    (cell, value)
                }
            })
            .collect();
    }
}

impl SheetStore for MemoryStore {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn cell(&self, cell: CellRef) -> CellValue {
        self.cells.get(&cell).cloned().unwrap_or(CellValue::Empty)
    }

    fn set_cell(&mut self, cell: CellRef, value: &CellValue) -> Result<()> {
        self.write_count += 1;
        if value.is_empty() {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, value.clone());
        }
        Ok(())
    }

    fn tables(&self) -> Vec<TableRegion> {
        self.tables.clone()
    }

    fn foreign_table_names(&self) -> Vec<String> {
        self.foreign_table_names.clone()
    }

    fn create_table(&mut self, region: &TableRegion) -> Result<()> {
        ensure!(
            self.tables.iter().all(|table| table.name != region.name),
            "Table {} already exists",
            region.name
        );
        self.tables.push(region.clone());
        Ok(())
    }

    fn resize_table(&mut self, name: &str, last_row: u32) -> Result<()> {
        let table = self
            .tables
            .iter_mut()
            .find(|table| table.name == name)
            .ok_or_else(|| anyhow!("Table {name} not found"))?;
        table.last_row = last_row;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CommitError> {
        if self.pending_lock_conflicts > 0 {
            self.pending_lock_conflicts -= 1;
            return Err(CommitError::Locked {
                location: format!("sheet '{}'", self.sheet_name),
            });
        }
        self.commit_count += 1;
        Ok(())
    }
}
