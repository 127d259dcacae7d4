//! Storage backends for the sheet the upsert engine manages.
//!
//! The engine only talks to a [SheetStore]: cell reads and writes on one sheet, the table
//! objects on that sheet, and a commit that persists everything. [XlsxStore] keeps a whole
//! xlsx workbook in memory, [MemoryStore] is a plain map used to test the engine.

use std::fmt::{self, Display};
use thiserror::Error;

use crate::records::CellValue;

mod memory;
mod xlsx;

pub use memory::MemoryStore;
pub use xlsx::XlsxStore;

/// 1-based cell coordinates, `A1` is `col: 1, row: 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    // Row first so cells sort in reading order
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }
}

impl Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row)
    }
}

/// `1 -> A`, `26 -> Z`, `27 -> AA`
pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let remainder = (col - 1) % 26;
        letters.push(char::from(b'A' + remainder as u8));
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A named table object covering a rectangle of the sheet, bounds inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRegion {
    pub name: String,
    pub first_col: u32,
    pub first_row: u32,
    pub last_col: u32,
    pub last_row: u32,
}

impl TableRegion {
    pub fn column_count(&self) -> u32 {
        (self.last_col + 1).saturating_sub(self.first_col)
    }

    pub fn row_count(&self) -> u32 {
        (self.last_row + 1).saturating_sub(self.first_row)
    }

    pub fn is_anchored_at(&self, cell: CellRef) -> bool {
        self.first_col == cell.col && self.first_row == cell.row
    }

    /// Two regions overlap iff both their column and their row intervals intersect.
    pub fn overlaps(&self, other: &TableRegion) -> bool {
        intervals_intersect(
            (self.first_col, self.last_col),
            (other.first_col, other.last_col),
        ) && intervals_intersect(
            (self.first_row, self.last_row),
            (other.first_row, other.last_row),
        )
    }

    pub fn with_last_row(&self, last_row: u32) -> Self {
        Self {
            last_row,
            ..self.clone()
        }
    }
}

impl Display for TableRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{})",
            self.name,
            CellRef::new(self.first_col, self.first_row),
            CellRef::new(self.last_col, self.last_row),
        )
    }
}

fn intervals_intersect(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

#[derive(Debug, Error)]
pub enum CommitError {
    /// Another process holds the target open. Retrying after it's closed can succeed.
    #[error("{location} is opened by another process")]
    Locked { location: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub trait SheetStore {
    /// Name of the managed sheet, for messages.
    fn sheet_name(&self) -> &str;

    /// Value of a cell in the managed sheet. Cells that were never written, and all cells of
    /// a sheet that doesn't exist yet, are [CellValue::Empty].
    fn cell(&self, cell: CellRef) -> CellValue;

    /// Writing [CellValue::Empty] clears the cell.
    fn set_cell(&mut self, cell: CellRef, value: &CellValue) -> anyhow::Result<()>;

    /// Tables on the managed sheet.
    fn tables(&self) -> Vec<TableRegion>;

    /// Names of the tables on all other sheets of the same workbook.
    fn foreign_table_names(&self) -> Vec<String>;

    /// Create a table. Its column names are taken from the first row of the region.
    fn create_table(&mut self, region: &TableRegion) -> anyhow::Result<()>;

    /// Move the last row of an existing table. Anchor and columns stay as they are.
    fn resize_table(&mut self, name: &str, last_row: u32) -> anyhow::Result<()>;

    fn commit(&mut self) -> Result<(), CommitError>;
}
