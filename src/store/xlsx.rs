use anyhow::{anyhow, Context as _, Result};
use std::io;
use std::path::{Path, PathBuf};
use umya_spreadsheet::{Cell, Spreadsheet, Table, TableColumn, Worksheet};

use super::{CellRef, CommitError, SheetStore, TableRegion};
use crate::records::CellValue;

// Windows reports a file held open by Excel as one of these instead of PermissionDenied
const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;

/// One sheet of an xlsx workbook. The whole workbook is loaded into memory and written back
/// as a whole on commit, so other sheets and anything the engine doesn't touch survive.
pub struct XlsxStore {
    path: PathBuf,
    sheet_name: String,
    book: Spreadsheet,
}

impl XlsxStore {
    /// Load the workbook at `path`. A missing file or sheet is not an error, they are created
    /// in memory and only written on commit.
    pub fn open(path: &Path, sheet_name: &str) -> Result<Self> {
        log::info!("Loading workbook {}...", path.display());
        let exists = path
            .try_exists()
            .with_context(|| format!("Failed to access {}", path.display()))?;
        let mut book = if exists {
            umya_spreadsheet::reader::xlsx::read(path)
                .with_context(|| format!("Failed to read workbook {}", path.display()))?
        } else {
            log::info!("{} doesn't exist yet, starting a new workbook", path.display());
            umya_spreadsheet::new_file_empty_worksheet()
        };
        if book.get_sheet_by_name(sheet_name).is_none() {
            log::info!("Sheet '{sheet_name}' not found, adding it");
            book.new_sheet(sheet_name)
                .map_err(|err| anyhow!("Failed to add sheet '{sheet_name}': {err}"))?;
        }
        log::info!("Loading workbook...done");

        Ok(Self {
            path: path.to_path_buf(),
            sheet_name: sheet_name.to_string(),
            book,
        })
    }

    fn sheet(&self) -> Option<&Worksheet> {
        self.book.get_sheet_by_name(&self.sheet_name)
    }

    fn sheet_mut(&mut self) -> Result<&mut Worksheet> {
        let sheet_name = &self.sheet_name;
        self.book
            .get_sheet_by_name_mut(sheet_name)
            .ok_or_else(|| anyhow!("Sheet '{sheet_name}' not found"))
    }

    fn save(&self) -> Result<(), CommitError> {
        // First write to a temporary file so a failed write can't leave a truncated workbook behind
        let filename = self
            .path
            .file_name()
            .ok_or_else(|| anyhow!("Path has no filename"))?
            .to_str()
            .ok_or_else(|| anyhow!("Filename isn't valid utf-8"))?;
        let tmppath = self.path.with_file_name(format!("~{filename}.tmp"));
        umya_spreadsheet::writer::xlsx::write(&self.book, &tmppath)
            .with_context(|| format!("Failed to write {}", tmppath.display()))?;

        // Ok, writing succeeded, let's now replace the real file with the tmpfile
        if let Err(err) = std::fs::rename(&tmppath, &self.path) {
            if let Err(cleanup_err) = std::fs::remove_file(&tmppath) {
                log::warn!("Failed to remove {}: {cleanup_err}", tmppath.display());
            }
            if is_lock_conflict(&err) {
                return Err(CommitError::Locked {
                    location: self.path.display().to_string(),
                });
            }
            return Err(anyhow::Error::new(err)
                .context(format!("Failed to replace {}", self.path.display()))
                .into());
        }
        Ok(())
    }
}

impl SheetStore for XlsxStore {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn cell(&self, cell: CellRef) -> CellValue {
        self.sheet()
            .and_then(|sheet| sheet.get_cell((cell.col, cell.row)))
            .map(cell_value)
            .unwrap_or(CellValue::Empty)
    }

    fn set_cell(&mut self, cell: CellRef, value: &CellValue) -> Result<()> {
        let target = self.sheet_mut()?.get_cell_mut((cell.col, cell.row));
        match value {
            CellValue::Empty => {
                target.set_value_string("");
            }
            CellValue::String(text) => {
                target.set_value_string(text.as_str());
            }
            CellValue::Number(number) => {
                target.set_value_number(*number);
            }
            CellValue::Bool(flag) => {
                target.set_value_bool(*flag);
            }
        }
        Ok(())
    }

    fn tables(&self) -> Vec<TableRegion> {
        self.sheet()
            .map(|sheet| sheet.get_tables().iter().map(table_region).collect())
            .unwrap_or_default()
    }

    fn foreign_table_names(&self) -> Vec<String> {
        self.book
            .get_sheet_collection()
            .iter()
            .filter(|sheet| sheet.get_name() != self.sheet_name)
            .flat_map(|sheet| sheet.get_tables().iter())
            .map(|table| table.get_name().to_string())
            .collect()
    }

    fn create_table(&mut self, region: &TableRegion) -> Result<()> {
        let sheet = self.sheet_mut()?;
        let mut table = Table::new(
            &region.name,
            (
                (region.first_col, region.first_row),
                (region.last_col, region.last_row),
            ),
        );
        // The file format requires one column definition per column, named like its header cell
        for col in region.first_col..=region.last_col {
            let header = sheet
                .get_cell((col, region.first_row))
                .map(|cell| cell.get_value().into_owned())
                .unwrap_or_default();
            table.add_column(TableColumn::new(&header));
        }
        sheet.add_table(table);
        Ok(())
    }

    fn resize_table(&mut self, name: &str, last_row: u32) -> Result<()> {
        let table = self
            .sheet_mut()?
            .get_tables_mut()
            .iter_mut()
            .find(|table| table.get_name() == name)
            .ok_or_else(|| anyhow!("Table {name} not found"))?;
        let (first_col, first_row, last_col) = {
            let (start, end) = table.get_area();
            (
                *start.get_col_num(),
                *start.get_row_num(),
                *end.get_col_num(),
            )
        };
        table.set_area(((first_col, first_row), (last_col, last_row)));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CommitError> {
        log::info!("Saving workbook {}...", self.path.display());
        self.save()?;
        log::info!("Saving workbook...done");
        Ok(())
    }
}

fn cell_value(cell: &Cell) -> CellValue {
    let raw = cell.get_value();
    if raw.is_empty() {
        return CellValue::Empty;
    }
    match cell.get_data_type() {
        "n" => raw
            .parse()
            .map(CellValue::Number)
            .unwrap_or_else(|_| CellValue::String(raw.into_owned())),
        "b" => CellValue::Bool(raw.eq_ignore_ascii_case("true") || raw == "1"),
        _ => CellValue::String(raw.into_owned()),
    }
}

fn table_region(table: &Table) -> TableRegion {
    let (start, end) = table.get_area();
    TableRegion {
        name: table.get_name().to_string(),
        first_col: *start.get_col_num(),
        first_row: *start.get_row_num(),
        last_col: *end.get_col_num(),
        last_row: *end.get_row_num(),
    }
}

fn is_lock_conflict(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    cfg!(windows)
        && matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        )
}
