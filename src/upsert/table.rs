use anyhow::Result;
use std::fmt::{self, Display};

use super::{Extent, FIRST_COLUMN, HEADER_ROW};
use crate::store::{CellRef, SheetStore, TableRegion};

/// What the table-range manager did. Everything except [TableOutcome::Created],
/// [TableOutcome::Resized] and [TableOutcome::Unchanged] was logged as a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Created(TableRegion),
    Resized(TableRegion),
    Unchanged(TableRegion),
    /// The data is too small for a table, it needs a header and at least one row and two columns.
    SkippedDegenerate,
    SkippedOverlap { with: String },
    /// The name is used by a table on another sheet of the same workbook.
    SkippedNameTaken,
    /// The store rejected the table. The data writes were kept.
    Failed(String),
}

impl Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOutcome::Created(region) => write!(f, "created {region}"),
            TableOutcome::Resized(region) => write!(f, "resized {region}"),
            TableOutcome::Unchanged(region) => write!(f, "unchanged {region}"),
            TableOutcome::SkippedDegenerate => write!(f, "skipped, not enough data"),
            TableOutcome::SkippedOverlap { with } => {
                write!(f, "skipped, would overlap table {with}")
            }
            TableOutcome::SkippedNameTaken => {
                write!(f, "skipped, name is used on another sheet")
            }
            TableOutcome::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

fn anchor() -> CellRef {
    CellRef::new(FIRST_COLUMN, HEADER_ROW)
}

/// Make the table called `name` cover the managed data.
///
/// An existing table keeps its anchor and columns, only its last row follows the data. If
/// there's no table by that name but one starts at `A1`, that one is taken over instead.
pub fn manage_table(
    store: &mut impl SheetStore,
    name: &str,
    extent: Extent,
) -> Result<TableOutcome> {
    let tables = store.tables();
    if let Some(existing) = tables.iter().find(|table| table.name == name) {
        return resize(store, existing, &tables, extent);
    }
    if let Some(anchored) = tables.iter().find(|table| table.is_anchored_at(anchor())) {
        log::warn!(
            "No table named {name} on sheet '{}', using table {} at {} instead",
            store.sheet_name(),
            anchored.name,
            anchor(),
        );
        return resize(store, anchored, &tables, extent);
    }
    create(store, name, &tables, extent)
}

fn resize(
    store: &mut impl SheetStore,
    existing: &TableRegion,
    tables: &[TableRegion],
    extent: Extent,
) -> Result<TableOutcome> {
    let target = existing.with_last_row(extent.last_row);
    if target.row_count() < 2 {
        log::warn!("Not resizing table {existing}, it would have no data rows");
        return Ok(TableOutcome::SkippedDegenerate);
    }
    if &target == existing {
        log::debug!("Table {existing} already covers the data");
        return Ok(TableOutcome::Unchanged(target));
    }
    if let Some(other) = first_overlap(&target, tables, Some(&existing.name)) {
        log::warn!("Not resizing table {existing} to {target}, it would overlap table {other}");
        return Ok(TableOutcome::SkippedOverlap {
            with: other.name.clone(),
        });
    }
    log::info!("Resizing table {existing} to {target}");
    store.resize_table(&existing.name, target.last_row)?;
    Ok(TableOutcome::Resized(target))
}

fn create(
    store: &mut impl SheetStore,
    name: &str,
    tables: &[TableRegion],
    extent: Extent,
) -> Result<TableOutcome> {
    let target = TableRegion {
        name: name.to_string(),
        first_col: FIRST_COLUMN,
        first_row: HEADER_ROW,
        last_col: extent.last_col,
        last_row: extent.last_row,
    };
    if target.column_count() < 2 || target.row_count() < 2 {
        log::warn!("Not creating table {target}, a table needs at least 2 columns and 2 rows");
        return Ok(TableOutcome::SkippedDegenerate);
    }
    if let Some(other) = first_overlap(&target, tables, None) {
        log::warn!("Not creating table {target}, it would overlap table {other}");
        return Ok(TableOutcome::SkippedOverlap {
            with: other.name.clone(),
        });
    }
    if store
        .foreign_table_names()
        .iter()
        .any(|foreign| foreign.eq_ignore_ascii_case(name))
    {
        log::warn!(
            "Not creating table {target}, another sheet of the workbook already has a table named {name}"
        );
        return Ok(TableOutcome::SkippedNameTaken);
    }
    log::info!("Creating table {target}");
    store.create_table(&target)?;
    Ok(TableOutcome::Created(target))
}

fn first_overlap<'a>(
    target: &TableRegion,
    tables: &'a [TableRegion],
    except: Option<&str>,
) -> Option<&'a TableRegion> {
    tables
        .iter()
        .filter(|table| Some(table.name.as_str()) != except)
        .find(|table| table.overlaps(target))
}
