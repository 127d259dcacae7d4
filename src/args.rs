use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::records::ColumnSelection;
use crate::upsert::{DEFAULT_SHEET_NAME, DEFAULT_TABLE_NAME};

/// Export fetched money-forward records to a spreadsheet, a CSV file, or the terminal.
#[derive(Parser, Debug)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Merge the records into a sheet of an xlsx workbook, keeping manual edits
    Xlsx(XlsxArgs),

    /// Write the records to a CSV file
    Csv(CsvArgs),

    /// Print the records
    Show(RecordArgs),
}

/// Where the records come from and how they are shaped before export.
#[derive(Debug, ClapArgs)]
pub struct RecordArgs {
    /// JSON document with the fetched records
    pub input: PathBuf,

    /// Field of the document that holds the record array, if the document isn't the array itself
    #[clap(long)]
    pub records_field: Option<String>,

    /// Field of each array element that holds the actual record, e.g. user_asset_act
    #[clap(long)]
    pub unwrap_field: Option<String>,

    /// Keys to leave out, at any nesting level
    #[clap(long, num_args = 1..)]
    pub skip: Vec<String>,

    /// Timestamp column to derive date, year and month columns from, e.g. recognized_at
    #[clap(long)]
    pub derive_dates_from: Option<String>,

    /// Columns to export, in this order. `a=b` exports column a as b
    #[clap(long, num_args = 1..)]
    pub header: Vec<ColumnSelection>,

    /// Export columns given with --header that no record has as empty columns
    #[clap(long)]
    pub ignore_missing: bool,
}

#[derive(Debug, ClapArgs)]
pub struct XlsxArgs {
    #[clap(flatten)]
    pub records: RecordArgs,

    /// Workbook to update. It's created if it doesn't exist
    #[clap(long, short)]
    pub output: PathBuf,

    #[clap(long, default_value = DEFAULT_SHEET_NAME)]
    pub sheet: String,

    /// Column that identifies a record
    #[clap(long, default_value = "id")]
    pub key: String,

    /// Don't match records to existing rows, append all of them
    #[clap(long, conflicts_with = "key")]
    pub append_only: bool,

    #[clap(long, default_value = DEFAULT_TABLE_NAME)]
    pub table_name: String,
}

#[derive(Debug, ClapArgs)]
pub struct CsvArgs {
    #[clap(flatten)]
    pub records: RecordArgs,

    #[clap(long, short)]
    pub output: PathBuf,
}

pub fn parse() -> Args {
    Args::parse()
}
