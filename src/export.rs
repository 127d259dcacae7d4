use anyhow::{Context as _, Result};
use console::{style, Term};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::records::RecordSet;

// Spreadsheet programs only detect utf-8 in a csv file if it starts with a byte order mark
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Header row first, then one line per record. Missing values are empty fields.
pub fn write_csv(records: &RecordSet, mut output: impl Write) -> Result<()> {
    output.write_all(UTF8_BOM)?;
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(records.columns())?;
    for record in records.records() {
        writer.write_record(
            records
                .columns()
                .iter()
                .map(|column| record.value(column).to_string()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_csv(records: &RecordSet, path: &Path) -> Result<()> {
    log::info!("Writing {}...", path.display());
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(records, BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Writing {}...done", path.display());
    Ok(())
}

/// Column names, then one tab separated line per record.
pub fn show(records: &RecordSet, term: &Term) -> Result<()> {
    term.write_line(&format!(
        "{}",
        style(format!("{} columns", records.columns().len()))
            .bold()
            .underlined()
    ))?;
    for column in records.columns() {
        term.write_line(&format!("  {}", style(column).cyan()))?;
    }
    term.write_line(&format!(
        "{}",
        style(format!("{} records", records.len())).bold().underlined()
    ))?;
    for record in records.records() {
        let line = records
            .columns()
            .iter()
            .map(|column| record.value(column).to_string())
            .collect::<Vec<_>>()
            .join("\t");
        term.write_line(&line)?;
    }
    Ok(())
}
