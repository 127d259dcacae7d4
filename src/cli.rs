use anyhow::{Context as _, Result};
use console::{style, StyledObject, Term};
use std::collections::HashSet;
use std::path::Path;

use crate::args::{Args, Command, CsvArgs, RecordArgs, XlsxArgs};
use crate::export;
use crate::records::{self, FlattenOptions, RecordSet};
use crate::store::XlsxStore;
use crate::terminal::{label_width, BulletPointPrinter, LineWriter, PromptConflictResolver};
use crate::upsert::{self, TableOutcome, UpsertOptions, UpsertReport};

pub fn main(args: Args) -> Result<()> {
    match args.command {
        Command::Xlsx(args) => main_xlsx(args),
        Command::Csv(args) => main_csv(args),
        Command::Show(args) => main_show(args),
    }
}

fn main_xlsx(args: XlsxArgs) -> Result<()> {
    let records = load_records(&args.records)?;
    let options = UpsertOptions {
        key_column: (!args.append_only).then(|| args.key.clone()),
        table_name: args.table_name.clone(),
    };
    let mut store = XlsxStore::open(&args.output, &args.sheet)?;
    let report = upsert::upsert(&mut store, &records, &options, &mut PromptConflictResolver)
        .with_context(|| format!("Failed to update {}", args.output.display()))?;

    println!(
        "{}",
        style_header(&format!("{} [{}]:", args.output.display(), args.sheet))
    );
    print_report(&BulletPointPrinter::new_stdout(), &report);
    Ok(())
}

fn main_csv(args: CsvArgs) -> Result<()> {
    let records = load_records(&args.records)?;
    export::save_csv(&records, &args.output)?;
    println!(
        "{} {}",
        style_header(&format!("{}:", args.output.display())),
        style(format!("{} records", records.len())).green()
    );
    Ok(())
}

fn main_show(args: RecordArgs) -> Result<()> {
    let records = load_records(&args)?;
    export::show(&records, &Term::stdout())
}

/// Read the JSON document and turn it into the record set that gets exported.
pub fn load_records(args: &RecordArgs) -> Result<RecordSet> {
    let document = read_document(&args.input)?;
    let options = FlattenOptions {
        records_field: args.records_field.clone(),
        unwrap_field: args.unwrap_field.clone(),
        skip: args.skip.iter().cloned().collect::<HashSet<_>>(),
    };
    let mut flat = records::flatten_document(&document, &options)
        .with_context(|| format!("Failed to read records from {}", args.input.display()))?;

    if let Some(source) = &args.derive_dates_from {
        let derived = flat
            .iter_mut()
            .map(|record| records::derive_date_columns(record, source))
            .filter(|derived| *derived)
            .count();
        if derived < flat.len() {
            log::warn!(
                "Derived dates for {derived} of {} records, the others have no valid '{source}'",
                flat.len()
            );
        }
    }

    let records = RecordSet::new(flat);
    if args.header.is_empty() {
        return Ok(records);
    }
    records::project(&records, &args.header, args.ignore_missing)
}

fn read_document(path: &Path) -> Result<serde_json::Value> {
    log::info!("Loading {}...", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;
    log::info!("Loading {}...done", path.display());
    Ok(document)
}

fn print_report<W: LineWriter + Clone>(printer: &BulletPointPrinter<W>, report: &UpsertReport) {
    let labels = [
        "New columns",
        "Skipped columns",
        "Appended rows",
        "Updated rows",
        "Backfilled rows",
        "Kept rows",
        "Cells written",
        "Table",
    ];
    let width = label_width(labels);
    let new_columns = if report.new_columns.is_empty() {
        "(none)".to_string()
    } else {
        report.new_columns.join(", ")
    };
    printer.print_entry(labels[0], style(new_columns).magenta(), width);
    if !report.skipped_columns.is_empty() {
        printer.print_entry(
            labels[1],
            style(report.skipped_columns.join(", ")).yellow(),
            width,
        );
    }
    printer.print_entry(labels[2], style_count(report.appended_rows), width);
    printer.print_entry(labels[3], style_count(report.updated_rows), width);
    printer.print_entry(labels[4], style_count(report.backfilled_rows), width);
    printer.print_entry(labels[5], style_count(report.preserved_rows), width);
    printer.print_entry(labels[6], style_count(report.cells_written), width);
    printer.print_entry(labels[7], style_table(&report.table), width);
}

fn style_header(header: &str) -> StyledObject<&str> {
    style(header).bold().underlined()
}

fn style_count(count: usize) -> StyledObject<usize> {
    let result = style(count).bold();
    if count == 0 {
        result.dim()
    } else {
        result.green()
    }
}

fn style_table(outcome: &TableOutcome) -> StyledObject<String> {
    let result = style(outcome.to_string());
    match outcome {
        TableOutcome::Created(_) | TableOutcome::Resized(_) => result.green(),
        TableOutcome::Unchanged(_) => result.dim(),
        TableOutcome::SkippedDegenerate
        | TableOutcome::SkippedOverlap { .. }
        | TableOutcome::SkippedNameTaken => result.yellow(),
        TableOutcome::Failed(_) => result.red(),
    }
}
