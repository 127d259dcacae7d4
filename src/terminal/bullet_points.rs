use console::{measure_text_width, pad_str, Alignment};
use std::fmt::Display;

const INDENT_SIZE: usize = 2;

/// Prints nested bullet point lists like
///
/// ```text
/// • Sheet1
///   • Rows appended: 3
/// ```
pub struct BulletPointPrinter<W: LineWriter + Clone> {
    writer: W,
    nesting: usize,
}

impl<W: LineWriter + Clone> BulletPointPrinter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, nesting: 0 }
    }

    pub fn print_item(&self, message: impl Display) {
        let indent = " ".repeat(self.nesting * INDENT_SIZE);
        self.writer.write_line(&format!("{indent}• {message}"));
    }

    /// `label: value`, with the values of consecutive entries lined up at `label_width`.
    pub fn print_entry(&self, label: impl Display, value: impl Display, label_width: usize) {
        let label = format!("{label}:");
        self.print_item(format!(
            "{} {value}",
            pad_str(&label, label_width + 1, Alignment::Left, None)
        ));
    }

    pub fn indent(&self) -> Self {
        Self {
            writer: self.writer.clone(),
            nesting: self.nesting + 1,
        }
    }
}

impl BulletPointPrinter<StdoutLineWriter> {
    pub fn new_stdout() -> Self {
        Self::new(StdoutLineWriter)
    }
}

/// Width of the widest label, for [BulletPointPrinter::print_entry].
pub fn label_width<'a>(labels: impl IntoIterator<Item = &'a str>) -> usize {
    labels.into_iter().map(measure_text_width).max().unwrap_or(0)
}

pub trait LineWriter {
    fn write_line(&self, line: &str);
}

#[derive(Clone, Copy)]
pub struct StdoutLineWriter;
impl LineWriter for StdoutLineWriter {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}
