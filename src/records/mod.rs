mod dates;
mod flatten;
mod projection;
mod record;

pub use dates::derive_date_columns;
pub use flatten::{flatten, flatten_document, FlattenOptions};
pub use projection::{project, ColumnSelection};
pub use record::{CellValue, Record, RecordSet, RowKey};
