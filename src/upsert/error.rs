use thiserror::Error;

/// Problems with the input or the existing sheet that abort an upsert before anything is
/// written. None of them go away by retrying.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpsertError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Key column '{column}' not found in the header row of sheet '{sheet}'")]
    Schema { column: String, sheet: String },
}

impl UpsertError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
