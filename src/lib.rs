pub mod args;
pub mod cli;
pub mod export;
pub mod records;
pub mod store;
pub mod terminal;
pub mod upsert;
