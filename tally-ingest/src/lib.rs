//! tally-ingest: delimited transaction exports in, enriched tables out.

pub mod loader;
pub mod writer;

pub use loader::{load_many, load_transactions, read_transactions};
pub use writer::{AppendedColumns, write_enriched, write_enriched_to, write_table};
