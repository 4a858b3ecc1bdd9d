//! Typed persistence of record batches.

pub mod coerce;
pub mod loader;

pub use coerce::{coerce_cell, parse_timestamp};
pub use loader::{LoadSummary, Loader, to_table_rows};
