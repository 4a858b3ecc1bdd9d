//! Destinations that extracted endpoints are written to.

mod base;
pub mod memory;
pub mod postgres;

pub use base::{ColumnFilter, Destination, LoadMode};
