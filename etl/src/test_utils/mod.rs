//! Testing utilities for extraction runs.
//!
//! - [`source`] provides [`source::ScriptedSource`], a [`crate::source::PageSource`] answering
//!   from a closure while recording every request and the peak number of requests in flight.
//! - [`fixtures`] builds XML pages and endpoint descriptors shaped like the real API.
//! - [`database`] creates throwaway Postgres databases from `TESTS_DATABASE_*` variables.

pub mod database;
pub mod fixtures;
pub mod source;
