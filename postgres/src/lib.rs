//! Postgres helpers shared by the extraction engine and its tests.

pub mod db;
pub mod schema;
#[cfg(feature = "test-utils")]
pub mod test_utils;
