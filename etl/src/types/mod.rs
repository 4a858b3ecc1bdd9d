//! Common types used throughout the extraction engine.

mod endpoint;
mod record;
mod session;
mod table_row;

pub use endpoint::*;
pub use record::*;
pub use session::*;
pub use table_row::*;

pub use postgres::schema::TableName;
