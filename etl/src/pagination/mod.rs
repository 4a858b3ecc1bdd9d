//! Discovery of how many pages a query has.

pub mod probe;
pub mod resolver;

pub use probe::{ProbePage, inspect_probe};
pub use resolver::PageCountResolver;
