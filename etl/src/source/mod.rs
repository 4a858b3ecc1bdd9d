mod base;
pub mod http;

pub use base::{PageRequest, PageSource};
