//! Extraction engine for paginated XML REST APIs.
//!
//! A run of one endpoint goes through the [`watermark`] tracker, the [`pagination`] resolver,
//! the [`fetch`] orchestrator (which runs every page through [`normalize`]) and finally the
//! [`load`]er. [`pipeline::Pipeline`] wires these together against a [`source::PageSource`]
//! and a [`destination::Destination`].

mod macros;

pub mod catalog;
pub mod concurrency;
pub mod destination;
pub mod error;
pub mod fetch;
pub mod load;
pub mod normalize;
pub mod pagination;
pub mod pipeline;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod watermark;
