//! Conversion of raw page payloads into flat record batches.
//!
//! A page is expected to look like `response → {plural} → {singular}*`. Anything else is
//! skipped with a [`SkipReason`] instead of failing the session.

use std::fmt;

use tracing::warn;

use crate::types::{EndpointDescriptor, RecordBatch};

pub mod flatten;
pub mod xml;

pub use flatten::{flatten_item, sanitize_column_name};
pub use xml::{XmlDocument, XmlNode, parse_document};

/// Name of the root element of every API response.
pub const RESPONSE_ROOT: &str = "response";

/// Why a page contributed no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The payload is not well-formed XML.
    MalformedXml(String),
    /// The root element is not `response`.
    MissingResponse,
    /// The plural or singular wrapper is missing, or holds no item.
    NoItems,
    /// The items are not elements.
    UnexpectedShape,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MalformedXml(detail) => write!(f, "malformed xml: {detail}"),
            SkipReason::MissingResponse => f.write_str("missing response root"),
            SkipReason::NoItems => f.write_str("no items"),
            SkipReason::UnexpectedShape => f.write_str("unexpected item shape"),
        }
    }
}

/// Result of normalizing one page.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Batch(RecordBatch),
    Skipped(SkipReason),
}

/// Normalizes one page payload of `endpoint` into a record batch.
pub fn normalize_page(text: &str, endpoint: &EndpointDescriptor) -> Normalized {
    let document = match parse_document(text) {
        Ok(document) => document,
        Err(err) => {
            warn!(endpoint = %endpoint.name, error = %err, "skipping malformed page payload");
            return Normalized::Skipped(SkipReason::MalformedXml(err.to_string()));
        }
    };

    if document.root_name != RESPONSE_ROOT {
        return Normalized::Skipped(SkipReason::MissingResponse);
    }

    let Some(items) = document
        .root
        .get(&endpoint.plural_key)
        .and_then(|wrapper| wrapper.get(&endpoint.singular_key))
    else {
        return Normalized::Skipped(SkipReason::NoItems);
    };

    let records = match items {
        XmlNode::Element(item) => vec![flatten_item(item)],
        XmlNode::List(items) => {
            let mut records = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    XmlNode::Element(item) => records.push(flatten_item(item)),
                    XmlNode::Empty => {}
                    XmlNode::Text(_) | XmlNode::List(_) => {
                        return Normalized::Skipped(SkipReason::UnexpectedShape);
                    }
                }
            }
            records
        }
        XmlNode::Empty => Vec::new(),
        XmlNode::Text(_) => return Normalized::Skipped(SkipReason::UnexpectedShape),
    };

    if records.is_empty() {
        return Normalized::Skipped(SkipReason::NoItems);
    }

    Normalized::Batch(RecordBatch::from_records(records))
}
