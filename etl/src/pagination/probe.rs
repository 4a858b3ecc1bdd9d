use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::normalize::{RESPONSE_ROOT, XmlNode, parse_document};
use crate::types::EndpointDescriptor;

/// Name of the attribute or child element reporting the number of pages.
const PAGE_COUNT_KEY: &str = "page_count";

/// What a single probe request revealed about the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePage {
    /// Page count reported by the server on the plural wrapper, if any.
    pub page_count: Option<u32>,
    /// Whether the page holds at least one item.
    pub has_items: bool,
}

impl ProbePage {
    pub fn empty() -> Self {
        Self {
            page_count: None,
            has_items: false,
        }
    }
}

/// Inspects a probe payload without flattening its items.
///
/// A payload that is not XML or whose root is not `response` fails, since a page count cannot
/// be derived from it. A missing plural wrapper means the page is empty.
pub fn inspect_probe(text: &str, endpoint: &EndpointDescriptor) -> EtlResult<ProbePage> {
    let document = parse_document(text)?;

    if document.root_name != RESPONSE_ROOT {
        bail!(
            ErrorKind::MalformedPayload,
            "Probe response has no response root",
            format!("endpoint {} returned <{}>", endpoint.name, document.root_name)
        );
    }

    let Some(wrapper) = document.root.get(&endpoint.plural_key) else {
        return Ok(ProbePage::empty());
    };

    let page_count = match reported_page_count(wrapper) {
        Some(value) => match value.trim().parse::<u32>() {
            Ok(count) => Some(count),
            Err(err) => bail!(
                ErrorKind::MalformedPayload,
                "Probe response has an invalid page count",
                format!("endpoint {} reported `{value}`", endpoint.name),
                source: err
            ),
        },
        None => None,
    };

    let has_items = match wrapper.get(&endpoint.singular_key) {
        None | Some(XmlNode::Empty) => false,
        Some(_) => true,
    };

    Ok(ProbePage {
        page_count,
        has_items,
    })
}

fn reported_page_count(wrapper: &XmlNode) -> Option<&str> {
    wrapper
        .get(&format!("@{PAGE_COUNT_KEY}"))
        .or_else(|| wrapper.get(PAGE_COUNT_KEY))
        .and_then(XmlNode::as_text)
}
