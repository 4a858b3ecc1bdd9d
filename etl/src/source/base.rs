use std::future::Future;

use crate::error::EtlResult;

/// One page request against an endpoint, with its query parameters in the order they are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub endpoint: String,
    pub page: u32,
    pub query: Vec<(String, String)>,
}

impl PageRequest {
    /// Creates a request for `page` of `endpoint`, carrying only the `page` parameter.
    pub fn new(endpoint: impl Into<String>, page: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            page,
            query: vec![("page".to_string(), page.to_string())],
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Returns the value of a query parameter, if present.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Remote API returning one raw payload per page request.
///
/// Implementations report transport and status failures through [`crate::error::ErrorKind`] so
/// callers can tell transient failures from permanent ones with
/// [`crate::error::ErrorKind::is_transient`].
pub trait PageSource {
    /// Fetches one page and returns the response body as text.
    fn fetch_page(&self, request: &PageRequest) -> impl Future<Output = EtlResult<String>> + Send;
}
