use std::sync::Arc;

use crate::error::EtlResult;
use crate::source::PageRequest;
use crate::types::{ColumnSchema, ColumnType, EndpointDescriptor};

/// Builds a `messages` endpoint scoped by campaign, with an incremental key.
pub fn messages_endpoint() -> Arc<EndpointDescriptor> {
    Arc::new(EndpointDescriptor {
        name: "messages".to_string(),
        plural_key: "messages".to_string(),
        singular_key: "message".to_string(),
        api_incremental_key: Some("start_time".to_string()),
        db_incremental_key: Some("received_at".to_string()),
        columns: vec![
            ColumnSchema::new("id", ColumnType::Integer),
            ColumnSchema::new("body", ColumnType::String),
            ColumnSchema::new("received_at", ColumnType::Timestamp),
            ColumnSchema::new("campaign_id", ColumnType::String),
        ],
        page_size: None,
        paginated: true,
    })
}

/// Builds a `profiles` endpoint without incremental keys.
pub fn profiles_endpoint() -> Arc<EndpointDescriptor> {
    Arc::new(EndpointDescriptor {
        name: "profiles".to_string(),
        plural_key: "profiles".to_string(),
        singular_key: "profile".to_string(),
        api_incremental_key: None,
        db_incremental_key: None,
        columns: vec![
            ColumnSchema::new("id", ColumnType::Integer),
            ColumnSchema::new("body", ColumnType::String),
            ColumnSchema::new("received_at", ColumnType::Timestamp),
        ],
        page_size: Some(1000),
        paginated: true,
    })
}

/// Builds an unpaginated `campaigns` endpoint.
pub fn campaigns_endpoint() -> Arc<EndpointDescriptor> {
    Arc::new(EndpointDescriptor {
        name: "campaigns".to_string(),
        plural_key: "campaigns".to_string(),
        singular_key: "campaign".to_string(),
        api_incremental_key: None,
        db_incremental_key: None,
        columns: vec![
            ColumnSchema::new("id", ColumnType::String),
            ColumnSchema::new("name", ColumnType::String),
        ],
        page_size: None,
        paginated: false,
    })
}

/// Renders one item element whose fields are child elements.
pub fn item_xml(singular: &str, fields: &[(&str, String)]) -> String {
    let mut xml = format!("<{singular}>");
    for (name, value) in fields {
        xml.push_str(&format!("<{name}>{value}</{name}>"));
    }
    xml.push_str(&format!("</{singular}>"));

    xml
}

/// Renders a full response page around `items`, optionally reporting a page count.
pub fn page_xml(plural: &str, items: &[String], page_count: Option<u32>) -> String {
    let attributes = page_count
        .map(|count| format!(r#" page_count="{count}""#))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><response success="true"><{plural}{attributes}>{}</{plural}></response>"#,
        items.concat()
    )
}

/// Identifier of row `index` of `page`, unique across pages.
pub fn row_id(page: u32, index: u32) -> u32 {
    page * 1000 + index
}

/// Returns a responder for an endpoint with `total_pages` pages of `rows_per_page` rows.
///
/// Rows carry `id`, `body` and `received_at`. Pages beyond the last one are empty. When
/// `report_page_count` is set, every page reports the page count on its wrapper.
pub fn paged_responder(
    endpoint: &EndpointDescriptor,
    total_pages: u32,
    rows_per_page: u32,
    report_page_count: bool,
) -> impl Fn(&PageRequest) -> EtlResult<String> + Send + Sync + 'static {
    let plural = endpoint.plural_key.clone();
    let singular = endpoint.singular_key.clone();

    move |request: &PageRequest| {
        let items: Vec<String> = if request.page <= total_pages {
            (0..rows_per_page)
                .map(|index| {
                    item_xml(
                        &singular,
                        &[
                            ("id", row_id(request.page, index).to_string()),
                            ("body", format!("page {} row {index}", request.page)),
                            ("received_at", "2024-01-02 03:04:05 UTC".to_string()),
                        ],
                    )
                })
                .collect()
        } else {
            Vec::new()
        };

        let page_count = report_page_count.then_some(total_pages);

        Ok(page_xml(&plural, &items, page_count))
    }
}
