use std::collections::BTreeMap;

use crate::normalize::xml::{TEXT_KEY, XmlNode};
use crate::types::Record;

/// Column used for the text of a top-level item that also carries attributes.
const ITEM_TEXT_COLUMN: &str = "text";

/// Turns a raw flattened path into a column name.
///
/// Path separators become `_` and the attribute and text markers are dropped, so `@id` and
/// `id` land in the same column. Applying it twice gives the same name as applying it once.
pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '@' && *c != '#')
        .map(|c| if c == '.' { '_' } else { c })
        .collect()
}

/// Flattens one item element into a record keyed by sanitized column names.
///
/// Nested elements produce dotted paths before sanitizing. Lists nested in an item are kept
/// as compact JSON text in a single cell. When two paths sanitize to the same column, the
/// first one in key order wins.
pub fn flatten_item(item: &BTreeMap<String, XmlNode>) -> Record {
    let mut record = Record::new();
    for (key, child) in item {
        let path = if key == TEXT_KEY {
            ITEM_TEXT_COLUMN.to_string()
        } else {
            key.clone()
        };
        flatten_into(&path, child, &mut record);
    }

    record
}

fn flatten_into(path: &str, node: &XmlNode, record: &mut Record) {
    match node {
        XmlNode::Empty => {}
        XmlNode::Text(text) => insert_first(record, path, text.clone()),
        XmlNode::List(items) => {
            let json = XmlNode::List(items.clone()).to_json();
            insert_first(record, path, json.to_string());
        }
        XmlNode::Element(children) => {
            for (key, child) in children {
                if key == TEXT_KEY {
                    flatten_into(path, child, record);
                } else {
                    flatten_into(&format!("{path}.{key}"), child, record);
                }
            }
        }
    }
}

fn insert_first(record: &mut Record, path: &str, value: String) {
    record.entry(sanitize_column_name(path)).or_insert(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::xml::parse_document;

    fn item(xml: &str) -> BTreeMap<String, XmlNode> {
        match parse_document(xml).unwrap().root {
            XmlNode::Element(children) => children,
            other => panic!("expected an element, got {other:?}"),
        }
    }

    #[test]
    fn sanitizing_is_idempotent() {
        for name in ["@id", "profile.@id", "a.b.#text", "plain", "..@#"] {
            let once = sanitize_column_name(name);
            assert_eq!(sanitize_column_name(&once), once);
        }

        assert_eq!(sanitize_column_name("profile.@id"), "profile_id");
    }

    #[test]
    fn attributes_and_nested_elements_become_columns() {
        let record = flatten_item(&item(
            r#"<message id="9" type="reply"><body>hi</body><profile id="3"><phone>555</phone></profile></message>"#,
        ));

        assert_eq!(record.get("id").map(String::as_str), Some("9"));
        assert_eq!(record.get("type").map(String::as_str), Some("reply"));
        assert_eq!(record.get("body").map(String::as_str), Some("hi"));
        assert_eq!(record.get("profile_id").map(String::as_str), Some("3"));
        assert_eq!(record.get("profile_phone").map(String::as_str), Some("555"));
    }

    #[test]
    fn nested_text_maps_to_element_column() {
        let record = flatten_item(&item(
            r#"<message><campaign id="4">Spring</campaign></message>"#,
        ));

        assert_eq!(record.get("campaign").map(String::as_str), Some("Spring"));
        assert_eq!(record.get("campaign_id").map(String::as_str), Some("4"));
    }

    #[test]
    fn nested_lists_are_stored_as_json() {
        let record = flatten_item(&item(
            "<profile><id>1</id><tags><tag>a</tag><tag>b</tag></tags></profile>",
        ));

        assert_eq!(record.get("tags_tag").map(String::as_str), Some(r#"["a","b"]"#));
    }

    #[test]
    fn empty_elements_produce_no_cell() {
        let record = flatten_item(&item("<profile><id>1</id><email/></profile>"));

        assert!(!record.contains_key("email"));
    }
}
