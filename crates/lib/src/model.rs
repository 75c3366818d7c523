//! # Catalog Model
//!
//! Transient, per-request values decoded from the tool's tag catalog, and the
//! flattened record that is written to the response array.

use serde::Serialize;
use std::collections::BTreeMap;

/// A named group of tag definitions, as found in one `<table>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// The `name` attribute, e.g. `EXIF`.
    pub name: String,
    /// The `g0` attribute (family 0 group), e.g. `Image`.
    pub group: String,
    /// Tag children in document order.
    pub tags: Vec<Tag>,
}

/// One metadata field definition inside a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    /// The declared value type, e.g. `int16u`.
    pub value_type: String,
    pub writable: bool,
    /// Language code to description text.
    pub descriptions: BTreeMap<String, String>,
}

/// The JSON projection of one (table, tag) pair.
///
/// Field order is part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    pub writable: bool,
    pub path: String,
    pub group: String,
    pub description: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl TagRecord {
    pub fn new(table: &Table, tag: &Tag) -> Self {
        Self {
            writable: tag.writable,
            path: format!("{}:{}", table.name, tag.name),
            group: format!("{}::{}", table.group, table.name),
            description: tag.descriptions.clone(),
            value_type: tag.value_type.clone(),
        }
    }
}

impl Table {
    /// Flattens the table into one record per tag, in document order.
    pub fn records(&self) -> impl Iterator<Item = TagRecord> + '_ {
        self.tags.iter().map(move |tag| TagRecord::new(self, tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exif_table() -> Table {
        Table {
            name: "EXIF".to_string(),
            group: "Image".to_string(),
            tags: vec![
                Tag {
                    name: "Width".to_string(),
                    value_type: "int16u".to_string(),
                    writable: true,
                    descriptions: BTreeMap::from([("en".to_string(), "Image width".to_string())]),
                },
                Tag {
                    name: "Height".to_string(),
                    value_type: "int16u".to_string(),
                    writable: false,
                    descriptions: BTreeMap::new(),
                },
            ],
        }
    }

    #[test]
    fn test_records_follow_tag_order() {
        let table = exif_table();
        let paths: Vec<String> = table.records().map(|r| r.path).collect();
        assert_eq!(paths, vec!["EXIF:Width", "EXIF:Height"]);
    }

    #[test]
    fn test_record_wire_shape() {
        let table = exif_table();
        let record = table.records().next().unwrap();
        let encoded = serde_json::to_string(&record).unwrap();

        assert_eq!(
            encoded,
            r#"{"writable":true,"path":"EXIF:Width","group":"Image::EXIF","description":{"en":"Image width"},"type":"int16u"}"#
        );
    }

    #[test]
    fn test_empty_description_is_object() {
        let table = exif_table();
        let record = table.records().nth(1).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["description"], json!({}));
    }

    #[test]
    fn test_table_without_tags_has_no_records() {
        let table = Table {
            name: "Empty".to_string(),
            group: "Other".to_string(),
            tags: vec![],
        };
        assert_eq!(table.records().count(), 0);
    }
}
