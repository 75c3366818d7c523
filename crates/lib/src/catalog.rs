//! # Catalog Reader
//!
//! Incremental reader for the tool's XML tag catalog. The document is never
//! materialized: tokens are pulled from the pipe as they arrive and each
//! `<table>` element is decoded on its own before the reader moves on.
//!
//! ```text
//! <taginfo>
//!   <table name='EXIF' g0='EXIF'>
//!     <tag name='Width' type='int16u' writable='true'>
//!       <desc lang='en'>Image Width</desc>
//!     </tag>
//!   </table>
//! </taginfo>
//! ```

use crate::errors::CatalogError;
use crate::model::{Table, Tag};
use quick_xml::errors::IllFormedError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncRead, BufReader};
use tracing::debug;

const TABLE: &[u8] = b"table";
const TAG: &[u8] = b"tag";
const DESC: &[u8] = b"desc";

/// Pulls [`Table`] values out of a streamed XML catalog.
pub struct CatalogReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> CatalogReader<BufReader<R>> {
    /// Wraps a raw byte source, such as a child's stdout, in a buffered reader.
    pub fn from_output(output: R) -> Self {
        Self::new(BufReader::new(output))
    }
}

impl<R: AsyncBufRead + Unpin> CatalogReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::new(),
        }
    }

    /// Advances to the next `<table>` element and decodes it.
    ///
    /// Returns `Ok(None)` once the input is exhausted. A
    /// [`CatalogError::Table`] leaves the reader positioned after the broken
    /// element, so calling this again continues with the next table.
    pub async fn next_table(&mut self) -> Result<Option<Table>, CatalogError> {
        loop {
            self.buf.clear();
            let (start, self_closed) = match self.reader.read_event_into_async(&mut self.buf).await? {
                Event::Start(e) if e.local_name().as_ref() == TABLE => (e.into_owned(), false),
                Event::Empty(e) if e.local_name().as_ref() == TABLE => (e.into_owned(), true),
                Event::Eof => return Ok(None),
                _ => continue,
            };
            return self.decode_table(&start, self_closed).await.map(Some);
        }
    }

    async fn decode_table(
        &mut self,
        start: &BytesStart<'_>,
        self_closed: bool,
    ) -> Result<Table, CatalogError> {
        let mut table = Table::default();
        // The first problem wins; the rest of the element is still consumed.
        let mut failure: Option<String> = None;

        match read_attributes(start) {
            Ok(mut attrs) => {
                table.name = attrs.remove("name").unwrap_or_default();
                table.group = attrs.remove("g0").unwrap_or_default();
            }
            Err(reason) => failure = Some(reason),
        }

        if !self_closed {
            self.decode_table_body(&mut table, &mut failure).await?;
        }

        match failure {
            None => {
                debug!(table = %table.name, tags = table.tags.len(), "Decoded table");
                Ok(table)
            }
            Some(reason) => Err(CatalogError::Table {
                table: (!table.name.is_empty()).then_some(table.name),
                reason,
            }),
        }
    }

    /// Consumes events up to and including the closing `</table>`.
    async fn decode_table_body(
        &mut self,
        table: &mut Table,
        failure: &mut Option<String>,
    ) -> Result<(), CatalogError> {
        // Nesting depth below <table>: 1 = <tag>, 2 = <desc>.
        let mut depth = 0usize;
        let mut current_tag: Option<Tag> = None;
        let mut current_desc: Option<(String, String)> = None;

        loop {
            self.buf.clear();
            match self.reader.read_event_into_async(&mut self.buf).await? {
                Event::Start(e) => {
                    depth += 1;
                    if failure.is_some() {
                        continue;
                    }
                    match (depth, e.local_name().as_ref()) {
                        (1, TAG) => match decode_tag(&e) {
                            Ok(tag) => current_tag = Some(tag),
                            Err(reason) => *failure = Some(reason),
                        },
                        (2, DESC) if current_tag.is_some() => match read_attributes(&e) {
                            Ok(mut attrs) => {
                                current_desc = attrs.remove("lang").map(|lang| (lang, String::new()))
                            }
                            Err(reason) => *failure = Some(reason),
                        },
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    if failure.is_some() {
                        continue;
                    }
                    match (depth + 1, e.local_name().as_ref()) {
                        (1, TAG) => match decode_tag(&e) {
                            Ok(tag) => table.tags.push(tag),
                            Err(reason) => *failure = Some(reason),
                        },
                        (2, DESC) => match (read_attributes(&e), current_tag.as_mut()) {
                            (Ok(mut attrs), Some(tag)) => {
                                if let Some(lang) = attrs.remove("lang") {
                                    tag.descriptions.insert(lang, String::new());
                                }
                            }
                            (Err(reason), _) => *failure = Some(reason),
                            _ => {}
                        },
                        _ => {}
                    }
                }
                Event::Text(text) => {
                    if failure.is_some() || depth != 2 {
                        continue;
                    }
                    if let Some((_, desc)) = current_desc.as_mut() {
                        match text.unescape() {
                            Ok(value) => desc.push_str(&value),
                            Err(e) => *failure = Some(format!("bad description text: {e}")),
                        }
                    }
                }
                Event::CData(data) => {
                    if failure.is_none() && depth == 2 {
                        if let Some((_, desc)) = current_desc.as_mut() {
                            desc.push_str(&String::from_utf8_lossy(&data));
                        }
                    }
                }
                Event::End(_) => {
                    match depth {
                        0 => return Ok(()),
                        1 => {
                            if let Some(tag) = current_tag.take() {
                                table.tags.push(tag);
                            }
                        }
                        2 => {
                            if let (Some((lang, desc)), Some(tag)) =
                                (current_desc.take(), current_tag.as_mut())
                            {
                                tag.descriptions.insert(lang, desc);
                            }
                        }
                        _ => {}
                    }
                    depth -= 1;
                }
                Event::Eof => {
                    return Err(CatalogError::Syntax(quick_xml::Error::IllFormed(
                        IllFormedError::MissingEndTag("table".to_string()),
                    )));
                }
                _ => {}
            }
        }
    }
}

fn decode_tag(start: &BytesStart<'_>) -> Result<Tag, String> {
    let mut attrs = read_attributes(start)?;
    Ok(Tag {
        name: attrs.remove("name").unwrap_or_default(),
        value_type: attrs.remove("type").unwrap_or_default(),
        writable: attrs.get("writable").is_some_and(|v| v == "true"),
        descriptions: Default::default(),
    })
}

/// Collects the unescaped attributes of an element, keyed by local name.
fn read_attributes(start: &BytesStart<'_>) -> Result<HashMap<String, String>, String> {
    let mut attrs = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| format!("bad attribute: {e}"))?;
        let value = attr
            .unescape_value()
            .map_err(|e| format!("bad attribute value: {e}"))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        attrs.insert(key, value.into_owned());
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(xml: &str) -> Vec<Result<Table, String>> {
        let mut reader = CatalogReader::new(xml.as_bytes());
        let mut out = Vec::new();
        loop {
            match reader.next_table().await {
                Ok(Some(table)) => out.push(Ok(table)),
                Ok(None) => break,
                Err(e) if e.is_recoverable() => out.push(Err(e.to_string())),
                Err(e) => {
                    out.push(Err(e.to_string()));
                    break;
                }
            }
        }
        out
    }

    #[tokio::test]
    async fn test_decodes_table_with_tag_and_description() {
        let xml = r#"<?xml version='1.0' encoding='UTF-8'?>
<taginfo>
<table name='EXIF' g0='Image' g1='IFD0' g2='Image'>
 <desc lang='en'>Exif</desc>
 <tag id='256' name='Width' type='int16u' count='1' writable='true' g2='Image'>
  <desc lang='en'>Image width</desc>
  <desc lang='de'>Bildbreite</desc>
 </tag>
</table>
</taginfo>"#;

        let tables = read_all(xml).await;
        assert_eq!(tables.len(), 1);
        let table = tables[0].as_ref().unwrap();
        assert_eq!(table.name, "EXIF");
        assert_eq!(table.group, "Image");
        assert_eq!(table.tags.len(), 1);

        let tag = &table.tags[0];
        assert_eq!(tag.name, "Width");
        assert_eq!(tag.value_type, "int16u");
        assert!(tag.writable);
        assert_eq!(tag.descriptions.get("en").unwrap(), "Image width");
        assert_eq!(tag.descriptions.get("de").unwrap(), "Bildbreite");
    }

    #[tokio::test]
    async fn test_table_level_desc_is_not_a_tag_description() {
        let xml = r#"<taginfo><table name='T' g0='G'><desc lang='en'>Table</desc><tag name='A' type='string' writable='false'/></table></taginfo>"#;
        let tables = read_all(xml).await;
        let table = tables[0].as_ref().unwrap();
        assert_eq!(table.tags.len(), 1);
        assert!(!table.tags[0].writable);
        assert!(table.tags[0].descriptions.is_empty());
    }

    #[tokio::test]
    async fn test_unescapes_entities() {
        let xml = r#"<taginfo><table name='T' g0='G'><tag name='A' type='string' writable='true'><desc lang='en'>Width &amp; Height &lt;px&gt;</desc></tag></table></taginfo>"#;
        let tables = read_all(xml).await;
        let tag = &tables[0].as_ref().unwrap().tags[0];
        assert_eq!(tag.descriptions["en"], "Width & Height <px>");
    }

    #[tokio::test]
    async fn test_missing_optional_attributes_default() {
        let xml = r#"<taginfo><table name='T'><tag name='A'/></table></taginfo>"#;
        let tables = read_all(xml).await;
        let table = tables[0].as_ref().unwrap();
        assert_eq!(table.group, "");
        assert_eq!(table.tags[0].value_type, "");
        assert!(!table.tags[0].writable);
    }

    #[tokio::test]
    async fn test_missing_names_decode_as_empty() {
        let xml = r#"<taginfo>
<table name='T'><tag name='A'/><tag type='t'/><tag name='C'/></table>
<table g0='G'><tag name='A'/></table>
</taginfo>"#;
        let tables = read_all(xml).await;
        assert_eq!(tables.len(), 2);

        let first = tables[0].as_ref().unwrap();
        let names: Vec<&str> = first.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["A", "", "C"]);
        assert_eq!(first.tags[1].value_type, "t");

        let second = tables[1].as_ref().unwrap();
        assert_eq!(second.name, "");
        assert_eq!(second.group, "G");
        assert_eq!(second.tags.len(), 1);
    }

    #[tokio::test]
    async fn test_description_whitespace_is_preserved() {
        let xml = "<taginfo>\n<table name='T' g0='G'>\n <tag name='A' type='t'>\n  <desc lang='en'>  Image width \n</desc>\n </tag>\n</table>\n</taginfo>";
        let tables = read_all(xml).await;
        let tag = &tables[0].as_ref().unwrap().tags[0];
        assert_eq!(tag.descriptions.len(), 1);
        assert_eq!(tag.descriptions["en"], "  Image width \n");
    }

    #[tokio::test]
    async fn test_unknown_elements_are_ignored() {
        let xml = r#"<taginfo><meta x='1'/><table name='T' g0='G' extra='y'><notes><note>hi</note></notes><tag name='A' type='t' writable='true' flags='Unknown'><values><key id='1'><val lang='en'>One</val></key></values><desc lang='en'>A tag</desc></tag></table></taginfo>"#;
        let tables = read_all(xml).await;
        assert_eq!(tables.len(), 1);
        let tag = &tables[0].as_ref().unwrap().tags[0];
        assert_eq!(tag.descriptions.len(), 1);
        assert_eq!(tag.descriptions["en"], "A tag");
    }

    #[tokio::test]
    async fn test_malformed_table_is_skipped_and_reader_continues() {
        let xml = r#"<taginfo>
<table name='Bad' g0='G'><tag name='A' name='B' type='t'/><tag name='C' type='t'/></table>
<table name='Good' g0='G'><tag name='D' type='t' writable='true'/></table>
</taginfo>"#;

        let tables = read_all(xml).await;
        assert_eq!(tables.len(), 2);
        let err = tables[0].as_ref().unwrap_err();
        assert!(err.contains("Bad"), "unexpected error: {err}");
        let good = tables[1].as_ref().unwrap();
        assert_eq!(good.name, "Good");
        assert_eq!(good.tags[0].name, "D");
    }

    #[tokio::test]
    async fn test_bad_entity_in_description_skips_table() {
        let xml = r#"<taginfo><table name='Bad' g0='G'><tag name='A' type='t'><desc lang='en'>&bogus;</desc></tag></table><table name='Next' g0='G'><tag name='B' type='t'/></table></taginfo>"#;
        let tables = read_all(xml).await;
        assert_eq!(tables.len(), 2);
        assert!(tables[0].is_err());
        assert_eq!(tables[1].as_ref().unwrap().name, "Next");
    }

    #[tokio::test]
    async fn test_self_closed_and_empty_tables() {
        let xml = r#"<taginfo><table name='A' g0='G'/><table name='B' g0='G'></table></taginfo>"#;
        let tables = read_all(xml).await;
        assert_eq!(tables.len(), 2);
        assert!(tables.iter().all(|t| t.as_ref().unwrap().tags.is_empty()));
    }

    #[tokio::test]
    async fn test_truncated_input_is_a_stream_error() {
        let xml = r#"<taginfo><table name='A' g0='G'><tag name='X' type='t'/>"#;
        let mut reader = CatalogReader::new(xml.as_bytes());
        let err = reader.next_table().await.unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_mismatched_end_tag_is_a_stream_error() {
        let xml = r#"<taginfo><table name='A' g0='G'><tag name='X' type='t'></desc></table></taginfo>"#;
        let mut reader = CatalogReader::new(xml.as_bytes());
        let err = reader.next_table().await.unwrap_err();
        assert!(!err.is_recoverable());
    }
}
