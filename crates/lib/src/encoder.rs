//! # Tag Array Encoder
//!
//! Writes the `{"tags":[ ... ]}` envelope one chunk at a time. The encoder
//! owns the separator bookkeeping, so callers only hand it records.

use crate::model::TagRecord;
use bytes::{BufMut, Bytes, BytesMut};

const OPEN: &[u8] = br#"{"tags":["#;
const CLOSE: &[u8] = b"]}";

#[derive(Debug, Default)]
pub struct TagArrayEncoder {
    written: usize,
}

impl TagArrayEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The envelope prefix, written before any record is known.
    pub fn open(&self) -> Bytes {
        Bytes::from_static(OPEN)
    }

    /// Encodes one array element, preceded by a comma unless it is the first.
    pub fn encode(&mut self, record: &TagRecord) -> serde_json::Result<Bytes> {
        let mut chunk = BytesMut::with_capacity(160).writer();
        if self.written > 0 {
            chunk.get_mut().put_u8(b',');
        }
        serde_json::to_writer(&mut chunk, record)?;
        chunk.get_mut().put_u8(b'\n');
        self.written += 1;
        Ok(chunk.into_inner().freeze())
    }

    pub fn close(&self) -> Bytes {
        Bytes::from_static(CLOSE)
    }

    /// Number of records encoded so far.
    pub fn written(&self) -> usize {
        self.written
    }
}
