//! Byte-exact node encoding.
//!
//! Little-endian, length-prefixed fields, version written last. Map entries
//! are emitted in ascending key order so the same node always serializes to
//! the same bytes.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Document, DocId, NodeId};
use crate::spatial::mbr::Mbr;
use crate::tree::node::{Node, NodeKind};

pub const FORMAT_VERSION: i32 = 7;

const KIND_LEAF: i32 = 0;
const KIND_INTERNAL: i32 = 1;

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_f64(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    put_i32(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

fn put_mbr(buf: &mut Vec<u8>, mbr: &Mbr) {
    put_i32(buf, mbr.min().len() as i32);
    for &coord in mbr.min() {
        put_f64(buf, coord);
    }
    put_i32(buf, mbr.max().len() as i32);
    for &coord in mbr.max() {
        put_f64(buf, coord);
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.offset + len > self.data.len() {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!(
                    "truncated buffer: need {} bytes at offset {} of {}",
                    len,
                    self.offset,
                    self.data.len()
                ),
            ));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_count(&mut self) -> Result<usize> {
        let value = self.read_i32()?;
        usize::try_from(value).map_err(|_| {
            Error::new(
                ErrorKind::Serialization,
                format!("negative count {}", value),
            )
        })
    }

    fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_count()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::new(ErrorKind::Serialization, "string is not valid UTF-8"))
    }

    fn read_mbr(&mut self) -> Result<Mbr> {
        let dmin = self.read_count()?;
        let mut min = Vec::with_capacity(dmin);
        for _ in 0..dmin {
            min.push(self.read_f64()?);
        }
        let dmax = self.read_count()?;
        let mut max = Vec::with_capacity(dmax);
        for _ in 0..dmax {
            max.push(self.read_f64()?);
        }
        Mbr::new(min, max).map_err(|e| Error::new(ErrorKind::Serialization, e.context))
    }
}

fn serialize_document(doc: &Document) -> Vec<u8> {
    let mut buf = Vec::new();
    put_i32(&mut buf, doc.id().value());
    put_string(&mut buf, doc.raw_text());
    put_mbr(&mut buf, doc.location());
    // The (term, freq) pairs are redundant: term frequencies are rebuilt
    // from the raw text on load.
    put_i32(&mut buf, doc.term_freq().len() as i32);
    for (term, &freq) in doc.term_freq() {
        put_string(&mut buf, term);
        put_i32(&mut buf, freq);
    }
    buf
}

fn deserialize_document(data: &[u8]) -> Result<Document> {
    let mut cursor = Cursor::new(data);
    let id = cursor.read_i32()?;
    let raw_text = cursor.read_string()?;
    let location = cursor.read_mbr()?;
    let term_count = cursor.read_count()?;
    for _ in 0..term_count {
        cursor.read_string()?;
        cursor.read_i32()?;
    }
    Ok(Document::new(DocId(id), location, raw_text))
}

pub fn serialize(node: &Node) -> Vec<u8> {
    let mut buf = Vec::new();

    put_i32(&mut buf, node.id().value());
    let kind = match node.kind() {
        NodeKind::Leaf => KIND_LEAF,
        NodeKind::Internal => KIND_INTERNAL,
    };
    put_i32(&mut buf, kind);
    put_i32(&mut buf, node.level());
    put_i32(&mut buf, node.document_count());
    put_mbr(&mut buf, node.mbr());

    if node.is_internal() {
        put_i32(&mut buf, node.children().len() as i32);
        for child in node.children() {
            put_i32(&mut buf, child.id.value());
        }
    } else {
        put_i32(&mut buf, 0);
    }

    if node.is_leaf() {
        put_i32(&mut buf, node.documents().len() as i32);
        for doc in node.documents() {
            let payload = serialize_document(doc);
            put_i32(&mut buf, payload.len() as i32);
            buf.extend_from_slice(&payload);
        }
    } else {
        put_i32(&mut buf, 0);
    }

    put_i32(&mut buf, node.df().len() as i32);
    for (term, &freq) in node.df() {
        put_string(&mut buf, term);
        put_i32(&mut buf, freq);
    }

    put_i32(&mut buf, node.tf_max().len() as i32);
    for (term, &freq) in node.tf_max() {
        put_string(&mut buf, term);
        put_i32(&mut buf, freq);
    }

    put_i32(&mut buf, node.child_paths().len() as i32);
    for (&child_id, &path) in node.child_paths() {
        put_i32(&mut buf, child_id.value());
        put_i32(&mut buf, path as i32);
    }

    if node.is_internal() {
        put_i32(&mut buf, node.child_mbrs().len() as i32);
        for (&child_id, mbr) in node.child_mbrs() {
            put_i32(&mut buf, child_id.value());
            put_mbr(&mut buf, mbr);
        }

        put_i32(&mut buf, node.child_text_bounds().len() as i32);
        for (&child_id, &bound) in node.child_text_bounds() {
            put_i32(&mut buf, child_id.value());
            put_f64(&mut buf, bound);
        }

        put_i32(&mut buf, node.child_keywords_map().len() as i32);
        for (&child_id, keywords) in node.child_keywords_map() {
            put_i32(&mut buf, child_id.value());
            put_i32(&mut buf, keywords.len() as i32);
            for keyword in keywords {
                put_string(&mut buf, keyword);
            }
        }
    } else {
        put_i32(&mut buf, 0);
        put_i32(&mut buf, 0);
        put_i32(&mut buf, 0);
    }

    put_i32(&mut buf, FORMAT_VERSION);

    buf
}

pub fn deserialize(data: &[u8]) -> Result<Node> {
    if data.is_empty() {
        return Err(Error::new(ErrorKind::Serialization, "empty node buffer"));
    }

    let mut cursor = Cursor::new(data);

    let id = cursor.read_i32()?;
    let kind = match cursor.read_i32()? {
        KIND_LEAF => NodeKind::Leaf,
        KIND_INTERNAL => NodeKind::Internal,
        other => {
            return Err(Error::new(
                ErrorKind::Serialization,
                format!("unknown node kind {}", other),
            ))
        }
    };
    let level = cursor.read_i32()?;
    let document_count = cursor.read_i32()?;
    let mbr = cursor.read_mbr()?;

    let mut node = Node::new(NodeId(id), kind, level, mbr);

    let child_count = cursor.read_count()?;
    let mut child_ids = Vec::with_capacity(child_count);
    for _ in 0..child_count {
        child_ids.push(NodeId(cursor.read_i32()?));
    }

    let doc_count = cursor.read_count()?;
    for _ in 0..doc_count {
        let len = cursor.read_count()?;
        let payload = cursor.take(len)?;
        let doc = deserialize_document(payload)?;
        node.add_document(doc)?;
    }

    for child_id in child_ids {
        node.push_child_placeholder(child_id);
    }

    let df_count = cursor.read_count()?;
    let mut df = BTreeMap::new();
    for _ in 0..df_count {
        let term = cursor.read_string()?;
        let freq = cursor.read_i32()?;
        df.insert(term, freq);
    }

    let tf_max_count = cursor.read_count()?;
    let mut tf_max = BTreeMap::new();
    for _ in 0..tf_max_count {
        let term = cursor.read_string()?;
        let freq = cursor.read_i32()?;
        tf_max.insert(term, freq);
    }

    let path_count = cursor.read_count()?;
    for _ in 0..path_count {
        let child_id = NodeId(cursor.read_i32()?);
        let path = cursor.read_i32()?;
        node.set_child_path(child_id, path as u32);
    }

    let child_mbr_count = cursor.read_count()?;
    for _ in 0..child_mbr_count {
        let child_id = NodeId(cursor.read_i32()?);
        let child_mbr = cursor.read_mbr()?;
        node.set_child_mbr(child_id, child_mbr);
    }

    let bound_count = cursor.read_count()?;
    for _ in 0..bound_count {
        let child_id = NodeId(cursor.read_i32()?);
        let bound = cursor.read_f64()?;
        node.set_child_text_bound(child_id, bound);
    }

    let keyword_count = cursor.read_count()?;
    for _ in 0..keyword_count {
        let child_id = NodeId(cursor.read_i32()?);
        let n = cursor.read_count()?;
        let mut keywords = BTreeSet::new();
        for _ in 0..n {
            keywords.insert(cursor.read_string()?);
        }
        node.set_child_keywords(child_id, keywords);
    }

    let version = cursor.read_i32()?;
    if version > FORMAT_VERSION {
        return Err(Error::new(
            ErrorKind::Serialization,
            format!("unsupported format version {}", version),
        ));
    }

    // Applied last so placeholder children cannot clobber the authoritative
    // summaries.
    node.set_summary(df, tf_max, document_count);

    Ok(node)
}
