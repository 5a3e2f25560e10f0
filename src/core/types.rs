use std::collections::BTreeMap;

use crate::analysis::tokenizer;
use crate::spatial::mbr::Mbr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(pub i32);

impl DocId {
    pub fn value(&self) -> i32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub i32);

impl NodeId {
    pub fn value(&self) -> i32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(pub i32);

impl TermId {
    pub fn value(&self) -> i32 {
        self.0
    }
}

/// A leaf identifier in the ORAM tree, in `[0, num_leaves)`.
pub type LeafPath = u32;

/// A geotagged text record. Term frequencies are derived from the raw text
/// by the canonical tokenizer at construction; the struct is immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: DocId,
    location: Mbr,
    raw_text: String,
    term_freq: BTreeMap<String, i32>,
}

impl Document {
    pub fn new(id: DocId, location: Mbr, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let term_freq = tokenizer::term_frequencies(&raw_text);
        Document {
            id,
            location,
            raw_text,
            term_freq,
        }
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn location(&self) -> &Mbr {
        &self.location
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn term_freq(&self) -> &BTreeMap<String, i32> {
        &self.term_freq
    }

    /// Occurrences of `term` in this document; 0 for absent terms.
    pub fn term_frequency(&self, term: &str) -> i32 {
        self.term_freq.get(term).copied().unwrap_or(0)
    }

    pub fn contains_all_terms<S: AsRef<str>>(&self, terms: &[S]) -> bool {
        terms
            .iter()
            .all(|t| self.term_frequency(t.as_ref()) > 0)
    }
}
