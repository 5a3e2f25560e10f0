use std::collections::HashMap;

use crate::core::types::{DocId, TermId};
use crate::index::vector::SparseVector;

/// One entry of a postings list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting {
    pub doc_id: DocId,
    pub weight: f64,
}

/// Global term-id → postings mapping. Document frequency of a term is the
/// length of its postings list. There is no deduplication: adding the same
/// document twice produces duplicate postings, and callers own that
/// invariant.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<TermId, Vec<Posting>>,
    total_documents: usize,
}

impl InvertedIndex {
    pub fn new() -> Self {
        InvertedIndex::default()
    }

    pub fn add_document(&mut self, doc_id: DocId, vector: &SparseVector) {
        self.total_documents += 1;
        for (term_id, weight) in vector.iter() {
            self.postings
                .entry(term_id)
                .or_default()
                .push(Posting { doc_id, weight });
        }
    }

    pub fn postings(&self, term_id: TermId) -> &[Posting] {
        self.postings
            .get(&term_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn document_frequency(&self, term_id: TermId) -> usize {
        self.postings(term_id).len()
    }

    pub fn total_documents(&self) -> usize {
        self.total_documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(doc: i32, terms: &[(i32, f64)]) -> SparseVector {
        let mut v = SparseVector::new(DocId(doc));
        for &(t, w) in terms {
            v.add_term(TermId(t), w);
        }
        v
    }

    #[test]
    fn document_frequency_is_postings_length() {
        let mut index = InvertedIndex::new();
        index.add_document(DocId(1), &vector(1, &[(0, 1.0), (1, 2.0)]));
        index.add_document(DocId(2), &vector(2, &[(0, 3.0)]));
        assert_eq!(index.document_frequency(TermId(0)), 2);
        assert_eq!(index.document_frequency(TermId(1)), 1);
        assert_eq!(index.document_frequency(TermId(7)), 0);
        assert_eq!(index.total_documents(), 2);
    }

    #[test]
    fn duplicate_adds_produce_duplicate_postings() {
        let mut index = InvertedIndex::new();
        let v = vector(1, &[(0, 1.0)]);
        index.add_document(DocId(1), &v);
        index.add_document(DocId(1), &v);
        let postings = index.postings(TermId(0));
        assert_eq!(postings.len(), 2);
        assert!(postings.iter().all(|p| p.doc_id == DocId(1)));
        assert_eq!(index.total_documents(), 2);
    }
}
