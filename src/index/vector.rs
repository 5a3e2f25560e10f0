use std::collections::HashMap;

use crate::core::types::{DocId, TermId};

/// Sparse term-id → weight vector representing one document.
#[derive(Debug, Clone)]
pub struct SparseVector {
    doc_id: DocId,
    weights: HashMap<TermId, f64>,
}

impl SparseVector {
    pub fn new(doc_id: DocId) -> Self {
        SparseVector {
            doc_id,
            weights: HashMap::new(),
        }
    }

    pub fn doc_id(&self) -> DocId {
        self.doc_id
    }

    /// Adds `weight` to the existing entry for `term_id`, creating it if
    /// needed.
    pub fn add_term(&mut self, term_id: TermId, weight: f64) {
        *self.weights.entry(term_id).or_insert(0.0) += weight;
    }

    pub fn weight(&self, term_id: TermId) -> f64 {
        self.weights.get(&term_id).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TermId, f64)> + '_ {
        self.weights.iter().map(|(&id, &w)| (id, w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
