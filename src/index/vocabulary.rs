use std::collections::HashMap;

use crate::core::types::TermId;

/// Interns terms to dense integer ids in insertion order.
#[derive(Debug, Default)]
pub struct Vocabulary {
    term_to_id: HashMap<String, TermId>,
    id_to_term: Vec<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Vocabulary::default()
    }

    /// Returns the existing id for `term` or assigns the next dense one.
    /// Idempotent; empty terms are never interned.
    pub fn add_term(&mut self, term: &str) -> Option<TermId> {
        if term.is_empty() {
            return None;
        }
        if let Some(&id) = self.term_to_id.get(term) {
            return Some(id);
        }
        let id = TermId(self.id_to_term.len() as i32);
        self.term_to_id.insert(term.to_string(), id);
        self.id_to_term.push(term.to_string());
        Some(id)
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.term_to_id.get(term).copied()
    }

    pub fn term(&self, id: TermId) -> Option<&str> {
        usize::try_from(id.value())
            .ok()
            .and_then(|i| self.id_to_term.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_term.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_term.is_empty()
    }
}
