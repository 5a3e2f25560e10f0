use std::collections::{BTreeMap, BTreeSet};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Document, LeafPath, NodeId};
use crate::spatial::mbr::Mbr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Internal,
}

/// Summary snapshot of one child, captured when the child is attached.
/// Children of a node loaded back from storage are placeholders carrying
/// only their id; the live child is fetched on demand through its ORAM
/// path.
#[derive(Debug, Clone)]
pub struct ChildEntry {
    pub id: NodeId,
    pub mbr: Mbr,
    pub document_count: i32,
    pub df: BTreeMap<String, i32>,
    pub tf_max: BTreeMap<String, i32>,
}

impl ChildEntry {
    pub fn from_node(node: &Node) -> Self {
        ChildEntry {
            id: node.id,
            mbr: node.mbr.clone(),
            document_count: node.document_count,
            df: node.df.clone(),
            tf_max: node.tf_max.clone(),
        }
    }

    fn placeholder(id: NodeId, dimensions: usize) -> Self {
        ChildEntry {
            id,
            mbr: Mbr::zero(dimensions),
            document_count: 0,
            df: BTreeMap::new(),
            tf_max: BTreeMap::new(),
        }
    }
}

/// An IR-tree node: an R-tree node augmented with textual summaries so the
/// search can prune on both space and text before fetching any child block.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    level: i32,
    mbr: Mbr,
    document_count: i32,

    documents: Vec<Document>,
    children: Vec<ChildEntry>,

    df: BTreeMap<String, i32>,
    tf_max: BTreeMap<String, i32>,

    // Per-child caches keyed by child id. These are what let a parent prune
    // a subtree without touching its block: the ORAM hides which child is
    // fetched but cannot reduce how many must be.
    child_paths: BTreeMap<NodeId, LeafPath>,
    child_mbrs: BTreeMap<NodeId, Mbr>,
    child_bounds: BTreeMap<NodeId, f64>,
    child_keywords: BTreeMap<NodeId, BTreeSet<String>>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, level: i32, mbr: Mbr) -> Self {
        Node {
            id,
            kind,
            level,
            mbr,
            document_count: 0,
            documents: Vec::new(),
            children: Vec::new(),
            df: BTreeMap::new(),
            tf_max: BTreeMap::new(),
            child_paths: BTreeMap::new(),
            child_mbrs: BTreeMap::new(),
            child_bounds: BTreeMap::new(),
            child_keywords: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    pub fn is_internal(&self) -> bool {
        self.kind == NodeKind::Internal
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn mbr(&self) -> &Mbr {
        &self.mbr
    }

    pub fn document_count(&self) -> i32 {
        self.document_count
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn children(&self) -> &[ChildEntry] {
        &self.children
    }

    pub fn child_ids(&self) -> Vec<NodeId> {
        self.children.iter().map(|c| c.id).collect()
    }

    pub fn df(&self) -> &BTreeMap<String, i32> {
        &self.df
    }

    pub fn tf_max(&self) -> &BTreeMap<String, i32> {
        &self.tf_max
    }

    pub fn document_frequency(&self, term: &str) -> i32 {
        self.df.get(term).copied().unwrap_or(0)
    }

    pub fn max_term_frequency(&self, term: &str) -> i32 {
        self.tf_max.get(term).copied().unwrap_or(0)
    }

    /// Appends a document to a leaf, growing the node MBR to cover it.
    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        if self.kind != NodeKind::Leaf {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("node {} is not a leaf", self.id.value()),
            ));
        }
        self.mbr.expand(doc.location());
        self.documents.push(doc);
        self.update_summary();
        Ok(())
    }

    /// Attaches a child to an internal node: snapshots its summary, grows
    /// the node MBR, and populates the per-child MBR and keyword caches.
    pub fn add_child(&mut self, child: &Node) -> Result<()> {
        self.add_child_entry(ChildEntry::from_node(child))
    }

    pub(crate) fn add_child_entry(&mut self, entry: ChildEntry) -> Result<()> {
        if self.kind != NodeKind::Internal {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("node {} is not internal", self.id.value()),
            ));
        }
        self.mbr.expand(&entry.mbr);
        self.child_mbrs.insert(entry.id, entry.mbr.clone());
        self.child_keywords
            .insert(entry.id, entry.tf_max.keys().cloned().collect());
        self.children.push(entry);
        self.update_summary();
        Ok(())
    }

    /// Inserts an id-only child stub without touching the MBR or summaries;
    /// used when rebuilding a node from its serialized form.
    pub(crate) fn push_child_placeholder(&mut self, id: NodeId) {
        self.children
            .push(ChildEntry::placeholder(id, self.mbr.dimensions()));
    }

    /// Recomputes `document_count`, `df` and `tf_max` from owned documents
    /// (leaf) or from the captured child summaries (internal: df sums,
    /// tf_max takes the componentwise max).
    pub fn update_summary(&mut self) {
        self.document_count = 0;
        self.df.clear();
        self.tf_max.clear();

        match self.kind {
            NodeKind::Leaf => {
                for doc in &self.documents {
                    self.document_count += 1;
                    for (term, &freq) in doc.term_freq() {
                        *self.df.entry(term.clone()).or_insert(0) += 1;
                        let max = self.tf_max.entry(term.clone()).or_insert(0);
                        if *max < freq {
                            *max = freq;
                        }
                    }
                }
            }
            NodeKind::Internal => {
                for child in &self.children {
                    self.document_count += child.document_count;
                    for (term, &freq) in &child.df {
                        *self.df.entry(term.clone()).or_insert(0) += freq;
                    }
                    for (term, &freq) in &child.tf_max {
                        let max = self.tf_max.entry(term.clone()).or_insert(0);
                        if *max < freq {
                            *max = freq;
                        }
                    }
                }
            }
        }
    }

    /// Overwrites the summaries with authoritative values from storage,
    /// bypassing `update_summary` (which would clobber them with
    /// placeholder data).
    pub(crate) fn set_summary(
        &mut self,
        df: BTreeMap<String, i32>,
        tf_max: BTreeMap<String, i32>,
        document_count: i32,
    ) {
        self.df = df;
        self.tf_max = tf_max;
        self.document_count = document_count;
    }

    pub fn set_child_path(&mut self, child_id: NodeId, path: LeafPath) {
        self.child_paths.insert(child_id, path);
    }

    pub fn child_path(&self, child_id: NodeId) -> Option<LeafPath> {
        self.child_paths.get(&child_id).copied()
    }

    pub fn child_paths(&self) -> &BTreeMap<NodeId, LeafPath> {
        &self.child_paths
    }

    pub fn set_child_mbr(&mut self, child_id: NodeId, mbr: Mbr) {
        self.child_mbrs.insert(child_id, mbr);
    }

    pub fn child_mbr(&self, child_id: NodeId) -> Option<&Mbr> {
        self.child_mbrs.get(&child_id)
    }

    pub fn child_mbrs(&self) -> &BTreeMap<NodeId, Mbr> {
        &self.child_mbrs
    }

    pub fn set_child_text_bound(&mut self, child_id: NodeId, bound: f64) {
        self.child_bounds.insert(child_id, bound);
    }

    pub fn child_text_bound(&self, child_id: NodeId) -> f64 {
        self.child_bounds.get(&child_id).copied().unwrap_or(0.0)
    }

    pub fn child_text_bounds(&self) -> &BTreeMap<NodeId, f64> {
        &self.child_bounds
    }

    pub fn set_child_keywords(&mut self, child_id: NodeId, keywords: BTreeSet<String>) {
        self.child_keywords.insert(child_id, keywords);
    }

    pub fn child_keywords(&self, child_id: NodeId) -> Option<&BTreeSet<String>> {
        self.child_keywords.get(&child_id)
    }

    pub fn child_keywords_map(&self) -> &BTreeMap<NodeId, BTreeSet<String>> {
        &self.child_keywords
    }

    /// True only if the keyword cache for `child_id` exists and covers every
    /// query term.
    pub fn child_has_all_keywords(&self, child_id: NodeId, terms: &[String]) -> bool {
        match self.child_keywords.get(&child_id) {
            Some(keywords) => terms.iter().all(|t| keywords.contains(t)),
            None => false,
        }
    }
}
