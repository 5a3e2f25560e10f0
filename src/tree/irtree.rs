//! The IR-tree: an R-tree whose nodes carry textual summaries, stored
//! entirely inside a Ring-ORAM so the host never learns which subtrees a
//! query touches.
//!
//! Build writes nodes by logical id. Before the first search the tree is
//! sealed: every node gets a random leaf path, child paths are embedded in
//! their parents (the recursive position map), and the root path is
//! persisted. Search then traverses by path alone, so the trusted region
//! holds O(1) tree state.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use parking_lot::Mutex;

use crate::core::config::EngineConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document, LeafPath, NodeId};
use crate::index::inverted::InvertedIndex;
use crate::index::vector::SparseVector;
use crate::index::vocabulary::Vocabulary;
use crate::scoring::relevance::{
    joint_relevance, spatial_relevance, text_relevance, tf_idf_weight,
};
use crate::spatial::mbr::Mbr;
use crate::storage::host::{HostStorage, MemoryHost};
use crate::storage::oram_store::OramStorage;
use crate::tree::node::{ChildEntry, Node, NodeKind};
use crate::tree::query::{Query, SearchHit};
use crate::tree::serializer;

#[derive(Debug, Default, Clone, Copy)]
pub struct SearchStats {
    pub nodes_visited: usize,
    /// Bucket accesses chargeable to oblivious bandwidth, excluding the
    /// configured in-enclave cache levels.
    pub oblivious_blocks: usize,
}

/// Best-first queue entry: either a tree node (with the path it was fetched
/// from) or a document emitted from a leaf. Ordered by descending score;
/// ties pop in push order.
struct QueueEntry {
    score: f64,
    seq: u64,
    item: EntryItem,
}

enum EntryItem {
    Node { node: Node, path: LeafPath },
    Doc { doc_id: DocId },
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct IrTree<H: HostStorage = MemoryHost> {
    config: EngineConfig,
    storage: OramStorage<H>,
    vocab: Vocabulary,
    index: InvertedIndex,

    root_id: NodeId,
    next_node_id: i32,
    next_doc_id: i32,

    // Write-through cache, consulted only while the tree is unsealed. Once
    // sealed, serving nodes from cleartext memory would leak the access
    // pattern.
    build_cache: Mutex<LruCache<NodeId, Node>>,
    sealed: bool,

    last_search: SearchStats,
}

impl IrTree<MemoryHost> {
    pub fn new(config: EngineConfig) -> Result<Self> {
        IrTree::with_host(config, MemoryHost::new())
    }
}

impl<H: HostStorage> IrTree<H> {
    pub fn with_host(config: EngineConfig, host: H) -> Result<Self> {
        config.validate()?;
        let storage = OramStorage::new(&config.oram, host)?;
        let cache_size = NonZeroUsize::new(config.build_cache_size.max(1))
            .unwrap_or(NonZeroUsize::MIN);

        let mut tree = IrTree {
            config,
            storage,
            vocab: Vocabulary::new(),
            index: InvertedIndex::new(),
            root_id: NodeId(0),
            next_node_id: 0,
            next_doc_id: 0,
            build_cache: Mutex::new(LruCache::new(cache_size)),
            sealed: false,
            last_search: SearchStats::default(),
        };

        let root = Node::new(
            tree.alloc_node_id(),
            NodeKind::Leaf,
            0,
            Mbr::zero(tree.config.dimensions),
        );
        tree.root_id = root.id();
        tree.save_node(&root)?;
        Ok(tree)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn inverted_index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn total_documents(&self) -> usize {
        self.index.total_documents()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn last_search_stats(&self) -> SearchStats {
        self.last_search
    }

    pub fn oram_stats(&self) -> crate::oram::ring::OramStats {
        self.storage.oram_stats()
    }

    fn alloc_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn alloc_doc_id(&mut self) -> DocId {
        let id = DocId(self.next_doc_id);
        self.next_doc_id += 1;
        id
    }

    fn save_node(&mut self, node: &Node) -> Result<()> {
        let bytes = serializer::serialize(node);
        self.storage.store_node(node.id(), &bytes)?;
        self.build_cache.lock().put(node.id(), node.clone());
        self.sealed = false;
        Ok(())
    }

    fn load_node(&mut self, id: NodeId) -> Result<Option<Node>> {
        if !self.sealed {
            if let Some(node) = self.build_cache.lock().get(&id) {
                return Ok(Some(node.clone()));
            }
        }
        match self.storage.read_node(id)? {
            Some(bytes) => Ok(Some(serializer::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn require_node(&mut self, id: NodeId) -> Result<Node> {
        self.load_node(id)?.ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("node {} has no stored data", id.value()),
            )
        })
    }

    fn node_by_path(&mut self, path: LeafPath) -> Result<Option<Node>> {
        match self.storage.access_by_path(path)? {
            Some(bytes) => Ok(Some(serializer::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn detach_node(&mut self, id: NodeId) -> Result<()> {
        self.build_cache.lock().pop(&id);
        self.storage.detach_node(id)?;
        Ok(())
    }

    fn index_document(&mut self, doc: &Document) {
        let mut vector = SparseVector::new(doc.id());
        for (term, &freq) in doc.term_freq() {
            if let Some(term_id) = self.vocab.add_term(term) {
                vector.add_term(term_id, freq as f64);
            }
        }
        self.index.add_document(doc.id(), &vector);
    }

    fn over_capacity(&self, node: &Node) -> bool {
        match node.kind() {
            NodeKind::Leaf => node.documents().len() > self.config.max_capacity,
            NodeKind::Internal => node.children().len() > self.config.max_capacity,
        }
    }

    /// Largest single-term TF-IDF achievable anywhere in a subtree with the
    /// given tf_max summary.
    fn subtree_text_bound(&self, tf_max: &std::collections::BTreeMap<String, i32>) -> f64 {
        let total_docs = self.index.total_documents();
        let mut bound: f64 = 0.0;
        for (term, &tf) in tf_max {
            let Some(term_id) = self.vocab.term_id(term) else {
                continue;
            };
            let df = self.index.document_frequency(term_id);
            if df == 0 {
                continue;
            }
            bound = bound.max(tf_idf_weight(tf, df, total_docs));
        }
        bound
    }

    /// Upper-bound relevance of a node against the query, used to rank
    /// candidates in the best-first queue.
    fn node_relevance(&self, node: &Node, keywords: &[String], scope: &Mbr, alpha: f64) -> f64 {
        let spatial = spatial_relevance(node.mbr(), scope);
        if spatial == 0.0 {
            return 0.0;
        }

        let total_docs = self.index.total_documents();
        let mut text_upper = 0.0;
        let mut contributors = 0;
        for keyword in keywords {
            let tf_max = node.max_term_frequency(keyword);
            if tf_max == 0 {
                continue;
            }
            let Some(term_id) = self.vocab.term_id(keyword) else {
                continue;
            };
            let df = self.index.document_frequency(term_id);
            if df == 0 {
                continue;
            }
            text_upper += tf_idf_weight(tf_max, df, total_docs);
            contributors += 1;
        }
        if contributors == 0 {
            return 0.0;
        }
        text_upper = (text_upper / keywords.len() as f64).min(1.0);
        joint_relevance(text_upper, spatial, alpha)
    }

    /// Descends from the root picking, at each internal node, the child
    /// whose cached MBR needs the least area expansion to cover `mbr`; ties
    /// go to the smaller current area.
    fn choose_leaf(&mut self, mbr: &Mbr) -> Result<NodeId> {
        let mut current_id = self.root_id;
        let mut current = self.require_node(current_id)?;

        while current.is_internal() {
            let mut best: Option<(NodeId, f64, f64)> = None;
            for child in current.children() {
                let Some(child_mbr) = current.child_mbr(child.id) else {
                    continue;
                };
                let area = child_mbr.area();
                let mut expanded = child_mbr.clone();
                expanded.expand(mbr);
                let expansion = expanded.area() - area;

                let replace = match best {
                    None => true,
                    Some((_, best_expansion, best_area)) => {
                        expansion < best_expansion
                            || (expansion == best_expansion && area < best_area)
                    }
                };
                if replace {
                    best = Some((child.id, expansion, area));
                }
            }
            let Some((next_id, _, _)) = best else { break };
            current_id = next_id;
            current = self.require_node(current_id)?;
        }

        Ok(current_id)
    }

    /// Inserts a single document: global index, leaf placement, summary
    /// refresh, and splits as needed. Duplicate inserts are not deduplicated.
    pub fn insert_document(&mut self, text: &str, location: Mbr) -> Result<DocId> {
        if location.dimensions() != self.config.dimensions {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!(
                    "document has {} dimensions, tree has {}",
                    location.dimensions(),
                    self.config.dimensions
                ),
            ));
        }

        let doc_id = self.alloc_doc_id();
        let doc = Document::new(doc_id, location, text);
        self.index_document(&doc);

        let leaf_id = self.choose_leaf(doc.location())?;
        let mut leaf = self.require_node(leaf_id)?;
        leaf.add_document(doc)?;
        self.save_node(&leaf)?;

        self.adjust_tree(leaf_id)?;

        let root = self.require_node(self.root_id)?;
        if self.over_capacity(&root) {
            self.split_node(self.root_id)?;
        }

        Ok(doc_id)
    }

    /// Refreshes a node's summaries and splits it if it overflowed. Does
    /// not ascend past the split level: bulk load builds the upper levels
    /// directly, so insert-induced cascades do not occur in practice.
    fn adjust_tree(&mut self, id: NodeId) -> Result<()> {
        let mut node = self.require_node(id)?;
        node.update_summary();
        self.save_node(&node)?;
        if self.over_capacity(&node) {
            self.split_node(id)?;
        }
        Ok(())
    }

    fn split_node(&mut self, id: NodeId) -> Result<()> {
        let node = self.require_node(id)?;
        if !self.over_capacity(&node) {
            return Ok(());
        }
        log::debug!(
            "splitting node {} at level {} ({} entries)",
            id.value(),
            node.level(),
            if node.is_leaf() {
                node.documents().len()
            } else {
                node.children().len()
            }
        );
        match node.kind() {
            NodeKind::Leaf => self.split_leaf(node),
            NodeKind::Internal => self.split_internal(node),
        }
    }

    fn split_leaf(&mut self, node: Node) -> Result<()> {
        let mut docs = node.documents().to_vec();
        docs.sort_by(|a, b| a.location().x_center().total_cmp(&b.location().x_center()));
        let split_at = docs.len() / 2;
        let right_docs = docs.split_off(split_at);

        let mut left = Node::new(
            self.alloc_node_id(),
            NodeKind::Leaf,
            node.level(),
            docs[0].location().clone(),
        );
        for doc in docs {
            left.add_document(doc)?;
        }
        let mut right = Node::new(
            self.alloc_node_id(),
            NodeKind::Leaf,
            node.level(),
            right_docs[0].location().clone(),
        );
        for doc in right_docs {
            right.add_document(doc)?;
        }
        self.save_node(&left)?;
        self.save_node(&right)?;

        if node.id() == self.root_id {
            self.grow_root(node, left, right)?;
        }
        Ok(())
    }

    fn split_internal(&mut self, node: Node) -> Result<()> {
        let mut entries = node.children().to_vec();
        entries.sort_by(|a, b| a.mbr.x_center().total_cmp(&b.mbr.x_center()));
        let split_at = entries.len() / 2;
        let right_entries = entries.split_off(split_at);

        let left = self.new_internal_from(node.level(), entries, &node)?;
        let right = self.new_internal_from(node.level(), right_entries, &node)?;

        if node.id() == self.root_id {
            self.grow_root(node, left, right)?;
        }
        Ok(())
    }

    /// Builds one half of an internal split, carrying over the old parent's
    /// per-child caches for the entries that moved.
    fn new_internal_from(
        &mut self,
        level: i32,
        entries: Vec<ChildEntry>,
        old_parent: &Node,
    ) -> Result<Node> {
        let mut half = Node::new(
            self.alloc_node_id(),
            NodeKind::Internal,
            level,
            entries[0].mbr.clone(),
        );
        for entry in entries {
            let child_id = entry.id;
            half.add_child_entry(entry)?;
            half.set_child_text_bound(child_id, old_parent.child_text_bound(child_id));
            if let Some(path) = old_parent.child_path(child_id) {
                half.set_child_path(child_id, path);
            }
        }
        self.save_node(&half)?;
        Ok(half)
    }

    /// Root split: a new internal root adopts the two halves and the old
    /// root's block is dereferenced from storage.
    fn grow_root(&mut self, old_root: Node, left: Node, right: Node) -> Result<()> {
        let mut root_mbr = left.mbr().clone();
        root_mbr.expand(right.mbr());

        let mut new_root = Node::new(
            self.alloc_node_id(),
            NodeKind::Internal,
            old_root.level() + 1,
            root_mbr,
        );
        new_root.add_child(&left)?;
        new_root.add_child(&right)?;
        let left_bound = self.subtree_text_bound(left.tf_max());
        let right_bound = self.subtree_text_bound(right.tf_max());
        new_root.set_child_text_bound(left.id(), left_bound);
        new_root.set_child_text_bound(right.id(), right_bound);
        self.save_node(&new_root)?;

        self.root_id = new_root.id();
        self.detach_node(old_root.id())?;
        log::debug!(
            "root split: node {} replaced by {}",
            old_root.id().value(),
            new_root.id().value()
        );
        Ok(())
    }

    /// Bottom-up bulk build from `(text, longitude, latitude)` records:
    /// documents and the global index first, then leaves packed along the
    /// x-axis, then each upper level, and finally the seal step that moves
    /// the finished tree behind the recursive position map.
    pub fn bulk_insert(&mut self, records: Vec<(String, f64, f64)>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        if self.config.dimensions != 2 {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                "bulk records carry 2-dimensional coordinates",
            ));
        }

        let mut docs = Vec::with_capacity(records.len());
        for (text, lon, lat) in records {
            let location = Mbr::around_point(&[lon, lat], self.config.point_epsilon);
            let doc = Document::new(self.alloc_doc_id(), location, text);
            docs.push(doc);
        }
        for doc in &docs {
            self.index_document(doc);
        }

        docs.sort_by(|a, b| a.location().x_center().total_cmp(&b.location().x_center()));

        let mut level_nodes: Vec<Node> = Vec::new();
        for chunk in docs.chunks(self.config.max_capacity) {
            let mut leaf = Node::new(
                self.alloc_node_id(),
                NodeKind::Leaf,
                0,
                chunk[0].location().clone(),
            );
            for doc in chunk {
                leaf.add_document(doc.clone())?;
            }
            self.save_node(&leaf)?;
            level_nodes.push(leaf);
        }
        let doc_count = docs.len();
        log::info!(
            "bulk build: {} documents packed into {} leaves",
            doc_count,
            level_nodes.len()
        );

        let mut level = 1;
        while level_nodes.len() > 1 {
            level_nodes.sort_by(|a, b| a.mbr().x_center().total_cmp(&b.mbr().x_center()));
            let mut next_level = Vec::new();
            for chunk in level_nodes.chunks(self.config.max_capacity) {
                let mut parent = Node::new(
                    self.alloc_node_id(),
                    NodeKind::Internal,
                    level,
                    chunk[0].mbr().clone(),
                );
                for child in chunk {
                    parent.add_child(child)?;
                }
                for child in chunk {
                    let bound = self.subtree_text_bound(child.tf_max());
                    parent.set_child_text_bound(child.id(), bound);
                }
                self.save_node(&parent)?;
                next_level.push(parent);
            }
            level_nodes = next_level;
            level += 1;
        }

        self.root_id = level_nodes[0].id();
        self.seal()?;
        log::info!("bulk build complete: root node {}", self.root_id.value());
        Ok(doc_count)
    }

    /// Bulk-loads `text|longitude|latitude` lines. Blank lines are ignored
    /// and malformed lines are skipped.
    pub fn bulk_insert_from_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let mut records = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(3, '|');
            let (Some(text), Some(lon), Some(lat)) = (parts.next(), parts.next(), parts.next())
            else {
                log::debug!("skipping malformed bulk line: {:?}", line);
                continue;
            };
            let (Ok(lon), Ok(lat)) = (lon.trim().parse::<f64>(), lat.trim().parse::<f64>())
            else {
                log::debug!("skipping bulk line with bad coordinates: {:?}", line);
                continue;
            };
            records.push((text.to_string(), lon, lat));
        }
        self.bulk_insert(records)
    }

    /// Flushes the build cache and rebuilds the recursive position map:
    /// every node gets a fresh random leaf path, children's paths are
    /// recorded in their parent before the parent is written at its own
    /// path, and the root path is persisted.
    pub fn seal(&mut self) -> Result<()> {
        self.build_cache.lock().clear();
        self.storage.reset_recursive_map();
        let root_path = self.assign_path_recursively(self.root_id)?;
        self.storage.set_root_path(root_path)?;
        self.sealed = true;
        log::debug!("tree sealed at root path {}", root_path);
        Ok(())
    }

    fn assign_path_recursively(&mut self, id: NodeId) -> Result<LeafPath> {
        let mut node = self.require_node(id)?;
        let path = self.storage.random_unused_leaf_path()?;
        self.storage.allocate_path(path, id)?;

        if node.is_internal() {
            for child_id in node.child_ids() {
                let child_path = self.assign_path_recursively(child_id)?;
                node.set_child_path(child_id, child_path);
            }
        }

        let bytes = serializer::serialize(&node);
        self.storage.write_by_path(path, &bytes)?;
        Ok(path)
    }

    /// Search with the configured default k and α.
    pub fn search_default(&mut self, keywords: &str, scope: Mbr) -> Result<Vec<SearchHit>> {
        let query = Query::new(
            keywords,
            scope,
            self.config.default_k,
            self.config.default_alpha,
        )?;
        self.search(&query)
    }

    /// Best-first top-k search. The root is fetched by its persisted path;
    /// every further fetch uses the child paths embedded in parents. A
    /// child is only fetched after its cached MBR, keyword set, and score
    /// upper bound all survive pruning.
    pub fn search(&mut self, query: &Query) -> Result<Vec<SearchHit>> {
        if query.scope().dimensions() != self.config.dimensions {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                "query scope dimensionality does not match the tree",
            ));
        }
        if query.keywords().is_empty() {
            return Ok(Vec::new());
        }
        if !self.sealed {
            self.seal()?;
        }

        self.last_search = SearchStats::default();

        let Some(root_path) = self.storage.root_path()? else {
            return Ok(Vec::new());
        };
        let Some(root) = self.node_by_path(root_path)? else {
            return Ok(Vec::new());
        };

        let alpha = query.alpha();
        let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
        let mut seq: u64 = 0;
        let mut results: Vec<SearchHit> = Vec::new();
        let mut nodes_visited = 0usize;

        let root_score = self.node_relevance(&root, query.keywords(), query.scope(), alpha);
        if root_score > 0.0 {
            queue.push(QueueEntry {
                score: root_score,
                seq,
                item: EntryItem::Node {
                    node: root,
                    path: root_path,
                },
            });
            seq += 1;
        }

        while results.len() < query.k() {
            let Some(entry) = queue.pop() else { break };
            match entry.item {
                EntryItem::Doc { doc_id } => {
                    results.push(SearchHit {
                        doc_id,
                        score: entry.score,
                    });
                }
                EntryItem::Node { node, path: _ } => {
                    nodes_visited += 1;
                    if node.is_leaf() {
                        for doc in node.documents() {
                            if !doc.location().overlaps(query.scope()) {
                                continue;
                            }
                            if !doc.contains_all_terms(query.keywords()) {
                                continue;
                            }
                            let spatial = spatial_relevance(doc.location(), query.scope());
                            let text =
                                text_relevance(doc, query.keywords(), &self.vocab, &self.index);
                            let score = joint_relevance(text, spatial, alpha);
                            queue.push(QueueEntry {
                                score,
                                seq,
                                item: EntryItem::Doc { doc_id: doc.id() },
                            });
                            seq += 1;
                        }
                    } else {
                        for (&child_id, &child_path) in node.child_paths() {
                            let Some(child_mbr) = node.child_mbr(child_id) else {
                                continue;
                            };
                            if !child_mbr.overlaps(query.scope()) {
                                continue;
                            }
                            if !node.child_has_all_keywords(child_id, query.keywords()) {
                                continue;
                            }
                            let spatial_upper = spatial_relevance(child_mbr, query.scope());
                            let text_upper = node.child_text_bound(child_id);
                            let total_upper = joint_relevance(text_upper, spatial_upper, alpha);
                            if total_upper < self.config.prune_threshold {
                                continue;
                            }

                            let child = match self.node_by_path(child_path) {
                                Ok(Some(child)) => child,
                                Ok(None) => continue,
                                Err(err) if err.is_fatal() => return Err(err),
                                Err(err) => {
                                    log::warn!(
                                        "skipping child {} after storage error: {}",
                                        child_id.value(),
                                        err
                                    );
                                    continue;
                                }
                            };
                            let score = self.node_relevance(
                                &child,
                                query.keywords(),
                                query.scope(),
                                alpha,
                            );
                            if score > 0.0 {
                                queue.push(QueueEntry {
                                    score,
                                    seq,
                                    item: EntryItem::Node {
                                        node: child,
                                        path: child_path,
                                    },
                                });
                                seq += 1;
                            }
                        }
                    }
                }
            }
        }

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        results.truncate(query.k());

        let levels = (self.storage.level_count() + 1)
            .saturating_sub(self.storage.cache_levels()) as usize;
        self.last_search = SearchStats {
            nodes_visited,
            oblivious_blocks: nodes_visited * levels,
        };

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OramConfig;

    fn test_config(seed: u64) -> EngineConfig {
        EngineConfig {
            max_capacity: 4,
            min_capacity: 2,
            build_cache_size: 16,
            oram: OramConfig {
                capacity: 512,
                seed: Some(seed),
                ..OramConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn records(points: &[(&str, f64, f64)]) -> Vec<(String, f64, f64)> {
        points
            .iter()
            .map(|&(t, x, y)| (t.to_string(), x, y))
            .collect()
    }

    fn query(keywords: &str, min: [f64; 2], max: [f64; 2], k: usize) -> Query {
        let scope = Mbr::new(min.to_vec(), max.to_vec()).unwrap();
        Query::new(keywords, scope, k, 0.5).unwrap()
    }

    fn city_corpus() -> Vec<(String, f64, f64)> {
        records(&[
            ("coffee shop downtown", 37.77, -122.41),
            ("coffee roaster", 37.78, -122.40),
            ("library central", 37.77, -122.41),
            ("coffee museum annex", 37.79, -122.39),
            ("city park fountain", 37.76, -122.42),
            ("book store coffee corner", 37.775, -122.405),
            ("harbor seafood market", 37.80, -122.38),
            ("night market food stalls", 37.765, -122.415),
            ("university library east wing", 37.785, -122.395),
            ("espresso bar", 37.772, -122.408),
        ])
    }

    #[test]
    fn bulk_build_packs_leaves_within_capacity() {
        let mut tree = IrTree::new(test_config(1)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();
        assert!(tree.is_sealed());

        // Walk the tree by id and check the bulk-build invariants.
        let root = tree.require_node(tree.root_id).unwrap();
        assert!(root.is_internal());
        let mut stack = vec![tree.root_id];
        let mut docs_seen = 0;
        while let Some(id) = stack.pop() {
            let node = tree.require_node(id).unwrap();
            match node.kind() {
                NodeKind::Leaf => {
                    assert!(node.documents().len() <= tree.config.max_capacity);
                    for doc in node.documents() {
                        assert!(node.mbr().contains(doc.location()));
                        docs_seen += 1;
                    }
                }
                NodeKind::Internal => {
                    assert!(node.children().len() <= tree.config.max_capacity);
                    for child in node.children() {
                        let cached = node.child_mbr(child.id).unwrap();
                        assert!(node.mbr().contains(cached));
                        stack.push(child.id);
                    }
                }
            }
        }
        assert_eq!(docs_seen, 10);
    }

    #[test]
    fn summaries_match_descendant_documents() {
        let mut tree = IrTree::new(test_config(2)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();

        let root = tree.require_node(tree.root_id).unwrap();
        // Four documents mention coffee, each exactly once.
        assert_eq!(root.document_frequency("coffee"), 4);
        assert_eq!(root.max_term_frequency("coffee"), 1);
        assert_eq!(root.document_frequency("library"), 2);
        assert_eq!(root.document_count(), 10);
    }

    #[test]
    fn search_finds_matching_documents() {
        let mut tree = IrTree::new(test_config(3)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();

        let hits = tree
            .search(&query("coffee", [37.76, -122.42], [37.79, -122.39], 10))
            .unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|h| h.score > 0.0));
        // Descending scores, deterministic ties.
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn search_respects_k() {
        let mut tree = IrTree::new(test_config(4)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();
        let hits = tree
            .search(&query("coffee", [37.76, -122.42], [37.79, -122.39], 2))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn search_requires_every_keyword() {
        let mut tree = IrTree::new(test_config(5)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();
        let hits = tree
            .search(&query("coffee book", [37.76, -122.42], [37.79, -122.39], 10))
            .unwrap();
        // Only "book store coffee corner" carries both terms.
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn disjoint_scope_returns_nothing() {
        let mut tree = IrTree::new(test_config(6)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();
        let hits = tree
            .search(&query("coffee", [40.0, -74.0], [40.1, -73.9], 5))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn unknown_keyword_returns_nothing() {
        let mut tree = IrTree::new(test_config(7)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();
        let hits = tree
            .search(&query("zeppelin", [37.76, -122.42], [37.79, -122.39], 5))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn search_before_any_insert_is_empty() {
        let mut tree = IrTree::new(test_config(8)).unwrap();
        let hits = tree
            .search(&query("coffee", [0.0, 0.0], [1.0, 1.0], 5))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn insert_grows_and_splits() {
        let mut tree = IrTree::new(test_config(9)).unwrap();
        for i in 0..12 {
            let x = i as f64;
            let location = Mbr::around_point(&[x, 0.0], 0.001);
            tree.insert_document(&format!("poi number {}", i), location)
                .unwrap();
        }
        let root = tree.require_node(tree.root_id).unwrap();
        assert!(root.is_internal());

        let hits = tree
            .search(&query("poi", [-1.0, -1.0], [12.0, 1.0], 20))
            .unwrap();
        assert_eq!(hits.len(), 12);
    }

    #[test]
    fn duplicate_insert_duplicates_postings() {
        let mut tree = IrTree::new(test_config(10)).unwrap();
        let location = Mbr::around_point(&[1.0, 1.0], 0.001);
        tree.insert_document("twin kiosk", location.clone()).unwrap();
        tree.insert_document("twin kiosk", location).unwrap();

        let term_id = tree.vocabulary().term_id("twin").unwrap();
        assert_eq!(tree.inverted_index().postings(term_id).len(), 2);
        assert_eq!(tree.total_documents(), 2);

        let hits = tree
            .search(&query("twin", [0.0, 0.0], [2.0, 2.0], 10))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn insert_after_seal_reseals_on_next_search() {
        let mut tree = IrTree::new(test_config(11)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();
        assert!(tree.is_sealed());

        tree.insert_document("late coffee cart", Mbr::around_point(&[37.775, -122.41], 0.001))
            .unwrap();
        assert!(!tree.is_sealed());

        let hits = tree
            .search(&query("coffee", [37.76, -122.42], [37.79, -122.39], 10))
            .unwrap();
        assert!(tree.is_sealed());
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let mut tree = IrTree::new(test_config(12)).unwrap();
        let err = tree
            .insert_document("flatland", Mbr::new(vec![0.0], vec![1.0]).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);

        let scope = Mbr::new(vec![0.0], vec![1.0]).unwrap();
        let q = Query::new("coffee", scope, 1, 0.5).unwrap();
        assert!(tree.search(&q).is_err());
    }

    #[test]
    fn default_search_uses_configured_k_and_alpha() {
        let mut tree = IrTree::new(test_config(15)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();
        let scope = Mbr::new(vec![37.76, -122.42], vec![37.79, -122.39]).unwrap();
        let hits = tree.search_default("coffee", scope).unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn search_records_stats() {
        let mut tree = IrTree::new(test_config(13)).unwrap();
        tree.bulk_insert(city_corpus()).unwrap();
        tree.search(&query("coffee", [37.76, -122.42], [37.79, -122.39], 10))
            .unwrap();
        let stats = tree.last_search_stats();
        assert!(stats.nodes_visited > 0);
        assert!(stats.oblivious_blocks >= stats.nodes_visited);
    }

    #[test]
    fn bulk_insert_from_file_parses_and_skips_malformed() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "coffee shop|1.0|2.0").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "no coordinates here").unwrap();
        writeln!(file, "bad numbers|x|y").unwrap();
        writeln!(file, "tea house|1.5|2.5").unwrap();
        file.flush().unwrap();

        let mut tree = IrTree::new(test_config(14)).unwrap();
        let loaded = tree.bulk_insert_from_file(file.path()).unwrap();
        assert_eq!(loaded, 2);

        let hits = tree
            .search(&query("tea", [1.0, 2.0], [2.0, 3.0], 5))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
