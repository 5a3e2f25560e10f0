//! Bridge between logical tree nodes and ORAM blocks.
//!
//! Three tables live in the trusted region: node id → block for build-time
//! reads and writes, path ↔ block for the recursive position map used by
//! search, and path → node id for verification. The only persisted value is
//! the root path, kept in the reserved block that is this store's first
//! allocation.

use std::collections::HashMap;

use crate::core::config::OramConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{LeafPath, NodeId};
use crate::oram::ring::{AccessOp, OramStats, RingOram};
use crate::storage::host::HostStorage;

pub struct OramStorage<H: HostStorage> {
    oram: RingOram<H>,
    capacity: usize,
    next_block: usize,

    node_to_block: HashMap<NodeId, usize>,
    path_to_block: HashMap<LeafPath, usize>,
    block_to_path: HashMap<usize, LeafPath>,
    path_to_node: HashMap<LeafPath, NodeId>,

    root_path: Option<LeafPath>,
    root_path_block: usize,
}

impl<H: HostStorage> OramStorage<H> {
    pub fn new(config: &OramConfig, host: H) -> Result<Self> {
        let oram = RingOram::new(config, host)?;
        let mut store = OramStorage {
            oram,
            capacity: config.capacity,
            next_block: 0,
            node_to_block: HashMap::new(),
            path_to_block: HashMap::new(),
            block_to_path: HashMap::new(),
            path_to_node: HashMap::new(),
            root_path: None,
            root_path_block: 0,
        };
        // The first allocation is reserved for the persisted root path.
        store.root_path_block = store.allocate_block()?;
        Ok(store)
    }

    fn allocate_block(&mut self) -> Result<usize> {
        if self.next_block >= self.capacity {
            return Err(Error::new(
                ErrorKind::CapacityExceeded,
                format!("all {} oram blocks are allocated", self.capacity),
            ));
        }
        let block = self.next_block;
        self.next_block += 1;
        Ok(block)
    }

    /// Writes a node's serialized form into a freshly allocated block and
    /// records the id mapping. Re-storing an id supersedes the old block,
    /// which simply drifts out of reach during later evictions.
    pub fn store_node(&mut self, id: NodeId, bytes: &[u8]) -> Result<()> {
        let block = self.allocate_block()?;
        self.node_to_block.insert(id, block);
        self.oram.access(block, AccessOp::Write, Some(bytes.to_vec()))?;
        Ok(())
    }

    /// `Ok(None)` when the id has no mapping or its block holds an empty
    /// payload; that is a soft miss, not an error.
    pub fn read_node(&mut self, id: NodeId) -> Result<Option<Vec<u8>>> {
        let Some(&block) = self.node_to_block.get(&id) else {
            return Ok(None);
        };
        let data = self.oram.access(block, AccessOp::Read, None)?;
        Ok(if data.is_empty() { None } else { Some(data) })
    }

    /// Overwrites the node's block with an empty payload and drops the id
    /// mapping; used when a split dereferences the old root.
    pub fn detach_node(&mut self, id: NodeId) -> Result<bool> {
        match self.node_to_block.remove(&id) {
            Some(block) => {
                self.oram.access(block, AccessOp::Write, Some(Vec::new()))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn stored_node_count(&self) -> usize {
        self.node_to_block.len()
    }

    /// A random leaf path not yet claimed by the recursive position map.
    pub fn random_unused_leaf_path(&mut self) -> Result<LeafPath> {
        let attempts = (self.oram.num_leaves() as usize).saturating_mul(4).max(64);
        for _ in 0..attempts {
            let path = self.oram.random_leaf();
            if !self.path_to_block.contains_key(&path) {
                return Ok(path);
            }
        }
        Err(Error::new(
            ErrorKind::CapacityExceeded,
            "no free leaf path for recursive position map",
        ))
    }

    /// Claims a block for `path` and records which node lives there.
    pub fn allocate_path(&mut self, path: LeafPath, node: NodeId) -> Result<()> {
        if self.path_to_block.contains_key(&path) {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("path {} is already mapped", path),
            ));
        }
        let block = self.allocate_block()?;
        self.path_to_block.insert(path, block);
        self.block_to_path.insert(block, path);
        self.path_to_node.insert(path, node);
        Ok(())
    }

    pub fn write_by_path(&mut self, path: LeafPath, bytes: &[u8]) -> Result<()> {
        let Some(&block) = self.path_to_block.get(&path) else {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("path {} has no allocated block", path),
            ));
        };
        self.oram.access(block, AccessOp::Write, Some(bytes.to_vec()))?;
        Ok(())
    }

    /// Path-addressed read used by search; `Ok(None)` on unmapped paths.
    pub fn access_by_path(&mut self, path: LeafPath) -> Result<Option<Vec<u8>>> {
        let Some(&block) = self.path_to_block.get(&path) else {
            return Ok(None);
        };
        let data = self.oram.access(block, AccessOp::Read, None)?;
        Ok(if data.is_empty() { None } else { Some(data) })
    }

    pub fn node_id_by_path(&self, path: LeafPath) -> Option<NodeId> {
        self.path_to_node.get(&path).copied()
    }

    /// Forgets every path mapping so the recursive position map can be
    /// rebuilt. The abandoned blocks stay in the tree and drift out.
    pub fn reset_recursive_map(&mut self) {
        self.path_to_block.clear();
        self.block_to_path.clear();
        self.path_to_node.clear();
        self.root_path = None;
    }

    pub fn set_root_path(&mut self, path: LeafPath) -> Result<()> {
        self.root_path = Some(path);
        let bytes = (path as i32).to_le_bytes().to_vec();
        self.oram
            .access(self.root_path_block, AccessOp::Write, Some(bytes))?;
        Ok(())
    }

    /// The persisted root path, reloaded from the reserved block when not
    /// already in memory.
    pub fn root_path(&mut self) -> Result<Option<LeafPath>> {
        if let Some(path) = self.root_path {
            return Ok(Some(path));
        }
        let data = self.oram.access(self.root_path_block, AccessOp::Read, None)?;
        if data.len() < 4 {
            return Ok(None);
        }
        let path = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if path < 0 {
            return Ok(None);
        }
        self.root_path = Some(path as LeafPath);
        Ok(self.root_path)
    }

    pub fn oram_stats(&self) -> OramStats {
        self.oram.stats()
    }

    pub fn level_count(&self) -> u32 {
        self.oram.level_count()
    }

    pub fn cache_levels(&self) -> u32 {
        self.oram.cache_levels()
    }
}
