//! The Ring-ORAM protocol: position map, stash, read-path, early-reshuffle
//! and evict-path.
//!
//! The bucket positions touched on the host depend only on the public
//! counters and on leaves drawn uniformly inside the trusted region, never
//! on the logical block being accessed. Randomness consumption is likewise
//! data-independent, so two instances seeded identically produce identical
//! host traces for workloads of equal length.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::config::OramConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::LeafPath;
use crate::oram::block::{Block, DUMMY_INDEX};
use crate::oram::bucket::{shuffle_blocks, Bucket, BUCKET_BLOB_SIZE};
use crate::oram::crypto::{CryptoCore, IV_SIZE, TAG_SIZE};
use crate::storage::host::HostStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    Read,
    Write,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OramStats {
    pub host_reads: u64,
    pub host_writes: u64,
    pub evictions: u64,
    pub reshuffles: u64,
}

pub struct RingOram<H: HostStorage> {
    host: H,
    crypto: CryptoCore,
    rng: StdRng,

    capacity: usize,
    level_count: u32,
    num_leaves: u32,
    real_slots: usize,
    dummy_slots: usize,
    evict_round: u32,
    cache_levels: u32,

    position_map: Vec<LeafPath>,
    stash: Vec<Block>,
    round: u32,
    evict_counter: u64,

    stats: OramStats,
}

impl<H: HostStorage> RingOram<H> {
    pub fn new(config: &OramConfig, host: H) -> Result<Self> {
        config.validate()?;

        // L = ceil(log2 N); the bucket tree has 2^(L+1)-1 nodes.
        let level_count = config.capacity.next_power_of_two().trailing_zeros();
        let num_leaves: u32 = 1 << level_count;
        let num_buckets: u32 = (1 << (level_count + 1)) - 1;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let position_map = (0..config.capacity)
            .map(|_| rng.gen_range(0..num_leaves))
            .collect();

        let mut oram = RingOram {
            host,
            crypto: CryptoCore::new()?,
            rng,
            capacity: config.capacity,
            level_count,
            num_leaves,
            real_slots: config.real_slots,
            dummy_slots: config.dummy_slots,
            evict_round: config.evict_round,
            cache_levels: config.cache_levels,
            position_map,
            stash: Vec::new(),
            round: 0,
            evict_counter: 0,
            stats: OramStats::default(),
        };

        let empty = Bucket::empty(oram.real_slots, oram.dummy_slots);
        let blob = empty.encode()?;
        for position in 0..num_buckets {
            oram.host.write_bucket(position, &blob)?;
        }
        log::debug!(
            "ring oram initialized: capacity={} levels={} leaves={} buckets={}",
            oram.capacity,
            level_count + 1,
            num_leaves,
            num_buckets
        );

        Ok(oram)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_leaves(&self) -> u32 {
        self.num_leaves
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn cache_levels(&self) -> u32 {
        self.cache_levels
    }

    pub fn stats(&self) -> OramStats {
        self.stats
    }

    pub fn stash_len(&self) -> usize {
        self.stash.len()
    }

    /// A uniformly random leaf, drawn from the instance RNG.
    pub fn random_leaf(&mut self) -> LeafPath {
        self.rng.gen_range(0..self.num_leaves)
    }

    /// Bucket index of level `level` on the path to `leaf`.
    fn path_bucket(&self, leaf: LeafPath, level: u32) -> u32 {
        (1 << level) - 1 + (leaf >> (self.level_count - level))
    }

    fn level_of_position(position: u32) -> u32 {
        (position + 1).ilog2()
    }

    fn fetch_bucket(&mut self, position: u32) -> Result<Bucket> {
        self.stats.host_reads += 1;
        let blob = self.host.read_bucket(position)?;
        Bucket::decode(&blob)
    }

    fn store_bucket(&mut self, position: u32, bucket: &Bucket) -> Result<()> {
        self.stats.host_writes += 1;
        let blob = bucket.encode()?;
        self.host.write_bucket(position, &blob)
    }

    /// Decrypts every valid real block of the bucket into the stash.
    fn read_bucket(&mut self, position: u32) -> Result<()> {
        let bucket = self.fetch_bucket(position)?;
        self.spill_into_stash(&bucket)?;
        Ok(())
    }

    fn spill_into_stash(&mut self, bucket: &Bucket) -> Result<()> {
        for (slot, block) in bucket.blocks.iter().enumerate() {
            if bucket.ptrs[slot] != DUMMY_INDEX && bucket.valids[slot] == 1 && !block.is_dummy() {
                let plaintext = self.crypto.decrypt(&block.data)?;
                self.stash.push(Block::new(block.leaf, block.index, plaintext));
            }
        }
        Ok(())
    }

    /// Greedily drains up to Z stash blocks whose path crosses `position`,
    /// encrypts them, pads with fresh dummies, shuffles the slot order and
    /// ships the rebuilt bucket to the host. Selection stays within the
    /// fixed blob size; a block that would not fit is left in the stash for
    /// a later bucket.
    fn write_bucket(&mut self, position: u32) -> Result<()> {
        let level = Self::level_of_position(position);
        let slots = self.real_slots + self.dummy_slots;
        // Header, per-slot block headers, and the ptr/valid arrays all come
        // out of the blob before any payload does.
        let payload_budget = BUCKET_BLOB_SIZE.saturating_sub(16 + slots * 12 + slots * 8);

        let mut outgoing: Vec<Block> = Vec::with_capacity(self.real_slots);
        let mut payload_used = 0usize;
        let mut i = 0;
        while i < self.stash.len() && outgoing.len() < self.real_slots {
            if self.path_bucket(self.stash[i].leaf, level) == position {
                let ciphertext_len = self.stash[i].data.len() + IV_SIZE + TAG_SIZE;
                if payload_used + ciphertext_len > payload_budget {
                    i += 1;
                    continue;
                }
                payload_used += ciphertext_len;
                let block = self.stash.swap_remove(i);
                let ciphertext = self.crypto.encrypt(&block.data)?;
                outgoing.push(Block::new(block.leaf, block.index, ciphertext));
            } else {
                i += 1;
            }
        }

        while outgoing.len() < slots {
            outgoing.push(Block::dummy());
        }
        shuffle_blocks(&mut outgoing, &mut self.rng);

        let mut bucket = Bucket::empty(self.real_slots, self.dummy_slots);
        bucket.refill(outgoing);
        self.store_bucket(position, &bucket)
    }

    /// Touches every level of the path to `leaf` exactly once: the matching
    /// slot is taken where the block lives, a random dummy slot everywhere
    /// else, and each visited slot is invalidated. The traversal shape is
    /// identical whether or not the block is found.
    fn read_path(&mut self, leaf: LeafPath, index: i32) -> Result<Block> {
        let mut interest = Block::dummy();
        for level in 0..=self.level_count {
            let position = self.path_bucket(leaf, level);
            let mut bucket = self.fetch_bucket(position)?;

            // One RNG draw per level regardless of where the block is.
            let random: u32 = self.rng.gen();
            let slot = match bucket.slot_of(index) {
                Some(slot) => slot,
                None => bucket.pick_dummy_slot(random).ok_or_else(|| {
                    Error::new(
                        ErrorKind::CapacityExceeded,
                        format!("bucket {} has no spare dummy slot", position),
                    )
                })?,
            };

            let block = bucket.blocks[slot].clone();
            bucket.valids[slot] = 0;
            bucket.count += 1;
            self.store_bucket(position, &bucket)?;

            if block.index == index {
                interest = block;
            }
        }
        Ok(interest)
    }

    /// Rebuilds any bucket on the path to `leaf` that has served S reads
    /// since its last reshuffle, restoring its full complement of dummies.
    fn early_reshuffle(&mut self, leaf: LeafPath) -> Result<()> {
        for level in 0..=self.level_count {
            let position = self.path_bucket(leaf, level);
            let bucket = self.fetch_bucket(position)?;
            if bucket.count as usize >= self.dummy_slots {
                self.spill_into_stash(&bucket)?;
                self.write_bucket(position)?;
                self.stats.reshuffles += 1;
            }
        }
        Ok(())
    }

    /// Deterministic eviction: reads a whole path into the stash, then
    /// writes it back bottom-up, draining the stash.
    fn evict_path(&mut self) -> Result<()> {
        let leaf = (self.evict_counter % u64::from(self.num_leaves)) as LeafPath;
        self.evict_counter += 1;

        for level in 0..=self.level_count {
            self.read_bucket(self.path_bucket(leaf, level))?;
        }
        for level in (0..=self.level_count).rev() {
            self.write_bucket(self.path_bucket(leaf, level))?;
        }
        self.stats.evictions += 1;
        Ok(())
    }

    /// The single entry point: remap the block to a fresh random leaf, read
    /// its old path, update or fetch the payload, restash, and run the
    /// scheduled eviction and reshuffle steps.
    pub fn access(&mut self, index: usize, op: AccessOp, data: Option<Vec<u8>>) -> Result<Vec<u8>> {
        if index >= self.capacity {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("block index {} out of range 0..{}", index, self.capacity),
            ));
        }

        let old_leaf = self.position_map[index];
        let new_leaf = self.random_leaf();
        self.position_map[index] = new_leaf;

        let block_index = index as i32;
        let found = self.read_path(old_leaf, block_index)?;

        let mut current = if found.index == block_index {
            self.crypto.decrypt(&found.data)?
        } else {
            match self.stash.iter().position(|b| b.index == block_index) {
                Some(slot) => self.stash.swap_remove(slot).data,
                // Never written: reads observe an empty payload.
                None => Vec::new(),
            }
        };

        if op == AccessOp::Write {
            current = data.unwrap_or_default();
        }
        self.stash
            .push(Block::new(new_leaf, block_index, current.clone()));

        self.round = (self.round + 1) % self.evict_round;
        if self.round == 0 {
            self.evict_path()?;
        }
        self.early_reshuffle(old_leaf)?;

        Ok(current)
    }
}
