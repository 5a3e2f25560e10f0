use rand::Rng;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::LeafPath;
use crate::oram::block::{Block, DUMMY_INDEX};

/// Every bucket crosses the host boundary as a blob of exactly this size.
/// Two buckets of the same shape must be indistinguishable, so the unused
/// tail is always zero.
pub const BUCKET_BLOB_SIZE: usize = 4096;

/// A Ring-ORAM tree node: Z real slots plus S dummy slots, per-slot block
/// pointers and validity bits, and a counter of reads since the last
/// reshuffle.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub real_slots: usize,
    pub dummy_slots: usize,
    pub count: u32,
    pub blocks: Vec<Block>,
    pub ptrs: Vec<i32>,
    pub valids: Vec<u8>,
}

impl Bucket {
    pub fn empty(real_slots: usize, dummy_slots: usize) -> Self {
        let slots = real_slots + dummy_slots;
        Bucket {
            real_slots,
            dummy_slots,
            count: 0,
            blocks: vec![Block::dummy(); slots],
            ptrs: vec![DUMMY_INDEX; slots],
            valids: vec![1; slots],
        }
    }

    pub fn slots(&self) -> usize {
        self.real_slots + self.dummy_slots
    }

    /// The slot holding the still-valid block with the given logical index.
    pub fn slot_of(&self, index: i32) -> Option<usize> {
        (0..self.slots()).find(|&i| self.ptrs[i] == index && self.valids[i] == 1)
    }

    /// Picks among the still-valid dummy slots using the supplied random
    /// word. Callers draw the word unconditionally so the amount of
    /// randomness consumed never depends on whether a real slot matched.
    pub fn pick_dummy_slot(&self, random: u32) -> Option<usize> {
        let candidates: Vec<usize> = (0..self.slots())
            .filter(|&i| self.ptrs[i] == DUMMY_INDEX && self.valids[i] == 1)
            .collect();
        if candidates.is_empty() {
            None
        } else {
            Some(candidates[random as usize % candidates.len()])
        }
    }

    /// Rebuilds this bucket around the given blocks: slot pointers mirror
    /// the block indices, every slot becomes valid, and the read counter
    /// resets.
    pub fn refill(&mut self, blocks: Vec<Block>) {
        debug_assert_eq!(blocks.len(), self.slots());
        self.ptrs = blocks.iter().map(|b| b.index).collect();
        self.valids = vec![1; blocks.len()];
        self.count = 0;
        self.blocks = blocks;
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(BUCKET_BLOB_SIZE);
        put_i32(&mut buf, self.real_slots as i32);
        put_i32(&mut buf, self.dummy_slots as i32);
        put_i32(&mut buf, self.count as i32);
        put_i32(&mut buf, self.blocks.len() as i32);
        for block in &self.blocks {
            put_i32(&mut buf, block.leaf as i32);
            put_i32(&mut buf, block.index);
            put_i32(&mut buf, block.data.len() as i32);
            buf.extend_from_slice(&block.data);
        }
        for &ptr in &self.ptrs {
            put_i32(&mut buf, ptr);
        }
        for &valid in &self.valids {
            put_i32(&mut buf, valid as i32);
        }
        if buf.len() > BUCKET_BLOB_SIZE {
            return Err(Error::new(
                ErrorKind::CapacityExceeded,
                format!(
                    "bucket serializes to {} bytes, blob limit is {}",
                    buf.len(),
                    BUCKET_BLOB_SIZE
                ),
            ));
        }
        buf.resize(BUCKET_BLOB_SIZE, 0);
        Ok(buf)
    }

    pub fn decode(blob: &[u8]) -> Result<Bucket> {
        let mut offset = 0usize;
        let real_slots = read_i32(blob, &mut offset)?;
        let dummy_slots = read_i32(blob, &mut offset)?;
        let count = read_i32(blob, &mut offset)?;
        let num_blocks = read_i32(blob, &mut offset)?;
        if real_slots < 0 || dummy_slots < 0 || count < 0 || num_blocks < 0 {
            return Err(Error::new(
                ErrorKind::Serialization,
                "negative field in bucket header",
            ));
        }

        let mut blocks = Vec::with_capacity(num_blocks as usize);
        for _ in 0..num_blocks {
            let leaf = read_i32(blob, &mut offset)?;
            let index = read_i32(blob, &mut offset)?;
            let data_size = read_i32(blob, &mut offset)?;
            if data_size < 0 || offset + data_size as usize > blob.len() {
                return Err(Error::new(
                    ErrorKind::Serialization,
                    "block payload overruns bucket blob",
                ));
            }
            let data = blob[offset..offset + data_size as usize].to_vec();
            offset += data_size as usize;
            blocks.push(Block::new(leaf as LeafPath, index, data));
        }

        let slots = (real_slots + dummy_slots) as usize;
        let mut ptrs = Vec::with_capacity(slots);
        for _ in 0..slots {
            ptrs.push(read_i32(blob, &mut offset)?);
        }
        let mut valids = Vec::with_capacity(slots);
        for _ in 0..slots {
            valids.push(read_i32(blob, &mut offset)? as u8);
        }

        if blocks.len() != slots {
            return Err(Error::new(
                ErrorKind::Serialization,
                format!("bucket holds {} blocks for {} slots", blocks.len(), slots),
            ));
        }

        Ok(Bucket {
            real_slots: real_slots as usize,
            dummy_slots: dummy_slots as usize,
            count: count as u32,
            blocks,
            ptrs,
            valids,
        })
    }
}

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn read_i32(blob: &[u8], offset: &mut usize) -> Result<i32> {
    if *offset + 4 > blob.len() {
        return Err(Error::new(
            ErrorKind::Serialization,
            "truncated bucket blob",
        ));
    }
    let value = i32::from_le_bytes([
        blob[*offset],
        blob[*offset + 1],
        blob[*offset + 2],
        blob[*offset + 3],
    ]);
    *offset += 4;
    Ok(value)
}

/// Uniform in-place shuffle with a fixed number of RNG draws.
pub fn shuffle_blocks<R: Rng>(blocks: &mut [Block], rng: &mut R) {
    for i in (1..blocks.len()).rev() {
        let j = rng.gen_range(0..=i);
        blocks.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn empty_bucket_shape() {
        let bucket = Bucket::empty(4, 4);
        assert_eq!(bucket.slots(), 8);
        assert!(bucket.blocks.iter().all(Block::is_dummy));
        assert!(bucket.ptrs.iter().all(|&p| p == DUMMY_INDEX));
        assert!(bucket.valids.iter().all(|&v| v == 1));
    }

    #[test]
    fn codec_round_trip() {
        let mut bucket = Bucket::empty(2, 2);
        let mut blocks = vec![
            Block::new(5, 9, vec![1, 2, 3]),
            Block::new(1, 4, vec![0xFF; 64]),
            Block::dummy(),
            Block::dummy(),
        ];
        shuffle_blocks(&mut blocks, &mut StdRng::seed_from_u64(11));
        bucket.refill(blocks.clone());
        bucket.count = 0;

        let blob = bucket.encode().unwrap();
        assert_eq!(blob.len(), BUCKET_BLOB_SIZE);

        let decoded = Bucket::decode(&blob).unwrap();
        assert_eq!(decoded.real_slots, 2);
        assert_eq!(decoded.dummy_slots, 2);
        assert_eq!(decoded.count, 0);
        assert_eq!(decoded.blocks, blocks);
        assert_eq!(decoded.ptrs, bucket.ptrs);
        assert_eq!(decoded.valids, bucket.valids);
    }

    #[test]
    fn padding_is_zero() {
        let bucket = Bucket::empty(2, 2);
        let blob = bucket.encode().unwrap();
        let used = 16 + 4 * 12 + 8 * 4;
        assert!(blob[used..].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_bucket_is_rejected() {
        let mut bucket = Bucket::empty(1, 1);
        bucket.refill(vec![
            Block::new(0, 0, vec![0xAA; BUCKET_BLOB_SIZE]),
            Block::dummy(),
        ]);
        let err = bucket.encode().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    }

    #[test]
    fn slot_lookup_respects_validity() {
        let mut bucket = Bucket::empty(2, 2);
        bucket.refill(vec![
            Block::new(0, 7, vec![1]),
            Block::dummy(),
            Block::new(0, 9, vec![2]),
            Block::dummy(),
        ]);
        assert_eq!(bucket.slot_of(7), Some(0));
        bucket.valids[0] = 0;
        assert_eq!(bucket.slot_of(7), None);
    }

    #[test]
    fn dummy_pick_skips_invalid_slots() {
        let mut bucket = Bucket::empty(1, 2);
        bucket.refill(vec![Block::new(0, 3, vec![1]), Block::dummy(), Block::dummy()]);
        bucket.valids[1] = 0;
        for r in 0..16u32 {
            assert_eq!(bucket.pick_dummy_slot(r), Some(2));
        }
        bucket.valids[2] = 0;
        assert_eq!(bucket.pick_dummy_slot(0), None);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let bucket = Bucket::empty(2, 2);
        let blob = bucket.encode().unwrap();
        assert!(Bucket::decode(&blob[..10]).is_err());
    }
}
