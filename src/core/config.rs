use crate::core::error::{Error, ErrorKind, Result};

/// Engine-wide tuning knobs for the tree layer.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dimensions: usize,
    pub min_capacity: usize,
    pub max_capacity: usize,

    pub default_k: usize,
    pub default_alpha: f64,

    /// Children whose combined relevance upper bound falls below this are
    /// never fetched during search.
    pub prune_threshold: f64,

    /// Half-width of the bounding box built around a bulk-loaded point.
    pub point_epsilon: f64,

    /// Capacity of the write-through node cache used only during bulk build.
    pub build_cache_size: usize,

    pub oram: OramConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            dimensions: 2,
            min_capacity: 2,
            max_capacity: 8,
            default_k: 10,
            default_alpha: 0.5,
            prune_threshold: 0.1,
            point_epsilon: 0.001,
            build_cache_size: 64,
            oram: OramConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                "dimensions must be at least 1",
            ));
        }
        if self.max_capacity < 2 || self.min_capacity > self.max_capacity {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!(
                    "invalid node capacities: min={} max={}",
                    self.min_capacity, self.max_capacity
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.default_alpha) {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("alpha {} outside [0,1]", self.default_alpha),
            ));
        }
        self.oram.validate()
    }
}

/// Fixed-at-construction Ring-ORAM parameters.
#[derive(Debug, Clone)]
pub struct OramConfig {
    /// Number of logical blocks the store can ever allocate.
    pub capacity: usize,
    /// Real slots per bucket (Z).
    pub real_slots: usize,
    /// Dummy slots per bucket (S).
    pub dummy_slots: usize,
    /// Accesses between deterministic path evictions.
    pub evict_round: u32,
    /// Upper tree levels assumed resident in the trusted region; excluded
    /// from the oblivious-bandwidth statistic.
    pub cache_levels: u32,
    /// Seed for the ORAM's RNG. `None` draws from the OS entropy source.
    pub seed: Option<u64>,
}

impl Default for OramConfig {
    fn default() -> Self {
        OramConfig {
            capacity: 1024,
            real_slots: 4,
            dummy_slots: 4,
            evict_round: 4,
            cache_levels: 0,
            seed: None,
        }
    }
}

impl OramConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity < 2 {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                "oram capacity must be at least 2",
            ));
        }
        if self.real_slots == 0 || self.dummy_slots == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                "buckets need at least one real and one dummy slot",
            ));
        }
        if self.evict_round == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                "evict round must be positive",
            ));
        }
        let slots = self.real_slots + self.dummy_slots;
        if 16 + slots * 20 > crate::oram::bucket::BUCKET_BLOB_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("{} bucket slots cannot fit the wire blob", slots),
            ));
        }
        Ok(())
    }
}
