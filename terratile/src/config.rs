//! Sampler configuration

/// Tunable parameters for a [`crate::sampler::TiledBlockSampler`].
///
/// Defaults suit a full-sphere elevation coverage on a desktop-class
/// machine; use the `with_*` methods to adjust individual knobs.
///
/// # Example
///
/// ```
/// use terratile::config::SamplerConfig;
///
/// let config = SamplerConfig::default()
///     .with_cache_capacity(16 * 1024 * 1024)
///     .with_max_retrievals(8);
/// assert_eq!(config.max_retrievals, 8);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Sample cache capacity in bytes.
    pub cache_capacity: usize,
    /// Eviction target in bytes; sweeps stop once usage drops below this.
    pub cache_low_water: usize,
    /// Maximum number of simultaneous background tile fetches.
    pub max_retrievals: usize,
    /// Number of samples per axis used to pick the extrema scan level.
    pub extrema_samples: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        let cache_capacity = 8 * 1024 * 1024;
        Self {
            cache_capacity,
            cache_low_water: cache_capacity / 4 * 3,
            max_retrievals: 4,
            extrema_samples: 8,
        }
    }
}

impl SamplerConfig {
    /// Sets the sample cache capacity in bytes, moving the low-water mark
    /// to 75% of the new capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self.cache_low_water = capacity / 4 * 3;
        self
    }

    /// Sets the eviction target in bytes.
    pub fn with_cache_low_water(mut self, low_water: usize) -> Self {
        self.cache_low_water = low_water;
        self
    }

    /// Sets the maximum number of simultaneous background tile fetches.
    pub fn with_max_retrievals(mut self, max_retrievals: usize) -> Self {
        self.max_retrievals = max_retrievals;
        self
    }

    /// Sets the per-axis sample count for extrema level selection.
    pub fn with_extrema_samples(mut self, samples: u32) -> Self {
        self.extrema_samples = samples;
        self
    }
}
