//! Tunable numeric parameters (spec §6, §9 open question 3).
//!
//! These are not a config-file or CLI surface — spec §6 rules that out
//! explicitly. `Config` just gives the magic numbers names instead of
//! leaving them as scattered literals, and lets an embedder building a
//! custom [`crate::facade::ObjectAllocator`] retune the shrink policy.

/// Number of blocks per [`crate::chunk::Chunk`]. Fixed at 255 because the
/// intrusive free-list link is a single byte (`u8`) and `255` is reserved as
/// the end-of-list sentinel. This is not configurable: changing it would
/// change the on-chunk wire format the spec pins down.
pub const CHUNK_BLOCKS: usize = 255;

/// Tunable knobs for one [`crate::facade::ObjectAllocator`] instance.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Smallest size class served by the pools array, in bytes.
    pub min_size: usize,
    /// Largest size class served by the pools array, in bytes.
    pub max_size: usize,
    /// Distance between consecutive size classes, in bytes.
    pub step: usize,
    /// Number of fully-empty chunks an arena keeps cached before returning
    /// pages to the page source. Default 2 (spec §9: "a tunable with a
    /// sensible default of 2").
    pub max_empty_chunks: usize,
    /// Number of failed spin iterations before `SpinLock::lock` yields the
    /// thread.
    pub spin_iterations: u32,
}

impl Config {
    /// The default configuration, sized from the host's machine word.
    pub const DEFAULT: Config = Config {
        min_size: 2 * core::mem::size_of::<usize>(),
        max_size: 16 * core::mem::size_of::<usize>(),
        step: core::mem::size_of::<usize>(),
        max_empty_chunks: 2,
        spin_iterations: 64,
    };

    /// Number of pools required to cover `[min_size, max_size]` in steps of
    /// `step`.
    pub const fn pool_count(&self) -> usize {
        (self.max_size - self.min_size) / self.step + 1
    }

    /// Maps a requested size to a pool index, or `None` if it exceeds
    /// `max_size` and must fall through to the system allocator.
    pub const fn size_class_index(&self, size: usize) -> Option<usize> {
        if size == 0 || size > self.max_size {
            return None;
        }
        let rounded = ((size + self.step - 1) / self.step) * self.step;
        let rounded = if rounded < self.min_size { self.min_size } else { rounded };
        Some((rounded - self.min_size) / self.step)
    }

    /// The block size served by pool `index`.
    pub const fn block_size_for_index(&self, index: usize) -> usize {
        self.min_size + index * self.step
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_count_matches_word_size_layout() {
        let cfg = Config::DEFAULT;
        let w = core::mem::size_of::<usize>();
        assert_eq!(cfg.min_size, 2 * w);
        assert_eq!(cfg.max_size, 16 * w);
        assert_eq!(cfg.pool_count(), 15);
    }

    #[test]
    fn size_class_index_boundaries() {
        let cfg = Config::DEFAULT;
        assert_eq!(cfg.size_class_index(1), Some(0));
        assert_eq!(cfg.size_class_index(cfg.min_size), Some(0));
        assert_eq!(cfg.size_class_index(cfg.min_size + 1), Some(1));
        assert_eq!(cfg.size_class_index(cfg.max_size), Some(cfg.pool_count() - 1));
        assert_eq!(cfg.size_class_index(cfg.max_size + 1), None);
    }
}
