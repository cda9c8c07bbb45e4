//! LRU cache of fully loaded cell archives.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::archive::CellArchive;
use crate::error::StoreResult;

/// A cell archive with every variable in memory.
pub struct LoadedArchive {
    pub archive: CellArchive,
    /// Row-major `[points, times]` values per variable.
    pub data: BTreeMap<String, Vec<f64>>,
}

impl LoadedArchive {
    pub fn load(archive: CellArchive) -> StoreResult<Self> {
        let mut data = BTreeMap::new();
        for variable in archive.variables() {
            data.insert(variable.clone(), archive.read_all(variable)?);
        }
        Ok(Self { archive, data })
    }

    /// Time series of one row, if the variable exists.
    pub fn row(&self, row: usize, variable: &str) -> Option<&[f64]> {
        let n_times = self.archive.times().len();
        self.data
            .get(variable)
            .map(|values| &values[row * n_times..(row + 1) * n_times])
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// One slot per cell, least recently used cells evicted first.
pub struct ArchiveCache {
    cache: LruCache<u32, Arc<LoadedArchive>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ArchiveCache {
    pub fn new(slots: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(slots),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn get(&mut self, cell: u32) -> Option<Arc<LoadedArchive>> {
        if let Some(loaded) = self.cache.get(&cell) {
            self.hits += 1;
            Some(loaded.clone())
        } else {
            self.misses += 1;
            None
        }
    }

    pub fn insert(&mut self, cell: u32, loaded: Arc<LoadedArchive>) {
        if let Some((evicted, _)) = self.cache.push(cell, loaded) {
            if evicted != cell {
                self.evictions += 1;
            }
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            evictions: self.evictions,
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
