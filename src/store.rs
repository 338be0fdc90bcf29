//! Cell store: bounds-checked, cached access to individual hive cells.
//!
//! Every higher-level parser (`KeyItem`, `ValueItem`, subkey lists, big
//! data) goes through [`CellStore::cell_at`] to turn a raw cell offset into
//! a validated payload slice. This is the one place that enforces spec
//! §4.3's containment rule: a cell must lie entirely within the hbin that
//! `HiveBins` says contains its starting offset.

use crate::cache::IOCache;
use crate::error::{Corruption, RegistryError, Result};
use crate::hbin::HiveBins;
use crate::source::ByteSource;
use crate::utils::read_i32_le;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Minimum valid cell size, size field included (spec §3).
pub const MIN_CELL_SIZE: u32 = 8;

/// Default number of parsed cells the store keeps cached (spec §4.3).
pub const DEFAULT_CELL_CACHE_CAPACITY: usize = 128;

/// A validated cell: its location, allocation state, and payload (the
/// bytes following the 4-byte size field).
#[derive(Clone)]
pub struct CellSlice {
    /// Offset of this cell, relative to the hive-bins region.
    pub offset: u32,
    /// Total cell size including the 4-byte size field.
    pub total_size: u32,
    /// `true` for an allocated cell (negative on-disk size field), `false`
    /// for a free cell.
    pub allocated: bool,
    /// Cell payload, i.e. everything after the size field.
    pub payload: Arc<[u8]>,
}

struct CellCache {
    entries: HashMap<u32, CellSlice>,
    order: Vec<u32>,
    capacity: usize,
}

impl CellCache {
    fn get(&mut self, offset: u32) -> Option<CellSlice> {
        if let Some(slice) = self.entries.get(&offset).cloned() {
            if let Some(pos) = self.order.iter().position(|&o| o == offset) {
                self.order.remove(pos);
            }
            self.order.push(offset);
            Some(slice)
        } else {
            None
        }
    }

    fn insert(&mut self, offset: u32, slice: CellSlice) {
        self.entries.insert(offset, slice);
        self.order.push(offset);
        while self.entries.len() > self.capacity {
            if self.order.is_empty() {
                break;
            }
            let victim = self.order.remove(0);
            self.entries.remove(&victim);
        }
    }
}

/// Resolves cell offsets (relative to the hive-bins region) to validated,
/// cached payload slices.
pub struct CellStore<S: ByteSource> {
    cache: Arc<IOCache<S>>,
    bins: HiveBins<S>,
    region_start: u64,
    max_allocation_bytes: u64,
    cells: Mutex<CellCache>,
}

impl<S: ByteSource> CellStore<S> {
    /// Builds a cell store over the hive-bins region
    /// `[region_start, region_start + region_size)` (absolute offsets).
    pub fn new(
        cache: Arc<IOCache<S>>,
        region_start: u64,
        region_size: u64,
        max_allocation_bytes: u64,
    ) -> Self {
        Self {
            bins: HiveBins::new(cache.clone(), region_start, region_size),
            cache,
            region_start,
            max_allocation_bytes,
            cells: Mutex::new(CellCache {
                entries: HashMap::new(),
                order: Vec::new(),
                capacity: DEFAULT_CELL_CACHE_CAPACITY,
            }),
        }
    }

    /// Corruption flags accumulated while walking the hive-bins index.
    pub fn hive_bin_corruptions(&self) -> Vec<Corruption> {
        self.bins.corruptions()
    }

    /// Reads and validates the cell at `offset`, regardless of whether it
    /// is allocated or free.
    pub fn cell_at(&self, offset: u32) -> Result<CellSlice> {
        {
            let mut guard = self.cells.lock().expect("lock poisoned");
            if let Some(slice) = guard.get(offset) {
                return Ok(slice);
            }
        }

        let bin = self.bins.bin_for(offset)?;

        let size_field_bytes = self
            .cache
            .read(self.region_start + offset as u64, 4)
            .map_err(|_| RegistryError::offset_out_of_range(offset, self.bins.region_size()))?;
        let size_field = read_i32_le(&size_field_bytes, 0)?;
        let allocated = size_field < 0;
        let total_size = size_field.unsigned_abs();

        if total_size < MIN_CELL_SIZE {
            return Err(RegistryError::offset_out_of_range(
                offset,
                self.bins.region_size(),
            ));
        }
        if total_size as u64 > self.max_allocation_bytes {
            return Err(RegistryError::length_exceeds_maximum(
                total_size as u64,
                self.max_allocation_bytes,
            ));
        }

        let cell_end = offset
            .checked_add(total_size)
            .ok_or_else(|| RegistryError::offset_out_of_range(offset, self.bins.region_size()))?;
        let bin_end = bin.offset.saturating_add(bin.size);
        if cell_end > bin_end {
            return Err(RegistryError::offset_out_of_range(
                offset,
                self.bins.region_size(),
            ));
        }

        let payload_len = (total_size - 4) as usize;
        let payload_bytes = self
            .cache
            .read(self.region_start + offset as u64 + 4, payload_len)?;
        let payload: Arc<[u8]> = Arc::from(payload_bytes.into_boxed_slice());

        let slice = CellSlice {
            offset,
            total_size,
            allocated,
            payload,
        };

        let mut guard = self.cells.lock().expect("lock poisoned");
        guard.insert(offset, slice.clone());
        Ok(slice)
    }

    /// Like [`CellStore::cell_at`], but rejects free (non-allocated)
    /// cells — the case nearly every higher-level parser needs (spec
    /// §4.3: "Rejects positive (free) cells when an allocated cell is
    /// requested").
    pub fn allocated_cell_at(&self, offset: u32) -> Result<CellSlice> {
        let slice = self.cell_at(offset)?;
        if !slice.allocated {
            return Err(RegistryError::offset_out_of_range(
                offset,
                self.bins.region_size(),
            ));
        }
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceByteSource;

    fn build_hive_bins_region(cells: &[(i32, &[u8])]) -> Vec<u8> {
        // One 4096-byte bin containing the given cells back-to-back.
        let mut data = vec![0u8; 4096];
        data[0..4].copy_from_slice(b"hbin");
        data[4..8].copy_from_slice(&0u32.to_le_bytes());
        data[8..12].copy_from_slice(&4096u32.to_le_bytes());

        let mut pos = 32usize;
        for (size_field, payload) in cells {
            data[pos..pos + 4].copy_from_slice(&size_field.to_le_bytes());
            data[pos + 4..pos + 4 + payload.len()].copy_from_slice(payload);
            pos += size_field.unsigned_abs() as usize;
        }
        data
    }

    fn store_for(region: Vec<u8>) -> CellStore<SliceByteSource> {
        let size = region.len() as u64;
        let cache = Arc::new(IOCache::new(SliceByteSource::new(region), 8));
        CellStore::new(cache, 0, size, 256 * 1024 * 1024)
    }

    #[test]
    fn reads_allocated_cell_payload() {
        let mut payload = vec![0u8; 12];
        payload[0..2].copy_from_slice(b"nk");
        let region = build_hive_bins_region(&[(-16, &payload)]);
        let store = store_for(region);
        let cell = store.allocated_cell_at(32).unwrap();
        assert!(cell.allocated);
        assert_eq!(cell.total_size, 16);
        assert_eq!(&cell.payload[0..2], b"nk");
    }

    #[test]
    fn rejects_free_cell_when_allocated_expected() {
        let payload = vec![0u8; 12];
        let region = build_hive_bins_region(&[(16, &payload)]);
        let store = store_for(region);
        assert!(store.allocated_cell_at(32).is_err());
        assert!(store.cell_at(32).unwrap().allocated == false);
    }

    #[test]
    fn rejects_cell_extending_past_its_hbin() {
        let mut data = vec![0u8; 4096];
        data[0..4].copy_from_slice(b"hbin");
        data[8..12].copy_from_slice(&4096u32.to_le_bytes());
        // Cell claims to be far larger than the remaining bin space.
        data[32..36].copy_from_slice(&(-8000i32).to_le_bytes());
        let store = store_for(data);
        assert!(store.cell_at(32).is_err());
    }

    #[test]
    fn rejects_cell_below_minimum_size() {
        let mut data = vec![0u8; 4096];
        data[0..4].copy_from_slice(b"hbin");
        data[8..12].copy_from_slice(&4096u32.to_le_bytes());
        data[32..36].copy_from_slice(&(-4i32).to_le_bytes());
        let store = store_for(data);
        assert!(store.cell_at(32).is_err());
    }

    #[test]
    fn caches_repeated_reads() {
        let mut payload = vec![0u8; 12];
        payload[0..2].copy_from_slice(b"vk");
        let region = build_hive_bins_region(&[(-16, &payload)]);
        let store = store_for(region);
        let a = store.cell_at(32).unwrap();
        let b = store.cell_at(32).unwrap();
        assert_eq!(a.total_size, b.total_size);
    }
}
