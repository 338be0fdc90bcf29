//! Hive bin (`hbin`) header parsing and the lazy bin-lookup index.
//!
//! Hive bins are 4 KiB-aligned blocks inside the hive-bins region, each
//! holding a run of cells. [`HiveBins`] locates the bin containing a given
//! cell offset, validating every header it walks past and tolerating a
//! corrupted header by skipping ahead to the next 4 KiB boundary rather
//! than failing the whole hive (spec §4.2).

use crate::cache::IOCache;
use crate::error::{Corruption, RegistryError, Result};
use crate::source::ByteSource;
use crate::utils::read_u32_le;
use std::sync::Mutex;

/// Signature for a hive bin header ("hbin").
pub const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

/// Size of the hbin header.
pub const HBIN_HEADER_SIZE: u64 = 0x20;

/// Minimum (and alignment granularity) size of a hive bin.
pub const HBIN_ALIGNMENT: u32 = 4096;

/// A validated hive bin's position and size, relative to the hive-bins
/// region start.
#[derive(Debug, Clone, Copy)]
pub struct HbinEntry {
    /// Offset of this bin from the start of the hive-bins region.
    pub offset: u32,
    /// Size of this bin in bytes, including its header.
    pub size: u32,
}

impl HbinEntry {
    /// True if `cell_offset` (relative to the hive-bins region) falls
    /// within this bin.
    pub fn contains(&self, cell_offset: u32) -> bool {
        cell_offset >= self.offset && cell_offset < self.offset.saturating_add(self.size)
    }
}

/// Lazily-built index over the hive-bins region, resolving a cell offset
/// to its enclosing bin.
pub struct HiveBins<S: ByteSource> {
    cache: std::sync::Arc<IOCache<S>>,
    /// Absolute byte offset where the hive-bins region starts (always
    /// `BASE_BLOCK_SIZE`, kept explicit for clarity/testability).
    region_start: u64,
    /// Size of the hive-bins region in bytes, from the base block.
    region_size: u64,
    index: Mutex<Option<Vec<HbinEntry>>>,
    corruptions: Mutex<Vec<Corruption>>,
}

impl<S: ByteSource> HiveBins<S> {
    /// Creates an index over `[region_start, region_start + region_size)`.
    pub fn new(cache: std::sync::Arc<IOCache<S>>, region_start: u64, region_size: u64) -> Self {
        Self {
            cache,
            region_start,
            region_size,
            index: Mutex::new(None),
            corruptions: Mutex::new(Vec::new()),
        }
    }

    /// Size of the indexed region.
    pub fn region_size(&self) -> u64 {
        self.region_size
    }

    /// Snapshot of corruption flags accumulated while building the index.
    pub fn corruptions(&self) -> Vec<Corruption> {
        self.corruptions.lock().expect("lock poisoned").clone()
    }

    /// Finds the bin containing `cell_offset` (relative to the hive-bins
    /// region start).
    pub fn bin_for(&self, cell_offset: u32) -> Result<HbinEntry> {
        self.ensure_index()?;
        let guard = self.index.lock().expect("lock poisoned");
        let entries = guard.as_ref().expect("index built above");

        // Binary search over sorted, non-overlapping bin starts.
        match entries.binary_search_by(|e| e.offset.cmp(&cell_offset)) {
            Ok(i) => Ok(entries[i]),
            Err(0) => Err(RegistryError::offset_out_of_range(
                cell_offset,
                self.region_size,
            )),
            Err(i) => {
                let candidate = entries[i - 1];
                if candidate.contains(cell_offset) {
                    Ok(candidate)
                } else {
                    Err(RegistryError::offset_out_of_range(
                        cell_offset,
                        self.region_size,
                    ))
                }
            }
        }
    }

    fn ensure_index(&self) -> Result<()> {
        {
            let guard = self.index.lock().expect("lock poisoned");
            if guard.is_some() {
                return Ok(());
            }
        }

        tracing::debug!(region_size = self.region_size, "building hive-bins index");
        let mut entries = Vec::new();
        let mut corruptions = Vec::new();
        let mut pos: u64 = 0;

        while pos < self.region_size {
            let header_bytes = self
                .cache
                .read(self.region_start + pos, HBIN_HEADER_SIZE as usize)?;

            match parse_hbin_header(&header_bytes, pos as u32) {
                Ok(entry) => {
                    tracing::trace!(offset = entry.offset, size = entry.size, "indexed hive bin");
                    let step = entry.size.max(HBIN_ALIGNMENT) as u64;
                    entries.push(entry);
                    pos += step;
                }
                Err(_) => {
                    tracing::warn!(offset = pos as u32, "corrupted hive bin header, skipping to next boundary");
                    corruptions.push(Corruption::HiveBin {
                        at_offset: pos as u32,
                    });
                    pos += HBIN_ALIGNMENT as u64;
                }
            }
        }
        tracing::debug!(bins = entries.len(), corrupt = corruptions.len(), "hive-bins index built");

        let mut index_guard = self.index.lock().expect("lock poisoned");
        if index_guard.is_none() {
            *index_guard = Some(entries);
        }
        drop(index_guard);

        let mut c_guard = self.corruptions.lock().expect("lock poisoned");
        c_guard.extend(corruptions);

        Ok(())
    }
}

/// Parses and validates an hbin header found at relative offset
/// `expected_offset` within the hive-bins region.
fn parse_hbin_header(data: &[u8], expected_offset: u32) -> Result<HbinEntry> {
    if (data.len() as u64) < HBIN_HEADER_SIZE {
        return Err(RegistryError::offset_out_of_range(
            expected_offset,
            data.len() as u64,
        ));
    }

    let signature = &data[0..4];
    if signature != HBIN_SIGNATURE {
        return Err(RegistryError::bad_signature(HBIN_SIGNATURE, signature));
    }

    let offset = read_u32_le(data, 0x04)?;
    if offset != expected_offset {
        return Err(RegistryError::InvalidArgument(format!(
            "hbin offset mismatch: expected {expected_offset:#x}, found {offset:#x}"
        )));
    }

    let size = read_u32_le(data, 0x08)?;
    if size < HBIN_ALIGNMENT || size % HBIN_ALIGNMENT != 0 {
        return Err(RegistryError::InvalidArgument(format!(
            "invalid hbin size {size:#x} at {expected_offset:#x}"
        )));
    }

    Ok(HbinEntry { offset, size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceByteSource;
    use std::sync::Arc;

    fn hbin_header(offset: u32, size: u32) -> Vec<u8> {
        let mut data = vec![0u8; HBIN_HEADER_SIZE as usize];
        data[0..4].copy_from_slice(HBIN_SIGNATURE);
        data[4..8].copy_from_slice(&offset.to_le_bytes());
        data[8..12].copy_from_slice(&size.to_le_bytes());
        data
    }

    fn build_region(bins: &[(u32, u32)]) -> Vec<u8> {
        let total: u32 = bins.iter().map(|(_, size)| *size).sum();
        let mut data = vec![0u8; total as usize];
        for (offset, size) in bins {
            let header = hbin_header(*offset, *size);
            data[*offset as usize..*offset as usize + header.len()].copy_from_slice(&header);
        }
        data
    }

    #[test]
    fn single_bin_resolves() {
        let region = build_region(&[(0, 4096)]);
        let size = region.len() as u64;
        let cache = Arc::new(IOCache::new(SliceByteSource::new(region), 8));
        let bins = HiveBins::new(cache, 0, size);
        let entry = bins.bin_for(32).unwrap();
        assert_eq!(entry.offset, 0);
        assert_eq!(entry.size, 4096);
    }

    #[test]
    fn multiple_bins_binary_search() {
        let region = build_region(&[(0, 4096), (4096, 8192)]);
        let size = region.len() as u64;
        let cache = Arc::new(IOCache::new(SliceByteSource::new(region), 8));
        let bins = HiveBins::new(cache, 0, size);
        assert_eq!(bins.bin_for(4096).unwrap().offset, 4096);
        assert_eq!(bins.bin_for(10000).unwrap().offset, 4096);
        assert!(bins.bin_for(20000).is_err());
    }

    #[test]
    fn corrupted_header_is_skipped_not_fatal() {
        let mut region = build_region(&[(0, 4096), (4096, 4096)]);
        // Corrupt the second bin's signature.
        region[4096..4100].copy_from_slice(b"XXXX");
        let size = region.len() as u64;
        let cache = Arc::new(IOCache::new(SliceByteSource::new(region), 8));
        let bins = HiveBins::new(cache, 0, size);
        assert!(bins.bin_for(0).is_ok());
        assert!(bins.bin_for(4096).is_err());
        assert_eq!(bins.corruptions().len(), 1);
    }
}
