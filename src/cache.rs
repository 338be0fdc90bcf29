//! Bounded LRU block cache sitting in front of a [`ByteSource`].
//!
//! Cell reads are small (tens to a few thousand bytes) and cluster within
//! the same 4 KiB-aligned region as neighbouring cells in the same hbin.
//! `IOCache` amortizes that locality by reading fixed-size blocks from the
//! byte source and keeping a bounded number of them around, the same shape
//! as the teacher's `RwLock<HashMap<u32, KeyNode>>` key cache in
//! `hive.rs`, generalized one layer down to raw bytes and bounded so it
//! can't grow without limit on a hive with many cells. Correctness never
//! depends on this cache: every public read goes through the same
//! bounds-checked path whether its block is resident or not (spec §4.3).

use crate::error::Result;
use crate::source::ByteSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Size of one cached block, in bytes. Matches the hbin/cell alignment
/// granularity so a single block usually covers several small cells.
pub const BLOCK_SIZE: u64 = 4096;

/// Default number of blocks the cache retains (spec §4.3 suggests ~128
/// entries for the cell cache; the same bound reads well here).
pub const DEFAULT_CAPACITY_BLOCKS: usize = 128;

struct Inner {
    blocks: HashMap<u64, Arc<[u8]>>,
    /// Most-recently-used block indices at the back.
    order: Vec<u64>,
    capacity: usize,
}

impl Inner {
    fn touch(&mut self, block_index: u64) {
        if let Some(pos) = self.order.iter().position(|&b| b == block_index) {
            self.order.remove(pos);
        }
        self.order.push(block_index);
    }

    fn evict_if_needed(&mut self) {
        while self.blocks.len() > self.capacity {
            if self.order.is_empty() {
                break;
            }
            let victim = self.order.remove(0);
            self.blocks.remove(&victim);
        }
    }
}

/// A bounded LRU cache of fixed-size blocks read from a [`ByteSource`].
pub struct IOCache<S: ByteSource> {
    source: S,
    inner: Mutex<Inner>,
}

impl<S: ByteSource> IOCache<S> {
    /// Wraps `source` with a cache of `capacity_blocks` blocks.
    pub fn new(source: S, capacity_blocks: usize) -> Self {
        Self {
            source,
            inner: Mutex::new(Inner {
                blocks: HashMap::new(),
                order: Vec::new(),
                capacity: capacity_blocks.max(1),
            }),
        }
    }

    /// Total size of the underlying byte source.
    pub fn size(&self) -> u64 {
        self.source.size()
    }

    /// Returns a reference to the wrapped byte source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reads `len` bytes starting at absolute `offset`, served from cached
    /// blocks where possible.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut out = vec![0u8; len];
        let end = offset + len as u64;
        let mut pos = offset;

        while pos < end {
            let block_index = pos / BLOCK_SIZE;
            let block_start = block_index * BLOCK_SIZE;
            let block = self.block(block_index, block_start)?;

            let in_block_offset = (pos - block_start) as usize;
            let available = block.len().saturating_sub(in_block_offset);
            if available == 0 {
                return Err(crate::error::RegistryError::offset_out_of_range(
                    pos as u32,
                    self.source.size(),
                ));
            }
            let want = ((end - pos) as usize).min(available);

            let out_start = (pos - offset) as usize;
            out[out_start..out_start + want]
                .copy_from_slice(&block[in_block_offset..in_block_offset + want]);

            pos += want as u64;
        }

        Ok(out)
    }

    fn block(&self, block_index: u64, block_start: u64) -> Result<Arc<[u8]>> {
        {
            let mut guard = self.inner.lock().expect("IOCache lock poisoned");
            if let Some(block) = guard.blocks.get(&block_index).cloned() {
                guard.touch(block_index);
                tracing::trace!(block_index, "cache hit");
                return Ok(block);
            }
        }

        tracing::trace!(block_index, block_start, "cache miss, reading block");
        let source_size = self.source.size();
        let remaining = source_size.saturating_sub(block_start);
        let this_block_len = remaining.min(BLOCK_SIZE) as usize;

        let mut buf = vec![0u8; this_block_len];
        if this_block_len > 0 {
            self.source.read_at(block_start, &mut buf)?;
        }
        let block: Arc<[u8]> = Arc::from(buf.into_boxed_slice());

        let mut guard = self.inner.lock().expect("IOCache lock poisoned");
        guard.blocks.insert(block_index, block.clone());
        guard.touch(block_index);
        guard.evict_if_needed();

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceByteSource;

    fn make_source(len: usize) -> SliceByteSource {
        let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        SliceByteSource::new(data)
    }

    #[test]
    fn reads_match_uncached_source() {
        let source = make_source(20_000);
        let cache = IOCache::new(source.clone(), 4);
        let got = cache.read(10, 100).unwrap();
        let mut expected = [0u8; 100];
        source.read_at(10, &mut expected).unwrap();
        assert_eq!(&got[..], &expected[..]);
    }

    #[test]
    fn read_spans_multiple_blocks() {
        let source = make_source(20_000);
        let cache = IOCache::new(source.clone(), 2);
        let got = cache.read(4090, 20).unwrap();
        let mut expected = [0u8; 20];
        source.read_at(4090, &mut expected).unwrap();
        assert_eq!(&got[..], &expected[..]);
    }

    #[test]
    fn eviction_does_not_break_correctness() {
        let source = make_source(200_000);
        let cache = IOCache::new(source.clone(), 2);
        // Touch far more blocks than the cache can hold.
        for i in 0..40 {
            let offset = i * BLOCK_SIZE;
            let got = cache.read(offset, 16).unwrap();
            let mut expected = [0u8; 16];
            source.read_at(offset, &mut expected).unwrap();
            assert_eq!(&got[..], &expected[..]);
        }
    }

    #[test]
    fn out_of_range_read_errors() {
        let source = make_source(100);
        let cache = IOCache::new(source, 4);
        assert!(cache.read(90, 50).is_err());
    }
}
