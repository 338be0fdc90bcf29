//! The seekable byte source the core reads hives through (spec §6).
//!
//! `ByteSource` is the one external collaborator every hive depends on.
//! spec.md treats its implementation as out of scope for the core — what
//! the core needs is random-access, whole-buffer reads and a size. This
//! module defines that contract plus two concrete implementations that
//! make the crate usable standalone: [`MmapByteSource`] for file-backed
//! hives (mirrors the teacher's `memmap2` use) and [`SliceByteSource`] for
//! in-memory buffers, which is how both tests and the fuzz target in
//! `fuzz/` exercise the parser — the same shape as libregf's own
//! `libbfio_memory_range` fuzz harness
//! (`examples/original_source/ossfuzz/file_fuzzer.cc`).

use crate::error::{RegistryError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Random-access byte source backing a hive.
///
/// Implementations are expected to be cheap to clone/share (the core keeps
/// one handle for the lifetime of the open hive) and to treat the
/// underlying bytes as immutable for as long as the hive is open (spec §3:
/// "ByteSource is treated as immutable").
pub trait ByteSource: Send + Sync {
    /// Reads exactly `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// A short read (fewer bytes available than requested) is an error,
    /// not a partial success — the core never interprets a partially
    /// filled buffer.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Total size of the byte source in bytes.
    fn size(&self) -> u64;
}

/// A memory-mapped file, used by [`crate::tree::Hive::open`].
pub struct MmapByteSource {
    mmap: Mmap,
}

impl MmapByteSource {
    /// Memory-maps `path` read-only.
    ///
    /// # Safety contract
    ///
    /// This relies on `memmap2::Mmap::map`, which is unsafe because the
    /// file could be truncated or mutated by another process while mapped.
    /// The hive only ever reads through bounds-checked offsets validated
    /// against the recorded file size, so a concurrent truncation surfaces
    /// as a `SIGBUS`-triggered process abort rather than memory unsafety
    /// within this crate's own accounting; callers that cannot accept that
    /// risk should use a `File`-backed source instead.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }
}

impl ByteSource for MmapByteSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| RegistryError::offset_out_of_range(u32::MAX, self.mmap.len() as u64))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, self.mmap.len() as u64))?;
        let slice = self
            .mmap
            .get(start..end)
            .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, self.mmap.len() as u64))?;
        buf.copy_from_slice(slice);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}

/// An in-memory buffer, used for tests and fuzzing.
#[derive(Clone)]
pub struct SliceByteSource {
    data: Arc<[u8]>,
}

impl SliceByteSource {
    /// Wraps an owned byte buffer.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl ByteSource for SliceByteSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| RegistryError::offset_out_of_range(u32::MAX, self.data.len() as u64))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, self.data.len() as u64))?;
        let slice = self
            .data
            .get(start..end)
            .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, self.data.len() as u64))?;
        buf.copy_from_slice(slice);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_reads_in_range() {
        let src = SliceByteSource::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        src.read_at(1, &mut buf).unwrap();
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn slice_source_rejects_short_read() {
        let src = SliceByteSource::new(vec![1, 2, 3]);
        let mut buf = [0u8; 4];
        assert!(src.read_at(0, &mut buf).is_err());
    }

    #[test]
    fn slice_source_reports_size() {
        let src = SliceByteSource::new(vec![0u8; 4096]);
        assert_eq!(src.size(), 4096);
    }
}
