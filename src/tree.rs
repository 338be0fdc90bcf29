//! The top-level hive handle: opening a hive and navigating its key tree.
//!
//! [`Hive`] owns the parsed base block and the [`CellStore`] backing it;
//! [`KeyHandle`] and [`ValueHandle`] are lightweight, borrowed views onto
//! one key or value, resolving their children lazily through the same
//! store. Corruption discovered while walking a key's subkeys or values
//! accumulates on that key's handle rather than failing the walk (spec
//! §7); the hive-wide [`Hive::corruptions`] also folds in the base-block
//! checksum state and any hbin-index corruption found so far.

use crate::abort::AbortFlag;
use crate::cache::{IOCache, DEFAULT_CAPACITY_BLOCKS};
use crate::cell::ValueType;
use crate::config::HiveConfig;
use crate::error::{Corruption, RegistryError, Result};
use crate::header::{BaseBlock, BASE_BLOCK_SIZE};
use crate::key::{self, KeyNode};
use crate::source::{ByteSource, MmapByteSource};
use crate::store::CellStore;
use crate::value::{ResolvedData, ValueKey};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;

/// An open, read-only view of a registry hive.
pub struct Hive<S: ByteSource> {
    base_block: BaseBlock,
    store: CellStore<S>,
    config: HiveConfig,
    abort: AbortFlag,
}

impl Hive<MmapByteSource> {
    /// Opens a hive file, memory-mapping it, with the default resource
    /// bounds.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(MmapByteSource::open(path)?, HiveConfig::default())
    }
}

impl<S: ByteSource> Hive<S> {
    /// Opens a hive from any [`ByteSource`], with explicit resource
    /// bounds.
    pub fn open_with_config(source: S, config: HiveConfig) -> Result<Self> {
        let mut header_buf = vec![0u8; BASE_BLOCK_SIZE];
        source.read_at(0, &mut header_buf)?;
        let base_block = BaseBlock::parse(&header_buf)?;

        let region_start = BASE_BLOCK_SIZE as u64;
        let region_size = base_block.hive_bins_data_size as u64;
        let cache = Arc::new(IOCache::new(source, DEFAULT_CAPACITY_BLOCKS));
        let store = CellStore::new(cache, region_start, region_size, config.max_allocation_bytes);

        tracing::info!(
            name = %base_block.hive_name,
            version = ?(base_block.major_version, base_block.minor_version),
            checksum_ok = base_block.checksum_matches,
            "opened hive"
        );

        Ok(Self {
            base_block,
            store,
            config,
            abort: AbortFlag::new(),
        })
    }

    /// The parsed base block.
    pub fn base_block(&self) -> &BaseBlock {
        &self.base_block
    }

    /// `(major, minor)` REGF version.
    pub fn version(&self) -> (u32, u32) {
        (self.base_block.major_version, self.base_block.minor_version)
    }

    /// The hive's informational embedded name.
    pub fn name(&self) -> &str {
        &self.base_block.hive_name
    }

    /// Last-written time recorded in the base block, if representable.
    pub fn last_written(&self) -> Option<DateTime<Utc>> {
        self.base_block.last_written_datetime()
    }

    /// The cooperative cancellation flag for this hive. Cloning it gives
    /// another thread a handle that can cancel an in-progress traversal.
    pub fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    /// Corruption flags known so far: the base-block checksum state plus
    /// any hbin-index corruption the hive-bins scan has encountered.
    /// Per-key/per-value corruption is reported on the [`KeyHandle`] that
    /// discovered it, not folded in here.
    pub fn corruptions(&self) -> Vec<Corruption> {
        let mut out = Vec::new();
        if !self.base_block.checksum_matches {
            out.push(Corruption::Checksum);
        }
        out.extend(self.store.hive_bin_corruptions());
        out
    }

    /// Opens the key at cell `offset`.
    pub fn key_at(&self, offset: u32) -> Result<KeyHandle<'_, S>> {
        self.abort.check()?;
        tracing::trace!(offset, "resolving key node");
        let cell = self.store.allocated_cell_at(offset)?;
        let node = KeyNode::parse(&cell.payload)?;
        Ok(KeyHandle {
            hive: self,
            offset,
            node,
            corruptions: RefCell::new(Vec::new()),
        })
    }

    /// The hive's root key.
    pub fn root(&self) -> Result<KeyHandle<'_, S>> {
        self.key_at(self.base_block.root_cell_offset)
    }

    /// Finds a key by a `\`-separated path, relative to the root.
    ///
    /// The lookup is case-insensitive at every component, tolerates a
    /// leading `\`, and collapses repeated separators. Returns `Ok(None)`
    /// if any component isn't found — that's a normal lookup miss, not an
    /// error.
    pub fn find_by_path(&self, path: &str) -> Result<Option<KeyHandle<'_, S>>> {
        let components = split_path(path, self.config.max_path_components)?;
        let mut current = self.root()?;
        for component in components {
            self.abort.check()?;
            match current.subkey_by_name(component)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

/// Splits a `\`-separated path into non-empty components, tolerating a
/// leading separator and collapsing repeats. Rejects paths with more than
/// `max_components` components (spec §6).
fn split_path(path: &str, max_components: usize) -> Result<Vec<&str>> {
    let components: Vec<&str> = path
        .split(['\\', '/'])
        .filter(|component| !component.is_empty())
        .collect();
    if components.len() > max_components {
        return Err(RegistryError::InvalidArgument(format!(
            "path has {} components, exceeding the configured maximum {max_components}",
            components.len()
        )));
    }
    Ok(components)
}

impl<S: ByteSource> Drop for Hive<S> {
    fn drop(&mut self) {
        tracing::info!(name = %self.base_block.hive_name, "closed hive");
    }
}

/// A borrowed view of one key, resolved lazily against its [`Hive`].
pub struct KeyHandle<'a, S: ByteSource> {
    hive: &'a Hive<S>,
    /// Cell offset of this key's `nk` cell.
    pub offset: u32,
    node: KeyNode,
    corruptions: RefCell<Vec<Corruption>>,
}

impl<'a, S: ByteSource> KeyHandle<'a, S> {
    /// This key's name.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// This key's class name, if it has one.
    pub fn class_name(&self) -> Option<String> {
        self.node.class_name(&self.hive.store)
    }

    /// Number of direct subkeys.
    pub fn subkey_count(&self) -> u32 {
        self.node.subkey_count
    }

    /// Number of values.
    pub fn value_count(&self) -> u32 {
        self.node.value_count
    }

    /// True if this is the hive's root key.
    pub fn is_root(&self) -> bool {
        self.node.is_root()
    }

    /// Last-written time recorded on this key, if representable.
    pub fn last_written(&self) -> Option<DateTime<Utc>> {
        crate::utils::filetime_to_datetime(self.node.last_written)
    }

    /// Opens this key's parent, unless this is the root.
    pub fn parent(&self) -> Result<Option<KeyHandle<'a, S>>> {
        if self.node.is_root() {
            return Ok(None);
        }
        Ok(Some(self.hive.key_at(self.node.parent_offset)?))
    }

    /// Lists direct subkeys. A subkey that can't be resolved is skipped
    /// and recorded via [`KeyHandle::corruptions`] rather than failing
    /// the whole listing.
    pub fn subkeys(&self) -> Result<Vec<KeyHandle<'a, S>>> {
        self.hive.abort.check()?;
        let (entries, corruptions) = self.node.list_subkeys(&self.hive.store, &self.hive.config)?;
        self.corruptions.borrow_mut().extend(corruptions);

        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            self.hive.abort.check()?;
            match self.hive.key_at(entry.key_offset) {
                Ok(handle) => handles.push(handle),
                Err(err) if err.is_always_fatal() => return Err(err),
                Err(_) => {
                    tracing::warn!(offset = entry.key_offset, "subkey cell unreadable, skipping");
                    self.corruptions.borrow_mut().push(Corruption::Cell {
                        at_offset: entry.key_offset,
                    })
                }
            }
        }
        Ok(handles)
    }

    /// Finds a direct subkey by name, case-insensitively.
    pub fn subkey_by_name(&self, name: &str) -> Result<Option<KeyHandle<'a, S>>> {
        self.hive.abort.check()?;
        let (found, corruptions) =
            self.node
                .find_subkey_by_name(&self.hive.store, name, &self.hive.config)?;
        self.corruptions.borrow_mut().extend(corruptions);
        match found {
            Some(offset) => Ok(Some(self.hive.key_at(offset)?)),
            None => Ok(None),
        }
    }

    /// Lists this key's values. A value that can't be resolved is skipped
    /// and recorded via [`KeyHandle::corruptions`].
    pub fn values(&self) -> Result<Vec<ValueHandle<'a, S>>> {
        self.hive.abort.check()?;
        let (offsets, corruptions) = self.node.list_values(&self.hive.store)?;
        self.corruptions.borrow_mut().extend(corruptions);

        let mut handles = Vec::with_capacity(offsets.len());
        for offset in offsets {
            match self
                .hive
                .store
                .allocated_cell_at(offset)
                .and_then(|cell| ValueKey::parse(&cell.payload))
            {
                Ok(vk) => handles.push(ValueHandle {
                    hive: self.hive,
                    offset,
                    vk,
                }),
                Err(err) if err.is_always_fatal() => return Err(err),
                Err(_) => {
                    tracing::warn!(offset, "value cell unreadable or unparseable, skipping");
                    self.corruptions
                        .borrow_mut()
                        .push(Corruption::Value { at_offset: offset })
                }
            }
        }
        Ok(handles)
    }

    /// Finds a value by name, case-insensitively.
    pub fn value_by_name(&self, name: &str) -> Result<Option<ValueHandle<'a, S>>> {
        Ok(self
            .values()?
            .into_iter()
            .find(|value| key::names_match(value.name(), name)))
    }

    /// Corruption flags discovered while listing this key's subkeys or
    /// values so far.
    pub fn corruptions(&self) -> Vec<Corruption> {
        self.corruptions.borrow().clone()
    }

    /// True if any corruption has been recorded on this key.
    pub fn is_corrupted(&self) -> bool {
        !self.corruptions.borrow().is_empty()
    }
}

/// A borrowed view of one value, resolved lazily against its [`Hive`].
pub struct ValueHandle<'a, S: ByteSource> {
    hive: &'a Hive<S>,
    /// Cell offset of this value's `vk` cell.
    pub offset: u32,
    vk: ValueKey,
}

impl<'a, S: ByteSource> ValueHandle<'a, S> {
    /// This value's name, or `"(default)"` for the key's unnamed value.
    pub fn name(&self) -> &str {
        &self.vk.name
    }

    /// This value's declared type.
    pub fn data_type(&self) -> ValueType {
        self.vk.data_type
    }

    /// Resolves this value's data, following the big-data chain if
    /// needed. `truncated` in the result indicates fewer bytes were
    /// recovered than declared.
    pub fn resolve(&self) -> Result<ResolvedData> {
        self.vk.resolve_data(&self.hive.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::xor32_le;
    use crate::header::REGF_SIGNATURE;
    use crate::source::SliceByteSource;

    fn put_cell(data: &mut [u8], offset: usize, payload: &[u8]) {
        let total_size = 4 + payload.len();
        let total_size = total_size + (8 - total_size % 8) % 8;
        data[offset..offset + 4].copy_from_slice(&(-(total_size as i32)).to_le_bytes());
        data[offset + 4..offset + 4 + payload.len()].copy_from_slice(payload);
    }

    fn nk_payload(name: &str, flags: u16, subkey_count: u32, value_count: u32) -> Vec<u8> {
        let mut data = vec![0u8; 76 + name.len()];
        data[0..2].copy_from_slice(b"nk");
        data[0x02..0x04].copy_from_slice(&flags.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&subkey_count.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&value_count.to_le_bytes());
        data[0x30..0x34].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        data[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[0x4C..].copy_from_slice(name.as_bytes());
        data
    }

    fn minimal_hive_with_root() -> Vec<u8> {
        const BASE_BLOCK_SIZE: usize = 4096;
        let mut file = vec![0u8; BASE_BLOCK_SIZE + 4096];

        file[0..4].copy_from_slice(REGF_SIGNATURE);
        file[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        file[0x18..0x1C].copy_from_slice(&5u32.to_le_bytes());
        file[0x20..0x24].copy_from_slice(&1u32.to_le_bytes());
        file[0x24..0x28].copy_from_slice(&32u32.to_le_bytes()); // root offset
        file[0x28..0x2C].copy_from_slice(&4096u32.to_le_bytes()); // hive bins size
        let checksum = xor32_le(&file[0..508], 0);
        file[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        let bins_region = &mut file[BASE_BLOCK_SIZE..];
        bins_region[0..4].copy_from_slice(b"hbin");
        bins_region[8..12].copy_from_slice(&4096u32.to_le_bytes());

        let root = nk_payload("ROOT", 0x0002 | 0x0020, 0, 0);
        put_cell(bins_region, 32, &root);

        file
    }

    #[test]
    fn opens_minimal_hive_and_resolves_root() {
        let bytes = minimal_hive_with_root();
        let hive = Hive::open_with_config(SliceByteSource::new(bytes), HiveConfig::default()).unwrap();
        assert!(hive.corruptions().is_empty());
        let root = hive.root().unwrap();
        assert_eq!(root.name(), "ROOT");
        assert!(root.is_root());
    }

    #[test]
    fn checksum_mismatch_surfaces_as_hive_level_corruption() {
        let mut bytes = minimal_hive_with_root();
        bytes[0x1FC] ^= 1;
        let hive = Hive::open_with_config(SliceByteSource::new(bytes), HiveConfig::default()).unwrap();
        assert_eq!(hive.corruptions(), vec![Corruption::Checksum]);
    }

    #[test]
    fn path_lookup_returns_none_for_missing_component() {
        let bytes = minimal_hive_with_root();
        let hive = Hive::open_with_config(SliceByteSource::new(bytes), HiveConfig::default()).unwrap();
        assert!(hive.find_by_path("NoSuchKey").unwrap().is_none());
    }

    #[test]
    fn path_with_too_many_components_is_rejected() {
        let long_path = "a\\".repeat(300);
        assert!(split_path(&long_path, 256).is_err());
    }
}
