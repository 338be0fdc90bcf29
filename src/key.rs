//! Key node (`nk`) parsing and subkey/value resolution.

use crate::cell::KeyNodeFlags;
use crate::config::HiveConfig;
use crate::error::{Corruption, RegistryError, Result};
use crate::source::ByteSource;
use crate::store::CellStore;
use crate::subkey_list::{self, SubkeyEntry};
use crate::utils::{read_ascii_lossy, read_u16_le, read_u32_le, read_u64_le, read_utf16le_lossy};

/// Minimum size of a key node structure in bytes.
const KEY_NODE_MIN_SIZE: usize = 76;

/// Offset of the key name within the `nk` payload.
const KEY_NAME_OFFSET: usize = 0x4C;

/// Sentinel offset meaning "no class name"/"no security"/etc.
pub const NO_OFFSET: u32 = 0xFFFF_FFFF;

/// Parsed `nk` cell header.
#[derive(Debug, Clone)]
pub struct KeyNode {
    /// Flags for this key.
    pub flags: KeyNodeFlags,
    /// Last-written FILETIME.
    pub last_written: u64,
    /// Access bits (reserved, unused by readers).
    pub access_bits: u32,
    /// Offset of the parent key's `nk` cell.
    pub parent_offset: u32,
    /// Number of stable subkeys.
    pub subkey_count: u32,
    /// Number of volatile subkeys (not present on disk).
    pub volatile_subkey_count: u32,
    /// Offset of the stable subkey list cell.
    pub subkey_list_offset: u32,
    /// Offset of the volatile subkey list cell (not meaningful for a
    /// read-only on-disk view).
    pub volatile_subkey_list_offset: u32,
    /// Number of values.
    pub value_count: u32,
    /// Offset of the value-offset list cell.
    pub value_list_offset: u32,
    /// Offset of the security descriptor cell.
    pub security_offset: u32,
    /// Offset of the class name cell, or [`NO_OFFSET`].
    pub class_name_offset: u32,
    /// Largest subkey name length under this key (informational).
    pub max_subkey_name_len: u32,
    /// Largest subkey class name length under this key (informational).
    pub max_subkey_class_len: u32,
    /// Largest value name length under this key (informational).
    pub max_value_name_len: u32,
    /// Largest value data length under this key (informational).
    pub max_value_data_len: u32,
    /// Length of the key name in bytes.
    pub name_length: u16,
    /// Length of the class name in bytes.
    pub class_name_length: u16,
    /// Key name.
    pub name: String,
}

impl KeyNode {
    /// Parses an `nk` cell payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < KEY_NODE_MIN_SIZE {
            return Err(RegistryError::offset_out_of_range(
                KEY_NODE_MIN_SIZE as u32,
                data.len() as u64,
            ));
        }
        if &data[0..2] != b"nk" {
            return Err(RegistryError::bad_signature(b"nk", &data[0..2]));
        }

        let flags = KeyNodeFlags::new(read_u16_le(data, 0x02)?);
        let last_written = read_u64_le(data, 0x04)?;
        let access_bits = read_u32_le(data, 0x0C)?;
        let parent_offset = read_u32_le(data, 0x10)?;
        let subkey_count = read_u32_le(data, 0x14)?;
        let volatile_subkey_count = read_u32_le(data, 0x18)?;
        let subkey_list_offset = read_u32_le(data, 0x1C)?;
        let volatile_subkey_list_offset = read_u32_le(data, 0x20)?;
        let value_count = read_u32_le(data, 0x24)?;
        let value_list_offset = read_u32_le(data, 0x28)?;
        let security_offset = read_u32_le(data, 0x2C)?;
        let class_name_offset = read_u32_le(data, 0x30)?;
        let max_subkey_name_len = read_u32_le(data, 0x34)?;
        let max_subkey_class_len = read_u32_le(data, 0x38)?;
        let max_value_name_len = read_u32_le(data, 0x3C)?;
        let max_value_data_len = read_u32_le(data, 0x40)?;
        let name_length = read_u16_le(data, 0x48)?;
        let class_name_length = read_u16_le(data, 0x4A)?;

        let name = if name_length > 0 {
            let name_end = KEY_NAME_OFFSET + name_length as usize;
            if name_end > data.len() {
                return Err(RegistryError::offset_out_of_range(
                    name_end as u32,
                    data.len() as u64,
                ));
            }
            let name_data = &data[KEY_NAME_OFFSET..name_end];
            if flags.is_ascii_name() {
                read_ascii_lossy(name_data)
            } else {
                read_utf16le_lossy(name_data)
            }
        } else {
            String::new()
        };

        Ok(KeyNode {
            flags,
            last_written,
            access_bits,
            parent_offset,
            subkey_count,
            volatile_subkey_count,
            subkey_list_offset,
            volatile_subkey_list_offset,
            value_count,
            value_list_offset,
            security_offset,
            class_name_offset,
            max_subkey_name_len,
            max_subkey_class_len,
            max_value_name_len,
            max_value_data_len,
            name_length,
            class_name_length,
            name,
        })
    }

    /// True if this key has any stable subkeys.
    pub fn has_subkeys(&self) -> bool {
        self.subkey_count > 0
    }

    /// True if this key has any values.
    pub fn has_values(&self) -> bool {
        self.value_count > 0
    }

    /// True if this is the root key of the hive.
    pub fn is_root(&self) -> bool {
        self.flags.is_root()
    }

    /// Resolves this key's class name, if it has one. Returns `None`
    /// (rather than an error) when the class cell can't be resolved —
    /// class names are informational.
    pub fn class_name<S: ByteSource>(&self, store: &CellStore<S>) -> Option<String> {
        if self.class_name_offset == NO_OFFSET || self.class_name_length == 0 {
            return None;
        }
        let cell = store.allocated_cell_at(self.class_name_offset).ok()?;
        let len = (self.class_name_length as usize).min(cell.payload.len());
        Some(read_utf16le_lossy(&cell.payload[..len]))
    }

    /// Flattens this key's subkey list into an ordered set of entries.
    /// Returns any corruption flags recorded along the way rather than
    /// failing outright.
    pub fn list_subkeys<S: ByteSource>(
        &self,
        store: &CellStore<S>,
        config: &HiveConfig,
    ) -> Result<(Vec<SubkeyEntry>, Vec<Corruption>)> {
        if self.subkey_count == 0 {
            return Ok((Vec::new(), Vec::new()));
        }
        let mut corruptions = Vec::new();
        let entries = subkey_list::flatten(store, self.subkey_list_offset, config, &mut corruptions)?;
        Ok((entries, corruptions))
    }

    /// Resolves this key's value-offset list into a flat list of `vk`
    /// cell offsets.
    pub fn list_values<S: ByteSource>(
        &self,
        store: &CellStore<S>,
    ) -> Result<(Vec<u32>, Vec<Corruption>)> {
        if self.value_count == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let cell = match store.allocated_cell_at(self.value_list_offset) {
            Ok(cell) => cell,
            Err(err) if err.is_always_fatal() => return Err(err),
            Err(_) => {
                tracing::warn!(offset = self.value_list_offset, "value list cell unreadable");
                return Ok((
                    Vec::new(),
                    vec![Corruption::Value {
                        at_offset: self.value_list_offset,
                    }],
                ))
            }
        };

        let available_entries = cell.payload.len() / 4;
        let want = (self.value_count as usize).min(available_entries);
        let mut offsets = Vec::with_capacity(want);
        for i in 0..want {
            offsets.push(read_u32_le(&cell.payload, i * 4)?);
        }

        let corruptions = if want < self.value_count as usize {
            tracing::warn!(
                offset = self.value_list_offset,
                declared = self.value_count,
                available = want,
                "value list shorter than declared count"
            );
            vec![Corruption::Value {
                at_offset: self.value_list_offset,
            }]
        } else {
            Vec::new()
        };

        Ok((offsets, corruptions))
    }

    /// Looks up a direct subkey by name, case-insensitively, using the
    /// `lh` hash as a fast pre-filter when available and falling back to
    /// opening each candidate key otherwise.
    pub fn find_subkey_by_name<S: ByteSource>(
        &self,
        store: &CellStore<S>,
        name: &str,
        config: &HiveConfig,
    ) -> Result<(Option<u32>, Vec<Corruption>)> {
        let (entries, mut corruptions) = self.list_subkeys(store, config)?;
        let target_hash = subkey_list::lh_hash(name);

        for entry in entries {
            if let Some(hash) = entry.hash_hint {
                if hash != target_hash {
                    continue;
                }
            }
            match store.allocated_cell_at(entry.key_offset) {
                Ok(cell) => match KeyNode::parse(&cell.payload) {
                    Ok(candidate) if names_match(&candidate.name, name) => {
                        return Ok((Some(entry.key_offset), corruptions))
                    }
                    Ok(_) => continue,
                    Err(err) if err.is_always_fatal() => return Err(err),
                    Err(_) => {
                        tracing::warn!(offset = entry.key_offset, "candidate subkey cell unparseable");
                        corruptions.push(Corruption::Cell {
                            at_offset: entry.key_offset,
                        });
                        continue;
                    }
                },
                Err(err) if err.is_always_fatal() => return Err(err),
                Err(_) => {
                    tracing::warn!(offset = entry.key_offset, "candidate subkey cell unreadable");
                    corruptions.push(Corruption::Cell {
                        at_offset: entry.key_offset,
                    });
                    continue;
                }
            }
        }

        Ok((None, corruptions))
    }
}

/// Case-insensitive name comparison via Unicode uppercasing, matching the
/// same BMP-approximation policy [`crate::subkey_list::lh_hash`] uses.
pub(crate) fn names_match(a: &str, b: &str) -> bool {
    a.to_uppercase() == b.to_uppercase()
}
