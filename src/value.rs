//! Value (`vk`) cell parsing and typed data extraction.

use crate::bigdata::{is_big_data_cell, read_big_data, SEGMENT_SIZE};
use crate::cell::ValueType;
use crate::codepage::Codepage;
use crate::error::{RegistryError, Result};
use crate::source::ByteSource;
use crate::store::CellStore;
use crate::utils::{read_ascii_lossy, read_i32_le, read_u16_le, read_u32_le, read_utf16le_lossy};

/// Bit in the `vk` data-size field marking the data as stored inline in
/// the `data_offset` field itself, rather than in a separate cell (spec
/// §4.6.1).
const INLINE_BIT: u32 = 0x8000_0000;

/// Name used for the unnamed ("default") value of a key.
pub const DEFAULT_VALUE_NAME: &str = "(default)";

/// Parsed `vk` cell header.
#[derive(Debug, Clone)]
pub struct ValueKey {
    /// Length of the value name in bytes (0 for the default value).
    pub name_length: u16,
    /// True if the data is stored inline in `data_offset`.
    pub is_inline: bool,
    /// Declared data length (low 31 bits of the on-disk field).
    pub data_length: u32,
    /// Either the inline data (when `is_inline`) or the offset of the
    /// cell holding the data.
    pub data_offset: u32,
    /// Value type.
    pub data_type: ValueType,
    /// Raw `vk` flags; bit 0x0001 marks an ASCII name.
    pub flags: u16,
    /// Value name, or [`DEFAULT_VALUE_NAME`] for the unnamed value.
    pub name: String,
}

impl ValueKey {
    const MIN_SIZE: usize = 0x14;
    const ASCII_NAME_FLAG: u16 = 0x0001;

    /// Parses a `vk` cell payload (everything after the cell's size
    /// field).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(RegistryError::offset_out_of_range(
                Self::MIN_SIZE as u32,
                data.len() as u64,
            ));
        }
        if &data[0..2] != b"vk" {
            return Err(RegistryError::bad_signature(b"vk", &data[0..2]));
        }

        let name_length = read_u16_le(data, 0x02)?;
        let raw_size = read_i32_le(data, 0x04)? as u32;
        let is_inline = raw_size & INLINE_BIT != 0;
        let data_length = raw_size & !INLINE_BIT;
        let data_offset = read_u32_le(data, 0x08)?;
        let data_type = ValueType::from_u32(read_u32_le(data, 0x0C)?)?;
        let flags = read_u16_le(data, 0x10)?;

        let name = if name_length == 0 {
            DEFAULT_VALUE_NAME.to_string()
        } else {
            let name_end = 0x14 + name_length as usize;
            if name_end > data.len() {
                return Err(RegistryError::offset_out_of_range(
                    name_end as u32,
                    data.len() as u64,
                ));
            }
            let name_bytes = &data[0x14..name_end];
            if flags & Self::ASCII_NAME_FLAG != 0 {
                read_ascii_lossy(name_bytes)
            } else {
                read_utf16le_lossy(name_bytes)
            }
        };

        Ok(ValueKey {
            name_length,
            is_inline,
            data_length,
            data_offset,
            data_type,
            flags,
            name,
        })
    }

    /// Resolves this value's raw data bytes, following the big-data chain
    /// if required.
    ///
    /// Returns `truncated = true` if a big-data segment or the direct
    /// data cell could not be fully read — the caller should record a
    /// [`crate::error::Corruption::Value`] flag in that case rather than
    /// failing outright.
    pub fn resolve_data<S: ByteSource>(&self, store: &CellStore<S>) -> Result<ResolvedData> {
        if self.is_inline {
            let mut bytes = self.data_offset.to_le_bytes().to_vec();
            let len = (self.data_length as usize).min(4);
            bytes.truncate(len);
            return Ok(ResolvedData {
                bytes,
                truncated: false,
            });
        }

        if self.data_length == 0 {
            return Ok(ResolvedData {
                bytes: Vec::new(),
                truncated: false,
            });
        }

        let length = self.data_length as usize;

        let direct_cell = match store.allocated_cell_at(self.data_offset) {
            Ok(cell) => cell,
            Err(err) if err.is_always_fatal() => return Err(err),
            Err(_) => {
                tracing::warn!(offset = self.data_offset, "value data cell unreadable");
                return Ok(ResolvedData {
                    bytes: Vec::new(),
                    truncated: true,
                })
            }
        };

        if length > SEGMENT_SIZE || is_big_data_cell(&direct_cell.payload) {
            match read_big_data(store, self.data_offset, length) {
                Ok(result) => {
                    return Ok(ResolvedData {
                        bytes: result.data,
                        truncated: result.truncated,
                    })
                }
                Err(err) if err.is_always_fatal() => return Err(err),
                Err(_) => {
                    // Declared length says big-data, but the direct cell
                    // isn't `db`-signed: spec §4.6.1 treats this as value
                    // corruption, not a hard failure.
                    tracing::warn!(
                        offset = self.data_offset,
                        declared_length = length,
                        "value declares big-data length but direct cell has no db signature"
                    );
                    let available = direct_cell.payload.len();
                    let take = length.min(available);
                    return Ok(ResolvedData {
                        bytes: direct_cell.payload[..take].to_vec(),
                        truncated: true,
                    });
                }
            }
        }

        let available = direct_cell.payload.len();
        let take = length.min(available);
        Ok(ResolvedData {
            bytes: direct_cell.payload[..take].to_vec(),
            truncated: take < length,
        })
    }
}

/// A value's resolved data bytes, plus whether resolution stopped short
/// of the declared length.
#[derive(Debug, Clone)]
pub struct ResolvedData {
    /// Raw bytes, interpreted according to the value's [`ValueType`].
    pub bytes: Vec<u8>,
    /// True if fewer bytes were recovered than declared.
    pub truncated: bool,
}

/// Value types `as_string`/`as_string_utf16` accept (spec §4.6.2).
const STRING_TYPES: [ValueType; 3] = [
    ValueType::String,
    ValueType::ExpandString,
    ValueType::Link,
];

impl ResolvedData {
    /// Interprets the bytes as a `REG_DWORD`/`REG_DWORD_BIG_ENDIAN`. Valid
    /// only when `data_type` is one of those two and exactly 4 bytes were
    /// resolved (spec §4.6.2); anything else is a type mismatch rather
    /// than a silent `None`.
    pub fn as_u32(&self, data_type: ValueType) -> Result<u32> {
        if self.bytes.len() != 4 {
            return Err(type_mismatch("as_u32", data_type, self.bytes.len()));
        }
        let word = [self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]];
        match data_type {
            ValueType::Dword => Ok(u32::from_le_bytes(word)),
            ValueType::DwordBigEndian => Ok(u32::from_be_bytes(word)),
            _ => Err(type_mismatch("as_u32", data_type, self.bytes.len())),
        }
    }

    /// Interprets the bytes as a `REG_QWORD`. Valid only when `data_type`
    /// is `Qword` and exactly 8 bytes were resolved.
    pub fn as_u64(&self, data_type: ValueType) -> Result<u64> {
        if !matches!(data_type, ValueType::Qword) || self.bytes.len() != 8 {
            return Err(type_mismatch("as_u64", data_type, self.bytes.len()));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.bytes[..8]);
        Ok(u64::from_le_bytes(word))
    }

    /// Interprets the bytes as a `REG_SZ`/`REG_EXPAND_SZ`/`REG_LINK`
    /// string. Valid only when `data_type` is one of those three
    /// (spec §4.6.2).
    ///
    /// Some hives store an empty string value's data as a bare 4-byte
    /// all-zero buffer rather than a proper (empty) UTF-16LE sequence;
    /// lossy UTF-16 decoding naturally collapses that down to an empty
    /// string, so no special case is needed beyond trimming trailing
    /// NULs.
    pub fn as_string(
        &self,
        data_type: ValueType,
        codepage: Option<(&dyn Codepage, u32)>,
    ) -> Result<String> {
        if !STRING_TYPES.contains(&data_type) {
            return Err(type_mismatch("as_string", data_type, self.bytes.len()));
        }
        Ok(if let Some((cp, id)) = codepage {
            cp.decode(id, &self.bytes)
                .trim_end_matches('\0')
                .to_string()
        } else {
            read_utf16le_lossy(&self.bytes)
        })
    }

    /// Interprets the bytes as a `REG_MULTI_SZ`: a sequence of
    /// NUL-terminated UTF-16LE strings, terminating at the first empty
    /// string or end-of-data, whichever comes first (spec §4.6.2) — a
    /// later non-empty segment past that point is not resurrected.
    /// Valid only when `data_type` is `MultiString`.
    pub fn as_multi_string(&self, data_type: ValueType) -> Result<Vec<String>> {
        if data_type != ValueType::MultiString {
            return Err(type_mismatch("as_multi_string", data_type, self.bytes.len()));
        }
        let full = read_utf16le_lossy(&self.bytes);
        Ok(full
            .split('\u{0}')
            .take_while(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn type_mismatch(accessor: &str, data_type: ValueType, len: usize) -> RegistryError {
    RegistryError::TypeMismatch(format!(
        "{accessor} is not valid for type {data_type:?} (resolved {len} bytes)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::IOCache;
    use crate::source::SliceByteSource;
    use std::sync::Arc;

    fn vk_payload(name: &str, data_length_raw: u32, data_offset: u32, data_type: u32) -> Vec<u8> {
        let mut data = vec![0u8; 0x14 + name.len()];
        data[0..2].copy_from_slice(b"vk");
        data[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[0x04..0x08].copy_from_slice(&data_length_raw.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&data_type.to_le_bytes());
        data[0x10..0x12].copy_from_slice(&1u16.to_le_bytes()); // ASCII name flag
        data[0x14..].copy_from_slice(name.as_bytes());
        data
    }

    #[test]
    fn parses_inline_dword() {
        let payload = vk_payload("Count", INLINE_BIT | 4, 0x2A, 4);
        let vk = ValueKey::parse(&payload).unwrap();
        assert!(vk.is_inline);
        assert_eq!(vk.data_length, 4);
        assert_eq!(vk.name, "Count");
    }

    #[test]
    fn inline_dword_resolves_without_a_cell_store() {
        let payload = vk_payload("Count", INLINE_BIT | 4, 0x2A, 4);
        let vk = ValueKey::parse(&payload).unwrap();
        let cache = Arc::new(IOCache::new(SliceByteSource::new(vec![0u8; 4096]), 4));
        let store = CellStore::new(cache, 0, 4096, 256 * 1024 * 1024);
        let resolved = vk.resolve_data(&store).unwrap();
        assert_eq!(resolved.as_u32(ValueType::Dword).unwrap(), 0x2A);
    }

    #[test]
    fn default_value_uses_conventional_name() {
        let payload = vk_payload("", 0, 0, 0);
        let vk = ValueKey::parse(&payload).unwrap();
        assert_eq!(vk.name, DEFAULT_VALUE_NAME);
    }

    #[test]
    fn multi_string_splits_on_nul_and_drops_trailing_empty() {
        let raw: Vec<u8> = "a\0b\0\0"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        let resolved = ResolvedData {
            bytes: raw,
            truncated: false,
        };
        assert_eq!(
            resolved.as_multi_string(ValueType::MultiString).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn multi_string_rejects_mismatched_type() {
        let resolved = ResolvedData {
            bytes: Vec::new(),
            truncated: false,
        };
        assert!(resolved.as_multi_string(ValueType::Binary).is_err());
    }

    #[test]
    fn as_u32_rejects_wrong_type() {
        let resolved = ResolvedData {
            bytes: vec![0x2A, 0, 0, 0],
            truncated: false,
        };
        assert!(resolved.as_u32(ValueType::String).is_err());
    }

    #[test]
    fn too_short_payload_is_rejected() {
        let data = vec![0u8; 10];
        assert!(ValueKey::parse(&data).is_err());
    }
}
