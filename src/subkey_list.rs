//! Subkey list parsing and flattening (`lf`/`lh`/`li`/`ri`).
//!
//! A key's subkeys are indexed by one of three leaf list shapes (`li`,
//! `lf`, `lh`), optionally fanned out across many leaves by an `ri` index
//! root. [`flatten`] walks that structure into one ordered list of subkey
//! (`nk`) offsets, tolerating a corrupted branch by recording a
//! [`crate::error::Corruption::SubkeyList`] flag and continuing with
//! whatever else resolved (spec §4.5).

use crate::config::HiveConfig;
use crate::error::{Corruption, RegistryError, Result};
use crate::source::ByteSource;
use crate::store::CellStore;
use crate::utils::{read_u16_le, read_u32_le};

/// One entry in a subkey list: the offset of the subkey's `nk` cell, plus
/// whatever name hint the owning leaf type carries (a 4-char ASCII hint
/// for `lf`, a hash for `lh`, nothing for `li`).
#[derive(Debug, Clone, Copy)]
pub struct SubkeyEntry {
    /// Offset of the subkey's `nk` cell.
    pub key_offset: u32,
    /// `lh` name hash, when the owning leaf was a hash leaf.
    pub hash_hint: Option<u32>,
}

/// Recognized subkey list leaf/root signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    IndexLeaf,
    FastLeaf,
    HashLeaf,
    IndexRoot,
}

impl ListKind {
    fn from_signature(sig: &[u8; 2]) -> Option<Self> {
        match sig {
            b"li" => Some(ListKind::IndexLeaf),
            b"lf" => Some(ListKind::FastLeaf),
            b"lh" => Some(ListKind::HashLeaf),
            b"ri" => Some(ListKind::IndexRoot),
            _ => None,
        }
    }
}

/// Flattens the subkey list rooted at `root_offset` into an ordered list
/// of subkey entries.
///
/// `ri` index roots are followed recursively up to
/// [`HiveConfig::max_ri_depth`] levels; deeper nesting is treated as
/// corruption rather than an infinite/stack-exhausting recursion. Any
/// sublist that can't be read or parsed is skipped (with a corruption
/// flag recorded) rather than failing the whole key.
pub fn flatten<S: ByteSource>(
    store: &CellStore<S>,
    root_offset: u32,
    config: &HiveConfig,
    corruptions: &mut Vec<Corruption>,
) -> Result<Vec<SubkeyEntry>> {
    flatten_at_depth(store, root_offset, config, 0, corruptions)
}

fn flatten_at_depth<S: ByteSource>(
    store: &CellStore<S>,
    offset: u32,
    config: &HiveConfig,
    depth: u32,
    corruptions: &mut Vec<Corruption>,
) -> Result<Vec<SubkeyEntry>> {
    tracing::trace!(offset, depth, "walking subkey list");

    if depth > config.max_ri_depth {
        tracing::warn!(offset, depth, "subkey list nesting exceeds max_ri_depth");
        corruptions.push(Corruption::SubkeyList { at_offset: offset });
        return Ok(Vec::new());
    }

    let cell = match store.allocated_cell_at(offset) {
        Ok(cell) => cell,
        Err(err) if err.is_always_fatal() => return Err(err),
        Err(_) => {
            tracing::warn!(offset, "subkey list cell unreadable");
            corruptions.push(Corruption::SubkeyList { at_offset: offset });
            return Ok(Vec::new());
        }
    };

    match parse_list(&cell.payload) {
        Ok(ParsedList::Leaf(entries, truncated)) => {
            if truncated {
                tracing::warn!(offset, "subkey list leaf shorter than declared count");
                corruptions.push(Corruption::SubkeyList { at_offset: offset });
            }
            Ok(entries)
        }
        Ok(ParsedList::Root(sublist_offsets)) => {
            let mut flattened = Vec::new();
            for sub_offset in sublist_offsets {
                let mut sub =
                    flatten_at_depth(store, sub_offset, config, depth + 1, corruptions)?;
                flattened.append(&mut sub);
            }
            Ok(flattened)
        }
        Err(err) if err.is_always_fatal() => Err(err),
        Err(_) => {
            tracing::warn!(offset, "subkey list cell unparseable");
            corruptions.push(Corruption::SubkeyList { at_offset: offset });
            Ok(Vec::new())
        }
    }
}

enum ParsedList {
    /// Parsed entries, plus whether the declared count exceeded what the
    /// cell actually had room for.
    Leaf(Vec<SubkeyEntry>, bool),
    Root(Vec<u32>),
}

/// Parses a subkey-list cell payload.
///
/// A leaf whose declared entry count doesn't fit the cell's actual size
/// is not a fatal error: as many whole entries as fit are parsed, and the
/// shortfall is reported via [`ParsedList::Leaf`]'s truncated flag rather
/// than discarding everything that *did* parse (spec §8 S6 — an
/// `nk`/list mismatch marks the parent corrupted but still yields the
/// subkeys that were readable).
fn parse_list(data: &[u8]) -> Result<ParsedList> {
    if data.len() < 4 {
        return Err(RegistryError::offset_out_of_range(4, data.len() as u64));
    }
    let kind = ListKind::from_signature(&[data[0], data[1]])
        .ok_or_else(|| RegistryError::bad_signature(b"lf/lh/li/ri", &data[0..2]))?;
    let declared_count = read_u16_le(data, 0x02)? as usize;

    match kind {
        ListKind::IndexLeaf => {
            let available = (data.len() - 4) / 4;
            let count = declared_count.min(available);
            let mut entries = Vec::with_capacity(count);
            for i in 0..count {
                let key_offset = read_u32_le(data, 4 + i * 4)?;
                entries.push(SubkeyEntry {
                    key_offset,
                    hash_hint: None,
                });
            }
            Ok(ParsedList::Leaf(entries, count < declared_count))
        }
        ListKind::FastLeaf | ListKind::HashLeaf => {
            let available = (data.len() - 4) / 8;
            let count = declared_count.min(available);
            let mut entries = Vec::with_capacity(count);
            for i in 0..count {
                let entry_pos = 4 + i * 8;
                let key_offset = read_u32_le(data, entry_pos)?;
                let hint = read_u32_le(data, entry_pos + 4)?;
                entries.push(SubkeyEntry {
                    key_offset,
                    hash_hint: if kind == ListKind::HashLeaf {
                        Some(hint)
                    } else {
                        None
                    },
                });
            }
            Ok(ParsedList::Leaf(entries, count < declared_count))
        }
        ListKind::IndexRoot => {
            let available = (data.len() - 4) / 4;
            let count = declared_count.min(available);
            let mut offsets = Vec::with_capacity(count);
            for i in 0..count {
                offsets.push(read_u32_le(data, 4 + i * 4)?);
            }
            Ok(ParsedList::Root(offsets))
        }
    }
}

/// Computes the `lh` name hash: `hash = hash * 37 + uppercase(code_unit)`
/// over the name's UTF-16 code units (spec §4.5.2).
///
/// Uppercasing is approximated via [`char::to_uppercase`] on each BMP code
/// point; a code unit with no single-codepoint uppercase mapping (or that
/// is itself a surrogate half) is hashed unmodified. This matches the
/// common case exactly and degrades gracefully outside it, rather than
/// attempting a full Unicode case-folding table the on-disk format was
/// never specified against.
pub fn lh_hash(name: &str) -> u32 {
    let mut hash: u32 = 0;
    for unit in name.encode_utf16() {
        let upper = char::from_u32(unit as u32)
            .and_then(|c| c.to_uppercase().next())
            .map(|c| c as u32 & 0xFFFF)
            .unwrap_or(unit as u32);
        hash = hash.wrapping_mul(37).wrapping_add(upper);
    }
    hash
}
