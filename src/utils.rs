//! Little-endian binary readers and raw string helpers.
//!
//! Every multi-byte field in a hive is little-endian on disk (spec §9); the
//! readers here are the only place that assumption is encoded, so nothing
//! else in the crate depends on host endianness.

use crate::error::{RegistryError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Reads a `u16` at `offset` within `data`, little-endian.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let end = offset
        .checked_add(2)
        .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, data.len() as u64))?;
    let slice = data
        .get(offset..end)
        .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, data.len() as u64))?;
    Ok(Cursor::new(slice).read_u16::<LittleEndian>()?)
}

/// Reads a `u32` at `offset` within `data`, little-endian.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let end = offset
        .checked_add(4)
        .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, data.len() as u64))?;
    let slice = data
        .get(offset..end)
        .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, data.len() as u64))?;
    Ok(Cursor::new(slice).read_u32::<LittleEndian>()?)
}

/// Reads an `i32` at `offset` within `data`, little-endian.
pub fn read_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    let end = offset
        .checked_add(4)
        .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, data.len() as u64))?;
    let slice = data
        .get(offset..end)
        .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, data.len() as u64))?;
    Ok(Cursor::new(slice).read_i32::<LittleEndian>()?)
}

/// Reads a `u64` at `offset` within `data`, little-endian (used for the
/// FILETIME fields, which are not naturally 8-byte aligned within a cell).
pub fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    let end = offset
        .checked_add(8)
        .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, data.len() as u64))?;
    let slice = data
        .get(offset..end)
        .ok_or_else(|| RegistryError::offset_out_of_range(offset as u32, data.len() as u64))?;
    Ok(Cursor::new(slice).read_u64::<LittleEndian>()?)
}

/// Decodes `data` as raw (single-byte) text, replacing invalid bytes with
/// the Unicode replacement character and trimming a trailing NUL.
///
/// This is the fallback used when no [`crate::codepage::Codepage`] service
/// is supplied; callers that care about the hive's actual ASCII codepage
/// should decode the raw bytes themselves via that trait instead.
pub fn read_ascii_lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .to_string()
}

/// Decodes `data` as UTF-16LE, trimming a single trailing NUL code unit.
///
/// An odd-length input (a truncated or corrupt on-disk name) drops its
/// trailing byte rather than failing — the same tolerance spec §4.6.2
/// already requires of `REG_SZ`/`REG_EXPAND_SZ` string data, applied here
/// to names too, since a single malformed sibling name must never fail
/// the enumeration it's part of (spec §7). Unpaired surrogates are
/// replaced with U+FFFD rather than rejected, since registry strings
/// written by legacy tools are not always strictly valid UTF-16.
pub fn read_utf16le_lossy(data: &[u8]) -> String {
    let data = if data.len() % 2 != 0 {
        &data[..data.len() - 1]
    } else {
        data
    };
    let (decoded, _encoding, _had_errors) = encoding_rs::UTF_16LE.decode(data);
    decoded.trim_end_matches('\0').to_string()
}

/// Converts a Windows FILETIME (100ns intervals since 1601-01-01 UTC) to a
/// UTC timestamp, if representable. Shared by the base block and key node
/// last-written fields.
pub fn filetime_to_datetime(value: u64) -> Option<chrono::DateTime<chrono::Utc>> {
    const FILETIME_UNIX_DIFF_SECS: i64 = 11_644_473_600;
    let seconds = (value / 10_000_000) as i64 - FILETIME_UNIX_DIFF_SECS;
    let nanos = ((value % 10_000_000) * 100) as u32;
    chrono::DateTime::from_timestamp(seconds, nanos)
}

/// Reads a fixed-width UTF-16LE field (the base block's embedded hive
/// name), trimming trailing NULs.
pub fn read_fixed_utf16(data: &[u8]) -> String {
    let (decoded, _encoding, _had_errors) = encoding_rs::UTF_16LE.decode(data);
    decoded.trim_end_matches('\0').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_u32_le_roundtrip() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_u32_le(&data, 0).unwrap(), 0x0403_0201);
    }

    #[test]
    fn read_u32_le_out_of_range() {
        let data = [0x01, 0x02];
        assert!(read_u32_le(&data, 0).is_err());
    }

    #[test]
    fn read_u64_le_combines_two_words() {
        let mut data = [0u8; 8];
        data[0..4].copy_from_slice(&1u32.to_le_bytes());
        data[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(read_u64_le(&data, 0).unwrap(), 1 | (2u64 << 32));
    }

    #[test]
    fn utf16_trims_trailing_nul() {
        let data: Vec<u8> = "Hi\0".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(read_utf16le_lossy(&data), "Hi");
    }

    #[test]
    fn utf16_truncates_odd_length_instead_of_failing() {
        // "AB" followed by a stray trailing byte: the stray byte is dropped
        // and the well-formed prefix still decodes.
        let mut data: Vec<u8> = "AB".encode_utf16().flat_map(u16::to_le_bytes).collect();
        data.push(0x41);
        assert_eq!(read_utf16le_lossy(&data), "AB");
        assert_eq!(read_utf16le_lossy(&[0x41]), "");
    }

    #[test]
    fn ascii_lossy_trims_trailing_nul_only() {
        assert_eq!(read_ascii_lossy(b"Hello\0\0"), "Hello");
        assert_eq!(read_ascii_lossy(b"Hello\0World\0\0"), "Hello\0World");
    }
}
