//! Base block (4096-byte file header) decoding.

use crate::checksum::xor32_le;
use crate::error::{RegistryError, Result};
use crate::utils::{filetime_to_datetime, read_fixed_utf16, read_u32_le, read_u64_le};
use std::fmt;

/// Size of the base block in bytes.
pub const BASE_BLOCK_SIZE: usize = 4096;

/// Expected signature for a valid registry hive ("regf").
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// Offset of the checksum field within the base block.
const CHECKSUM_OFFSET: usize = 0x1FC;

/// Number of bytes the checksum covers.
const CHECKSUM_COVERED_LEN: usize = 508;

/// Lowest supported minor version for major version 1 (spec §3: minor
/// 0-2 are not supported by readers for this profile).
const MIN_SUPPORTED_MINOR: u32 = 3;

/// Highest supported minor version.
const MAX_SUPPORTED_MINOR: u32 = 6;

/// Parsed base block header.
///
/// `checksum_matches` records whether the stored checksum agreed with the
/// recomputed one; a mismatch is advisory (spec §4.1) and is surfaced by
/// the caller as a [`crate::error::Corruption::Checksum`] flag on the
/// hive, not as a parse failure.
#[derive(Debug, Clone)]
pub struct BaseBlock {
    /// Primary sequence number.
    pub primary_sequence: u32,
    /// Secondary sequence number.
    pub secondary_sequence: u32,
    /// Last-written FILETIME (100ns intervals since 1601-01-01 UTC).
    pub last_written: u64,
    /// Major version. Only `1` is recognized.
    pub major_version: u32,
    /// Minor version. Supported: 3-6.
    pub minor_version: u32,
    /// File type; must be 0 for a hive.
    pub file_type: u32,
    /// File format; must be 1 for a hive.
    pub file_format: u32,
    /// Root-cell offset, relative to the start of the hive-bins data.
    pub root_cell_offset: u32,
    /// Hive-bins data size in bytes.
    pub hive_bins_data_size: u32,
    /// Clustering factor.
    pub clustering_factor: u32,
    /// Informational hive name embedded in the header (UTF-16LE, NUL
    /// terminated).
    pub hive_name: String,
    /// Checksum value stored in the header.
    pub stored_checksum: u32,
    /// Whether `stored_checksum` matched the recomputed checksum.
    pub checksum_matches: bool,
}

impl BaseBlock {
    /// Parses a 4096-byte base block.
    ///
    /// Fails (propagating, per spec §7) on a bad signature, bad file
    /// type/format, or an unsupported version. A checksum mismatch is
    /// recorded in `checksum_matches` rather than failing the parse.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(RegistryError::offset_out_of_range(
                BASE_BLOCK_SIZE as u32,
                data.len() as u64,
            ));
        }

        let signature = &data[0..4];
        if signature != REGF_SIGNATURE {
            return Err(RegistryError::bad_signature(REGF_SIGNATURE, signature));
        }

        let primary_sequence = read_u32_le(data, 0x04)?;
        let secondary_sequence = read_u32_le(data, 0x08)?;
        let last_written = read_u64_le(data, 0x0C)?;
        let major_version = read_u32_le(data, 0x14)?;
        let minor_version = read_u32_le(data, 0x18)?;
        let file_type = read_u32_le(data, 0x1C)?;
        let file_format = read_u32_le(data, 0x20)?;
        let root_cell_offset = read_u32_le(data, 0x24)?;
        let hive_bins_data_size = read_u32_le(data, 0x28)?;
        let clustering_factor = read_u32_le(data, 0x2C)?;
        let hive_name = read_fixed_utf16(&data[0x30..0x70]);
        let stored_checksum = read_u32_le(data, CHECKSUM_OFFSET)?;

        if file_type != 0 || file_format != 1 {
            return Err(RegistryError::InvalidArgument(format!(
                "unexpected file_type/file_format: {file_type}/{file_format}"
            )));
        }

        if major_version != 1
            || minor_version < MIN_SUPPORTED_MINOR
            || minor_version > MAX_SUPPORTED_MINOR
        {
            return Err(RegistryError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let recomputed = xor32_le(&data[0..CHECKSUM_COVERED_LEN], 0);
        let checksum_matches = recomputed == stored_checksum;

        Ok(BaseBlock {
            primary_sequence,
            secondary_sequence,
            last_written,
            major_version,
            minor_version,
            file_type,
            file_format,
            root_cell_offset,
            hive_bins_data_size,
            clustering_factor,
            hive_name,
            stored_checksum,
            checksum_matches,
        })
    }

    /// True when the primary and secondary sequence numbers disagree — an
    /// advisory sign the hive was not cleanly unmapped ("dirty hive").
    pub fn is_dirty(&self) -> bool {
        self.primary_sequence != self.secondary_sequence
    }

    /// Converts `last_written` to a UTC timestamp, if representable.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        filetime_to_datetime(self.last_written)
    }
}

impl fmt::Display for BaseBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "regf v{}.{} root={:#x} hive_bins_size={} dirty={} name={:?}",
            self.major_version,
            self.minor_version,
            self.root_cell_offset,
            self.hive_bins_data_size,
            self.is_dirty(),
            self.hive_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_header(minor: u32) -> Vec<u8> {
        let mut data = vec![0u8; BASE_BLOCK_SIZE];
        data[0..4].copy_from_slice(REGF_SIGNATURE);
        data[0x18..0x1C].copy_from_slice(&minor.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes()); // major = 1
        data[0x20..0x24].copy_from_slice(&1u32.to_le_bytes()); // file_format = 1
        data[0x24..0x28].copy_from_slice(&32u32.to_le_bytes()); // root offset
        data[0x28..0x2C].copy_from_slice(&4096u32.to_le_bytes()); // hive bins size
        let checksum = xor32_le(&data[0..CHECKSUM_COVERED_LEN], 0);
        data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        data
    }

    #[test]
    fn parses_minimal_valid_header() {
        let data = minimal_header(5);
        let bb = BaseBlock::parse(&data).unwrap();
        assert!(bb.checksum_matches);
        assert_eq!(bb.root_cell_offset, 32);
        assert_eq!(bb.hive_bins_data_size, 4096);
        assert!(!bb.is_dirty());
    }

    #[test]
    fn checksum_mismatch_is_not_fatal() {
        let mut data = minimal_header(5);
        data[CHECKSUM_OFFSET] ^= 1;
        let bb = BaseBlock::parse(&data).unwrap();
        assert!(!bb.checksum_matches);
    }

    #[test]
    fn bad_signature_is_fatal() {
        let mut data = minimal_header(5);
        data[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(
            BaseBlock::parse(&data),
            Err(RegistryError::BadSignature { .. })
        ));
    }

    #[test]
    fn unsupported_minor_version_is_fatal() {
        let data = minimal_header(2);
        assert!(matches!(
            BaseBlock::parse(&data),
            Err(RegistryError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn supports_minor_versions_three_through_six() {
        for minor in 3..=6 {
            let data = minimal_header(minor);
            assert!(BaseBlock::parse(&data).is_ok(), "minor {minor} should parse");
        }
    }

    #[test]
    fn too_small_is_rejected() {
        let data = vec![0u8; 100];
        assert!(BaseBlock::parse(&data).is_err());
    }

    #[test]
    fn dirty_hive_advisory() {
        let mut data = minimal_header(5);
        data[0x08..0x0C].copy_from_slice(&2u32.to_le_bytes());
        let checksum = xor32_le(&data[0..CHECKSUM_COVERED_LEN], 0);
        data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        let bb = BaseBlock::parse(&data).unwrap();
        assert!(bb.is_dirty());
    }
}
