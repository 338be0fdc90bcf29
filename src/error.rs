//! Error types and the corruption-vs-fatal split used throughout the core.
//!
//! Windows registry hives routinely carry small, localized corruption —
//! a truncated subkey list, a value whose data cell was never committed —
//! without the rest of the hive being unreadable. The taxonomy here keeps
//! those two failure classes apart: [`RegistryError`] is for faults that
//! prevent interpreting the cell containing them at all (and therefore
//! propagate through `Result`), while [`Corruption`] records faults local
//! to a single key, subkey list, or value that the enclosing operation
//! recovers from and reports as a flag instead.

use std::io;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that prevent a core operation from completing.
///
/// Every variant here corresponds to one of the fatal kinds in the error
/// taxonomy: `InvalidArgument`, `IO`, `UnsupportedVersion`, `BadSignature`,
/// `LengthExceedsMaximum`, `OffsetOutOfRange`, `TypeMismatch`, `Aborted`.
/// `NotFound` is deliberately absent — "no such key/value" is a normal
/// `None`/empty result, not an error. Localized corruption
/// (`CorruptedChecksum`/`CorruptedHiveBin`/`CorruptedCell`/
/// `CorruptedSubkeyList`/`CorruptedValue`) is likewise absent: see
/// [`Corruption`].
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A caller passed a null, empty, or otherwise invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying byte source failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// REGF major/minor version outside the supported set.
    #[error("unsupported hive version: {major}.{minor}")]
    UnsupportedVersion {
        /// Major version read from the base block.
        major: u32,
        /// Minor version read from the base block.
        minor: u32,
    },

    /// A `regf`/`hbin`/cell signature did not match what was expected.
    #[error("bad signature: expected {expected:?}, found {found:?}")]
    BadSignature {
        /// Expected signature bytes.
        expected: Vec<u8>,
        /// Signature bytes actually present.
        found: Vec<u8>,
    },

    /// A declared length exceeds the configured allocation ceiling.
    #[error("length {length} exceeds configured maximum {maximum}")]
    LengthExceedsMaximum {
        /// Declared length that triggered the check.
        length: u64,
        /// Configured ceiling.
        maximum: u64,
    },

    /// An offset points outside the hive-bins region or crosses a cell
    /// boundary.
    #[error("offset {offset:#x} is out of range (region size {region_size:#x})")]
    OffsetOutOfRange {
        /// Offset that failed validation, relative to the hive-bins start.
        offset: u32,
        /// Size of the hive-bins region the offset was checked against.
        region_size: u64,
    },

    /// A typed value accessor was called on a value of the wrong type or
    /// size.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The operation was cancelled via the hive's abort flag.
    #[error("operation aborted")]
    Aborted,
}

impl RegistryError {
    /// Builds a [`RegistryError::BadSignature`].
    pub fn bad_signature(expected: &[u8], found: &[u8]) -> Self {
        Self::BadSignature {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    /// Builds a [`RegistryError::LengthExceedsMaximum`].
    pub fn length_exceeds_maximum(length: u64, maximum: u64) -> Self {
        Self::LengthExceedsMaximum { length, maximum }
    }

    /// Builds a [`RegistryError::OffsetOutOfRange`].
    pub fn offset_out_of_range(offset: u32, region_size: u64) -> Self {
        Self::OffsetOutOfRange {
            offset,
            region_size,
        }
    }

    /// True for the kinds that must always propagate out of a hive
    /// operation, even when the failure originated from a single subkey
    /// or value entry a caller would otherwise downgrade to a
    /// [`Corruption`] flag (spec §7: "IO, LengthExceedsMaximum, and
    /// InvalidArgument always propagate").
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::LengthExceedsMaximum { .. } | Self::InvalidArgument(_) | Self::Aborted
        )
    }
}

/// A localized integrity failure recorded on the entity that discovered
/// it, rather than failing the containing operation.
///
/// See spec §7: "integrity failures local to a single subkey or value are
/// recorded as corruption flags on the enclosing entity and do not fail
/// the parent operation."
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    /// Base-block checksum did not match the stored value. Advisory only.
    Checksum,
    /// An `hbin` header failed validation (bad signature or offset
    /// mismatch) while scanning for the bin containing some cell.
    HiveBin {
        /// Byte offset (relative to the hive-bins region) being resolved
        /// when the corruption was found.
        at_offset: u32,
    },
    /// A cell failed containment or signature validation.
    Cell {
        /// Offset of the offending cell.
        at_offset: u32,
    },
    /// A subkey list (`lf`/`lh`/`li`/`ri`) was truncated, oversized, or
    /// nested beyond the recursion cap.
    SubkeyList {
        /// Offset of the list cell.
        at_offset: u32,
    },
    /// A value's data could not be fully resolved (short cell, bad
    /// big-data segment count/offset).
    Value {
        /// Offset of the `vk` cell.
        at_offset: u32,
    },
}

impl std::fmt::Display for Corruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Corruption::Checksum => write!(f, "base block checksum mismatch"),
            Corruption::HiveBin { at_offset } => {
                write!(f, "corrupted hive bin near offset {at_offset:#x}")
            }
            Corruption::Cell { at_offset } => write!(f, "corrupted cell at {at_offset:#x}"),
            Corruption::SubkeyList { at_offset } => {
                write!(f, "corrupted subkey list at {at_offset:#x}")
            }
            Corruption::Value { at_offset } => write!(f, "corrupted value at {at_offset:#x}"),
        }
    }
}
