//! The codepage translation service the core consumes (spec §6).
//!
//! Legacy (pre-Unicode) key and value names can be flagged "ASCII" in their
//! owning cell, meaning the bytes are actually in whatever single/double-byte
//! codepage the hive's original OS locale used. Decoding that codepage is an
//! external concern per spec §1 — the core only needs *an* implementation of
//! [`Codepage`] to turn those bytes into UTF-8. [`WindowsCodepage`] is the
//! crate's own default so `regf-core` is useful standalone; a front-end that
//! wants exact legacy-locale fidelity can supply its own.

use encoding_rs::Encoding;

/// A codepage decoder, consumed by the core wherever a cell's "name is
/// ASCII" flag is set.
pub trait Codepage {
    /// Decodes `bytes` (in the codepage identified by `codepage_id`) to a
    /// UTF-8 `String`. Implementations should be lossy rather than
    /// fallible: a malformed legacy string is still a string.
    fn decode(&self, codepage_id: u32, bytes: &[u8]) -> String;
}

/// Default [`Codepage`] implementation backed by `encoding_rs`.
///
/// Covers the codepages spec §6 names as "recognized": 874, 932, 936, 949,
/// 950, 1250-1258, and the KOI8 family, defaulting to Windows-1252 for an
/// unrecognized id (spec §6's stated default).
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsCodepage;

impl WindowsCodepage {
    fn encoding_for(codepage_id: u32) -> &'static Encoding {
        match codepage_id {
            874 => encoding_rs::WINDOWS_874,
            932 => encoding_rs::SHIFT_JIS,
            936 => encoding_rs::GB18030,
            949 => encoding_rs::EUC_KR,
            950 => encoding_rs::BIG5,
            1250 => encoding_rs::WINDOWS_1250,
            1251 => encoding_rs::WINDOWS_1251,
            1252 => encoding_rs::WINDOWS_1252,
            1253 => encoding_rs::WINDOWS_1253,
            1254 => encoding_rs::WINDOWS_1254,
            1255 => encoding_rs::WINDOWS_1255,
            1256 => encoding_rs::WINDOWS_1256,
            1257 => encoding_rs::WINDOWS_1257,
            1258 => encoding_rs::WINDOWS_1258,
            20866 => encoding_rs::KOI8_R,
            21866 => encoding_rs::KOI8_U,
            _ => encoding_rs::WINDOWS_1252,
        }
    }
}

impl Codepage for WindowsCodepage {
    fn decode(&self, codepage_id: u32, bytes: &[u8]) -> String {
        let (decoded, _enc, _had_errors) = Self::encoding_for(codepage_id).decode(bytes);
        decoded.trim_end_matches('\0').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_codepage_decodes_ascii_subset() {
        let cp = WindowsCodepage;
        assert_eq!(cp.decode(1252, b"Hello"), "Hello");
    }

    #[test]
    fn unrecognized_codepage_falls_back_to_1252() {
        let cp = WindowsCodepage;
        assert_eq!(cp.decode(0, b"Test"), "Test");
    }

    #[test]
    fn trims_trailing_nul() {
        let cp = WindowsCodepage;
        assert_eq!(cp.decode(1252, b"Test\0"), "Test");
    }
}
