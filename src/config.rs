//! Resource bounds applied while opening and walking a hive (spec §6).
//!
//! These exist to keep a hostile or corrupted hive from driving the
//! parser into unbounded allocation or unbounded recursion; they are not
//! format limits and can be raised or lowered per caller.

/// Default ceiling on any single allocation driven by an on-disk length
/// field (a cell, a big-data reassembly, a string) — 256 MiB.
pub const DEFAULT_MAX_ALLOCATION_BYTES: u64 = 256 * 1024 * 1024;

/// Default cap on `ri` index-root recursion depth.
pub const DEFAULT_MAX_RI_DEPTH: u32 = 32;

/// Default cap on the number of components accepted in a `\`-separated
/// key path.
pub const DEFAULT_MAX_PATH_COMPONENTS: usize = 256;

/// Resource bounds for an open [`crate::tree::Hive`].
#[derive(Debug, Clone, Copy)]
pub struct HiveConfig {
    /// Ceiling on any single on-disk-length-driven allocation, in bytes.
    pub max_allocation_bytes: u64,
    /// Maximum `ri` index-root recursion depth.
    pub max_ri_depth: u32,
    /// Maximum number of components in a looked-up key path.
    pub max_path_components: usize,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            max_allocation_bytes: DEFAULT_MAX_ALLOCATION_BYTES,
            max_ri_depth: DEFAULT_MAX_RI_DEPTH,
            max_path_components: DEFAULT_MAX_PATH_COMPONENTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_bounds() {
        let config = HiveConfig::default();
        assert_eq!(config.max_allocation_bytes, 256 * 1024 * 1024);
        assert_eq!(config.max_ri_depth, 32);
        assert_eq!(config.max_path_components, 256);
    }
}
