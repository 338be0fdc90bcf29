//! Little-endian XOR-32 checksum used by the base block.
//!
//! libregf's `libregf_checksum_calculate_little_endian_xor32` implements an
//! alignment-aware fast path over native-word-sized reads before falling
//! back to a scalar byte loop. spec.md §9 calls that fast path "subtle" and
//! asks for a scalar implementation whose result does not depend on host
//! endianness or buffer alignment; this is that scalar implementation.

/// Computes the little-endian XOR-32 checksum of `data`, starting from
/// `initial_value`.
///
/// Successive 4-byte little-endian words are XORed into the running value.
/// A trailing 1-3 byte tail (not expected for the 508-byte base-block
/// checksum, but handled for generality) is treated as the low bytes of a
/// final word with the missing high bytes zero.
pub fn xor32_le(data: &[u8], initial_value: u32) -> u32 {
    let mut value = initial_value;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        value ^= word;
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut bytes = [0u8; 4];
        bytes[..tail.len()].copy_from_slice(tail);
        value ^= u32::from_le_bytes(bytes);
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_identity() {
        assert_eq!(xor32_le(&[], 0), 0);
        assert_eq!(xor32_le(&[], 0xDEAD_BEEF), 0xDEAD_BEEF);
    }

    #[test]
    fn single_word() {
        assert_eq!(xor32_le(&[0x01, 0x02, 0x03, 0x04], 0), 0x0403_0201);
    }

    #[test]
    fn xor_is_its_own_inverse() {
        let data = [0xAA; 508];
        let v = xor32_le(&data, 0);
        assert_eq!(xor32_le(&data, v), 0);
    }

    #[test]
    fn trailing_bytes_zero_extended() {
        assert_eq!(xor32_le(&[0x01, 0x02, 0x03], 0), 0x0003_0201);
    }

    #[test]
    fn result_independent_of_buffer_alignment() {
        // Prepend an arbitrary amount of padding before a misaligned buffer
        // start to show the algorithm doesn't special-case alignment.
        let payload: Vec<u8> = (0u8..=255).cycle().take(508).collect();
        for pad in 0..8 {
            let mut buf = vec![0u8; pad];
            buf.extend_from_slice(&payload);
            let aligned_view = &buf[pad..];
            assert_eq!(xor32_le(aligned_view, 0), xor32_le(&payload, 0));
        }
    }

    proptest::proptest! {
        #[test]
        fn deterministic_regardless_of_grouping(data in proptest::collection::vec(0u8..=255, 0..600)) {
            let once = xor32_le(&data, 0);
            let twice = xor32_le(&data, 0);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
