//! Big data (`db`) reassembly for values over 16,344 bytes.
//!
//! A `db` cell doesn't hold the value's bytes itself — it points at a
//! segment-offset list, each entry of which is a separate cell holding up
//! to 16,344 bytes of the real payload. Every non-terminal segment must be
//! exactly that size; only the last may be shorter (spec §4.6.2).
//!
//! Reassembly tolerates a corrupted or missing segment by returning
//! whatever was collected before the failure, flagged as truncated,
//! rather than failing the whole value — the same tolerance libregf's
//! `libregf_data_block_stream` applies when a segment cell can't be read.

use crate::cell::CellType;
use crate::error::{RegistryError, Result};
use crate::source::ByteSource;
use crate::store::CellStore;
use crate::utils::{read_u16_le, read_u32_le};

/// Exact size of every non-terminal big-data segment.
pub const SEGMENT_SIZE: usize = 16344;

/// Signature for a big-data header cell ("db").
pub const BIG_DATA_SIGNATURE: &[u8; 2] = b"db";

/// Result of reassembling a big-data value.
#[derive(Debug, Clone)]
pub struct BigDataResult {
    /// Reassembled bytes, possibly shorter than requested if a segment
    /// could not be read.
    pub data: Vec<u8>,
    /// True if reassembly stopped early because of a missing or
    /// malformed segment.
    pub truncated: bool,
}

/// Parsed `db` header: segment count and the offset of the segment-offset
/// list cell.
#[derive(Debug, Clone, Copy)]
struct BigDataHeader {
    segment_count: u16,
    segment_list_offset: u32,
}

impl BigDataHeader {
    fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 8 {
            return Err(RegistryError::offset_out_of_range(0, payload.len() as u64));
        }
        if &payload[0..2] != BIG_DATA_SIGNATURE {
            return Err(RegistryError::bad_signature(BIG_DATA_SIGNATURE, &payload[0..2]));
        }
        let segment_count = read_u16_le(payload, 0x02)?;
        let segment_list_offset = read_u32_le(payload, 0x04)?;
        Ok(Self {
            segment_count,
            segment_list_offset,
        })
    }
}

/// Reassembles a value's data from a `db` header cell at `header_offset`,
/// stopping once `total_length` bytes have been collected or a segment
/// can't be resolved.
pub fn read_big_data<S: ByteSource>(
    store: &CellStore<S>,
    header_offset: u32,
    total_length: usize,
) -> Result<BigDataResult> {
    let header_cell = store.allocated_cell_at(header_offset)?;
    let header = BigDataHeader::parse(&header_cell.payload)?;
    tracing::trace!(
        header_offset,
        segment_count = header.segment_count,
        total_length,
        "reassembling big-data value"
    );

    let list_cell = match store.allocated_cell_at(header.segment_list_offset) {
        Ok(cell) => cell,
        Err(err) if err.is_always_fatal() => return Err(err),
        Err(_) => {
            tracing::debug!(
                offset = header.segment_list_offset,
                "big-data segment list cell unreadable"
            );
            return Ok(BigDataResult {
                data: Vec::new(),
                truncated: true,
            })
        }
    };

    let mut offsets = Vec::with_capacity(header.segment_count as usize);
    for i in 0..header.segment_count as usize {
        let at = i * 4;
        if at + 4 > list_cell.payload.len() {
            break;
        }
        offsets.push(read_u32_le(&list_cell.payload, at)?);
    }

    let mut data = Vec::with_capacity(total_length.min(offsets.len() * SEGMENT_SIZE));
    let mut truncated = false;

    for (i, &seg_offset) in offsets.iter().enumerate() {
        if data.len() >= total_length {
            break;
        }

        let remaining = total_length - data.len();
        let is_last_segment = i == offsets.len() - 1;
        let expected_len = if is_last_segment {
            remaining.min(SEGMENT_SIZE)
        } else {
            SEGMENT_SIZE
        };

        let segment_cell = match store.allocated_cell_at(seg_offset) {
            Ok(cell) => cell,
            Err(err) if err.is_always_fatal() => return Err(err),
            Err(_) => {
                tracing::debug!(offset = seg_offset, segment = i, "big-data segment cell unreadable");
                truncated = true;
                break;
            }
        };

        // A non-terminal segment shorter than SEGMENT_SIZE is itself
        // corruption: there's no well-defined way to keep reassembling.
        if !is_last_segment && segment_cell.payload.len() < SEGMENT_SIZE {
            tracing::debug!(offset = seg_offset, segment = i, "undersized non-terminal big-data segment");
            truncated = true;
            break;
        }

        let take = expected_len.min(segment_cell.payload.len()).min(remaining);
        data.extend_from_slice(&segment_cell.payload[..take]);
        if take < expected_len {
            truncated = true;
            break;
        }
    }

    if data.len() < total_length {
        truncated = true;
    }

    Ok(BigDataResult { data, truncated })
}

/// True if a cell's first two bytes carry the `db` signature, regardless
/// of [`CellType`] dispatch elsewhere.
pub fn is_big_data_cell(payload: &[u8]) -> bool {
    payload.len() >= 2
        && CellType::from_signature(&[payload[0], payload[1]]) == Some(CellType::DataBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::IOCache;
    use crate::source::SliceByteSource;
    use std::sync::Arc;

    fn put_cell(data: &mut [u8], offset: usize, payload: &[u8]) {
        let total_size = 4 + payload.len();
        let total_size = total_size + (8 - total_size % 8) % 8; // 8-byte align
        data[offset..offset + 4].copy_from_slice(&(-(total_size as i32)).to_le_bytes());
        data[offset + 4..offset + 4 + payload.len()].copy_from_slice(payload);
    }

    fn store_with(region: Vec<u8>) -> CellStore<SliceByteSource> {
        let size = region.len() as u64;
        let cache = Arc::new(IOCache::new(SliceByteSource::new(region), 16));
        CellStore::new(cache, 0, size, 256 * 1024 * 1024)
    }

    #[test]
    fn reassembles_two_segments() {
        let mut region = vec![0u8; 4096 * 3];
        region[0..4].copy_from_slice(b"hbin");
        region[8..12].copy_from_slice(&(4096u32 * 3).to_le_bytes());

        let first_len = SEGMENT_SIZE;
        let second_len = 100;
        let total = first_len + second_len;

        let seg1_offset = 4096u32 + 32;
        let seg2_offset = 8192u32 + 32;
        let list_offset = 32u32;
        let header_offset = 64u32;

        let seg1 = vec![0xAAu8; first_len];
        let seg2 = vec![0xBBu8; second_len];

        put_cell(&mut region, seg1_offset as usize, &seg1);
        put_cell(&mut region, seg2_offset as usize, &seg2);

        let mut list_payload = Vec::new();
        list_payload.extend_from_slice(&seg1_offset.to_le_bytes());
        list_payload.extend_from_slice(&seg2_offset.to_le_bytes());
        put_cell(&mut region, list_offset as usize, &list_payload);

        let mut header_payload = vec![0u8; 8];
        header_payload[0..2].copy_from_slice(b"db");
        header_payload[2..4].copy_from_slice(&2u16.to_le_bytes());
        header_payload[4..8].copy_from_slice(&list_offset.to_le_bytes());
        put_cell(&mut region, header_offset as usize, &header_payload);

        let store = store_with(region);
        let result = read_big_data(&store, header_offset, total).unwrap();
        assert!(!result.truncated);
        assert_eq!(result.data.len(), total);
        assert_eq!(&result.data[0..4], &[0xAA, 0xAA, 0xAA, 0xAA]);
        assert_eq!(&result.data[first_len..first_len + 4], &[0xBB, 0xBB, 0xBB, 0xBB]);
    }

    #[test]
    fn missing_segment_truncates_instead_of_failing() {
        let mut region = vec![0u8; 4096 * 2];
        region[0..4].copy_from_slice(b"hbin");
        region[8..12].copy_from_slice(&(4096u32 * 2).to_le_bytes());

        let total = SEGMENT_SIZE + 50;
        let bogus_offset = 0xFFFFu32;
        let list_offset = 32u32;
        let header_offset = 64u32;

        let mut list_payload = Vec::new();
        list_payload.extend_from_slice(&bogus_offset.to_le_bytes());
        put_cell(&mut region, list_offset as usize, &list_payload);

        let mut header_payload = vec![0u8; 8];
        header_payload[0..2].copy_from_slice(b"db");
        header_payload[2..4].copy_from_slice(&1u16.to_le_bytes());
        header_payload[4..8].copy_from_slice(&list_offset.to_le_bytes());
        put_cell(&mut region, header_offset as usize, &header_payload);

        let store = store_with(region);
        let result = read_big_data(&store, header_offset, total).unwrap();
        assert!(result.truncated);
        assert!(result.data.len() < total);
    }

    #[test]
    fn recognizes_big_data_signature() {
        let mut payload = vec![0u8; 8];
        payload[0..2].copy_from_slice(b"db");
        assert!(is_big_data_cell(&payload));
        payload[0..2].copy_from_slice(b"nk");
        assert!(!is_big_data_cell(&payload));
    }
}
