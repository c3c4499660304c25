//! The VDI block table: one little-endian `u32` per logical block, either a
//! physical block index or one of the `BLOCK_FREE`/`BLOCK_ZERO` sentinels.

use crate::stream::StreamExtent;
pub use super::header::{BLOCK_FREE, BLOCK_ZERO};

#[derive(Debug, Clone)]
pub struct BlockTable {
    entries: Vec<u32>,
}

impl BlockTable {
    pub fn from_entries(entries: Vec<u32>) -> Self {
        Self { entries }
    }

    pub fn decode(data: &[u8], blocks_count: u32) -> Self {
        let entries = data[..blocks_count as usize * 4]
            .chunks_exact(4)
            .map(crate::endian::read_u32_le)
            .collect();
        Self { entries }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 4);
        for &entry in &self.entries {
            out.extend_from_slice(&entry.to_le_bytes());
        }
        out
    }

    pub fn get(&self, block: u32) -> u32 {
        self.entries[block as usize]
    }

    pub fn set(&mut self, block: u32, value: u32) {
        self.entries[block as usize] = value;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset, in bytes, of one entry's on-disk position within the table.
    pub fn entry_byte_offset(block: u32) -> u64 {
        block as u64 * 4
    }

    /// Forward-scan the table, collapsing runs of allocated (non-sentinel)
    /// blocks into logical byte-range extents.
    pub fn extents(&self, block_size: u64) -> Vec<StreamExtent> {
        let mut out = Vec::new();
        let mut run_start: Option<u32> = None;

        for (i, &entry) in self.entries.iter().enumerate() {
            let allocated = entry != BLOCK_FREE && entry != BLOCK_ZERO;
            match (allocated, run_start) {
                (true, None) => run_start = Some(i as u32),
                (false, Some(start)) => {
                    out.push(StreamExtent::new(start as u64 * block_size, (i as u64 - start as u64) * block_size));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            let len = self.entries.len() as u64 - start as u64;
            out.push(StreamExtent::new(start as u64 * block_size, len * block_size));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let table = BlockTable::from_entries(vec![0, BLOCK_FREE, 1, BLOCK_ZERO]);
        let bytes = table.encode();
        let decoded = BlockTable::decode(&bytes, 4);
        assert_eq!(decoded.get(0), 0);
        assert_eq!(decoded.get(1), BLOCK_FREE);
        assert_eq!(decoded.get(2), 1);
        assert_eq!(decoded.get(3), BLOCK_ZERO);
    }

    #[test]
    fn extents_collapse_contiguous_allocated_runs() {
        let table = BlockTable::from_entries(vec![0, 1, BLOCK_FREE, 2, BLOCK_ZERO, 3, 4]);
        let extents = table.extents(1024);
        assert_eq!(
            extents,
            vec![
                StreamExtent::new(0, 2048),
                StreamExtent::new(3072, 1024),
                StreamExtent::new(5120, 2048),
            ]
        );
    }

    #[test]
    fn all_sentinel_table_has_no_extents() {
        let table = BlockTable::from_entries(vec![BLOCK_FREE, BLOCK_ZERO, BLOCK_FREE]);
        assert!(table.extents(1024).is_empty());
    }
}
