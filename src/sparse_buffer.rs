//! An in-memory [`crate::stream::SparseStream`] backed by a sparse map of
//! fixed-size chunks, rather than one contiguous `Vec<u8>` — useful as a
//! scratch buffer for composing a small image in memory without paying for
//! the unwritten regions.

use crate::error::{Error, Result};
use crate::stream::{SparseStream, StreamExtent};
use std::collections::BTreeMap;

/// Mirrors the teacher's `DEFAULT_CHUNK_SIZE` naming convention.
pub const DEFAULT_CHUNK_SIZE: u64 = 4096;

pub struct SparseMemoryBuffer {
    chunks: BTreeMap<u64, Vec<u8>>,
    chunk_size: u64,
    len: u64,
    pos: u64,
}

impl SparseMemoryBuffer {
    pub fn new(len: u64) -> Self {
        Self::with_chunk_size(len, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(len: u64, chunk_size: u64) -> Self {
        Self {
            chunks: BTreeMap::new(),
            chunk_size,
            len,
            pos: 0,
        }
    }

    fn chunk_index(&self, pos: u64) -> u64 {
        pos / self.chunk_size
    }

    fn chunk_mut(&mut self, index: u64) -> &mut Vec<u8> {
        self.chunks
            .entry(index)
            .or_insert_with(|| vec![0u8; self.chunk_size as usize])
    }
}

impl SparseStream for SparseMemoryBuffer {
    fn len(&self) -> u64 {
        self.len
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        let max_len = self.len.saturating_sub(self.pos) as usize;
        let want = buf.len().min(max_len);
        let mut done = 0usize;
        while done < want {
            let pos = self.pos + done as u64;
            let index = self.chunk_index(pos);
            let offset_in_chunk = (pos % self.chunk_size) as usize;
            let avail_in_chunk = (self.chunk_size as usize - offset_in_chunk).min(want - done);
            match self.chunks.get(&index) {
                Some(chunk) => {
                    buf[done..done + avail_in_chunk]
                        .copy_from_slice(&chunk[offset_in_chunk..offset_in_chunk + avail_in_chunk]);
                }
                None => {
                    for b in buf[done..done + avail_in_chunk].iter_mut() {
                        *b = 0;
                    }
                }
            }
            done += avail_in_chunk;
        }
        self.pos += done as u64;
        Ok(done)
    }

    fn write_at(&mut self, buf: &[u8]) -> Result<usize> {
        if self.pos + buf.len() as u64 > self.len {
            return Err(Error::write_beyond_end(format!(
                "write at {} len {} exceeds buffer length {}",
                self.pos,
                buf.len(),
                self.len
            )));
        }
        let mut done = 0usize;
        while done < buf.len() {
            let pos = self.pos + done as u64;
            let index = self.chunk_index(pos);
            let offset_in_chunk = (pos % self.chunk_size) as usize;
            let avail_in_chunk =
                (self.chunk_size as usize - offset_in_chunk).min(buf.len() - done);
            let chunk_size = self.chunk_size as usize;
            let chunk = self.chunk_mut(index);
            chunk[offset_in_chunk..offset_in_chunk + avail_in_chunk]
                .copy_from_slice(&buf[done..done + avail_in_chunk]);
            debug_assert_eq!(chunk.len(), chunk_size);
            done += avail_in_chunk;
        }
        self.pos += done as u64;
        Ok(done)
    }

    fn extents(&self) -> Vec<StreamExtent> {
        let mut extents: Vec<StreamExtent> = Vec::new();
        for (&index, _) in self.chunks.iter() {
            let start = index * self.chunk_size;
            let length = self.chunk_size.min(self.len - start);
            match extents.last_mut() {
                Some(last) if last.end() == start => last.length += length,
                _ => extents.push(StreamExtent::new(start, length)),
            }
        }
        extents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_region_reads_zero() {
        let mut buf = SparseMemoryBuffer::with_chunk_size(16, 4);
        let mut out = [0xFFu8; 16];
        buf.read_at(&mut out).unwrap();
        assert_eq!(out, [0u8; 16]);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut buf = SparseMemoryBuffer::with_chunk_size(16, 4);
        buf.set_position(6);
        buf.write_at(&[1, 2, 3]).unwrap();
        buf.set_position(0);
        let mut out = [0u8; 16];
        buf.read_at(&mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 0, 0, 1, 2, 3, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn extents_merge_adjacent_chunks() {
        let mut buf = SparseMemoryBuffer::with_chunk_size(16, 4);
        buf.set_position(0);
        buf.write_at(&[1, 2, 3, 4]).unwrap();
        buf.set_position(4);
        buf.write_at(&[5, 6, 7, 8]).unwrap();
        buf.set_position(12);
        buf.write_at(&[9, 9, 9, 9]).unwrap();
        let extents = buf.extents();
        assert_eq!(extents, vec![StreamExtent::new(0, 8), StreamExtent::new(12, 4)]);
    }

    #[test]
    fn write_beyond_length_errors() {
        let mut buf = SparseMemoryBuffer::with_chunk_size(8, 4);
        buf.set_position(6);
        assert!(buf.write_at(&[1, 2, 3]).is_err());
    }
}
