//! Rounds reads and writes out to a fixed block size, so an inner stream
//! that only supports whole-block I/O (a VDI/VMDK grain, an Ext block) can
//! still be addressed byte-granularly. A write that doesn't cover a whole
//! block is a read-modify-write: read the block into a scratch buffer,
//! splice in the caller's bytes, write the block back.

use super::{SparseStream, StreamExtent};
use crate::error::Result;

pub struct AligningStream<T> {
    inner: T,
    block_size: u64,
    pos: u64,
    scratch: Vec<u8>,
}

impl<T: SparseStream> AligningStream<T> {
    pub fn new(inner: T, block_size: u64) -> Self {
        Self {
            inner,
            block_size,
            pos: 0,
            scratch: vec![0u8; block_size as usize],
        }
    }

    fn block_start(&self, pos: u64) -> u64 {
        (pos / self.block_size) * self.block_size
    }
}

impl<T: SparseStream> SparseStream for AligningStream<T> {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() && self.pos < self.inner.len() {
            let block_start = self.block_start(self.pos);
            let offset_in_block = (self.pos - block_start) as usize;
            self.inner.set_position(block_start);
            let block_len = self.inner.read_at(&mut self.scratch)?;
            if block_len <= offset_in_block {
                break;
            }
            let available = block_len - offset_in_block;
            let want = (buf.len() - total).min(available);
            buf[total..total + want]
                .copy_from_slice(&self.scratch[offset_in_block..offset_in_block + want]);
            total += want;
            self.pos += want as u64;
        }
        Ok(total)
    }

    fn write_at(&mut self, buf: &[u8]) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() {
            let block_start = self.block_start(self.pos);
            let offset_in_block = (self.pos - block_start) as usize;
            let want = (buf.len() - total).min(self.scratch.len() - offset_in_block);
            let full_block = offset_in_block == 0 && want == self.scratch.len();

            if !full_block {
                self.inner.set_position(block_start);
                let read_len = self.inner.read_at(&mut self.scratch)?;
                for b in self.scratch[read_len..].iter_mut() {
                    *b = 0;
                }
            }
            self.scratch[offset_in_block..offset_in_block + want]
                .copy_from_slice(&buf[total..total + want]);

            self.inner.set_position(block_start);
            self.inner.write_at(&self.scratch)?;

            total += want;
            self.pos += want as u64;
        }
        Ok(total)
    }

    fn extents(&self) -> Vec<StreamExtent> {
        self.inner.extents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::wrapping::WrappingStream;
    use std::io::Cursor;

    #[test]
    fn unaligned_write_is_read_modify_write() {
        let base = WrappingStream::new(Cursor::new(vec![0xAAu8; 16]), 16);
        let mut s = AligningStream::new(base, 8);
        s.set_position(3);
        s.write_at(&[1, 2]).unwrap();

        s.set_position(0);
        let mut buf = [0u8; 8];
        s.read_at(&mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xAA, 0xAA, 1, 2, 0xAA, 0xAA, 0xAA]);
    }

    #[test]
    fn full_block_write_skips_read() {
        let base = WrappingStream::new(Cursor::new(vec![0u8; 8]), 8);
        let mut s = AligningStream::new(base, 8);
        s.write_at(&[1; 8]).unwrap();
        s.set_position(0);
        let mut buf = [0u8; 8];
        s.read_at(&mut buf).unwrap();
        assert_eq!(buf, [1; 8]);
    }
}
