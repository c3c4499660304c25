//! Adapts any `Read + Write + Seek` type (a `File`, a `Cursor<Vec<u8>>`) into
//! a [`SparseStream`]. `WrappingMappedStream` is the same adapter for a
//! backing type that already knows its own backed extents (a memory-mapped
//! VMDK/VDI file where everything between 0 and `len` is "backed" by
//! definition, unlike a genuinely sparse stream).

use super::{SparseStream, StreamExtent};
use crate::error::{Error, Result};
use std::io::{Read, Seek, SeekFrom, Write};

/// Wraps an I/O type, reporting the whole `[0, len)` range as one extent.
pub struct WrappingStream<T> {
    inner: T,
    len: u64,
    pos: u64,
}

impl<T: Read + Write + Seek> WrappingStream<T> {
    pub fn new(inner: T, len: u64) -> Self {
        Self { inner, len, pos: 0 }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Read + Write + Seek> SparseStream for WrappingStream<T> {
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
        self.inner
            .seek(SeekFrom::Start(self.pos))
            .map_err(Error::io_simple)?;
        let n = self.inner.read(buf).map_err(Error::io_simple)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8]) -> Result<usize> {
        if self.pos + buf.len() as u64 > self.len {
            return Err(Error::write_beyond_end(format!(
                "write at {} len {} exceeds stream length {}",
                self.pos,
                buf.len(),
                self.len
            )));
        }
        self.inner
            .seek(SeekFrom::Start(self.pos))
            .map_err(Error::io_simple)?;
        let n = self.inner.write(buf).map_err(Error::io_simple)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn extents(&self) -> Vec<StreamExtent> {
        if self.len == 0 {
            Vec::new()
        } else {
            vec![StreamExtent::new(0, self.len)]
        }
    }
}

/// Like `WrappingStream`, but the caller supplies the backed-extent list
/// rather than assuming the whole range is backed — used for a
/// memory-mapped file whose logical sparseness comes from a format-level
/// structure (a grain table, a block allocation table) rather than from the
/// file itself.
pub struct WrappingMappedStream<T> {
    inner: T,
    len: u64,
    pos: u64,
    extents: Vec<StreamExtent>,
}

impl<T: Read + Write + Seek> WrappingMappedStream<T> {
    pub fn new(inner: T, len: u64, extents: Vec<StreamExtent>) -> Self {
        Self {
            inner,
            len,
            pos: 0,
            extents,
        }
    }

    pub fn set_extents(&mut self, extents: Vec<StreamExtent>) {
        self.extents = extents;
    }
}

impl<T: Read + Write + Seek> SparseStream for WrappingMappedStream<T> {
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
        self.inner
            .seek(SeekFrom::Start(self.pos))
            .map_err(Error::io_simple)?;
        let n = self.inner.read(buf).map_err(Error::io_simple)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8]) -> Result<usize> {
        if self.pos + buf.len() as u64 > self.len {
            return Err(Error::write_beyond_end(format!(
                "write at {} len {} exceeds stream length {}",
                self.pos,
                buf.len(),
                self.len
            )));
        }
        self.inner
            .seek(SeekFrom::Start(self.pos))
            .map_err(Error::io_simple)?;
        let n = self.inner.write(buf).map_err(Error::io_simple)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn extents(&self) -> Vec<StreamExtent> {
        self.extents.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_write_round_trip() {
        let mut s = WrappingStream::new(Cursor::new(vec![0u8; 16]), 16);
        s.set_position(4);
        s.write_at(&[1, 2, 3, 4]).unwrap();
        s.set_position(4);
        let mut buf = [0u8; 4];
        s.read_at(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn write_beyond_end_errors() {
        let mut s = WrappingStream::new(Cursor::new(vec![0u8; 4]), 4);
        s.set_position(2);
        assert!(s.write_at(&[1, 2, 3]).is_err());
    }

    #[test]
    fn mapped_stream_reports_custom_extents() {
        let s = WrappingMappedStream::new(
            Cursor::new(vec![0u8; 16]),
            16,
            vec![StreamExtent::new(4, 4)],
        );
        assert_eq!(s.extents(), vec![StreamExtent::new(4, 4)]);
    }
}
