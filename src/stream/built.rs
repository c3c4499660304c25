//! The read side of [`crate::builder::StreamBuilder`]: a flat, sorted list
//! of placed extents exposed as one [`SparseStream`], with a
//! last-used-extent cursor so sequential reads (the common case) don't pay
//! for a binary search on every call.

use super::{SparseStream, StreamExtent};
use crate::builder::BuilderExtent;
use crate::error::Result;

pub struct BuiltStream {
    extents: Vec<Box<dyn BuilderExtent>>,
    total_length: u64,
    pos: u64,
    current_index: usize,
}

impl BuiltStream {
    /// `extents` must already be sorted by `start()` with no overlaps;
    /// `StreamBuilder::build` is the only intended caller.
    pub(crate) fn new(extents: Vec<Box<dyn BuilderExtent>>, total_length: u64) -> Self {
        Self {
            extents,
            total_length,
            pos: 0,
            current_index: 0,
        }
    }

    /// Binary search for the extent containing `pos`, falling back to the
    /// cached `current_index` first since most callers read sequentially.
    fn locate(&mut self, pos: u64) -> Option<usize> {
        if let Some(ext) = self.extents.get(self.current_index) {
            if pos >= ext.start() && pos < ext.start() + ext.length() {
                return Some(self.current_index);
            }
        }
        let idx = self
            .extents
            .binary_search_by(|e| {
                if pos < e.start() {
                    std::cmp::Ordering::Greater
                } else if pos >= e.start() + e.length() {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()?;
        self.current_index = idx;
        Some(idx)
    }

    /// Start of the first extent at or past `pos`, or `total_length` if none
    /// remain — the boundary a gap read must stop zero-filling at.
    fn next_extent_start(&self, pos: u64) -> u64 {
        let idx = self.extents.partition_point(|e| e.start() <= pos);
        self.extents
            .get(idx)
            .map(|e| e.start())
            .unwrap_or(self.total_length)
    }

    /// Read at most `buf.len()` bytes starting at absolute offset `pos`,
    /// stopping early at an extent or gap boundary (the caller loops for
    /// the remainder).
    fn read_one(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        match self.locate(pos) {
            None => {
                let next_start = self.next_extent_start(pos);
                let span = (next_start - pos).min(buf.len() as u64) as usize;
                buf[..span].fill(0);
                Ok(span)
            }
            Some(idx) => {
                let ext = &mut self.extents[idx];
                let offset_in_extent = pos - ext.start();
                let available = (ext.length() - offset_in_extent) as usize;
                let this_read = buf.len().min(available);
                ext.prepare_for_read()?;
                let n = ext.read_at(offset_in_extent, &mut buf[..this_read])?;
                ext.dispose_read_state();
                Ok(n)
            }
        }
    }
}

impl SparseStream for BuiltStream {
    fn len(&self) -> u64 {
        self.total_length
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.total_length {
            return Ok(0);
        }
        let want = buf.len().min((self.total_length - self.pos) as usize);
        let mut done = 0usize;
        while done < want {
            let n = self.read_one(self.pos + done as u64, &mut buf[done..want])?;
            if n == 0 {
                break;
            }
            done += n;
        }
        self.pos += done as u64;
        Ok(done)
    }

    fn write_at(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(crate::error::Error::write_not_supported(
            "BuiltStream is read-only",
        ))
    }

    fn extents(&self) -> Vec<StreamExtent> {
        self.extents
            .iter()
            .map(|e| StreamExtent::new(e.start(), e.length()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StreamBuilder;

    struct ConstExtent {
        start: u64,
        length: u64,
        fill: u8,
    }

    impl BuilderExtent for ConstExtent {
        fn start(&self) -> u64 {
            self.start
        }
        fn length(&self) -> u64 {
            self.length
        }
        fn prepare_for_read(&mut self) -> Result<()> {
            Ok(())
        }
        fn read_at(&mut self, _offset_in_extent: u64, buf: &mut [u8]) -> Result<usize> {
            for b in buf.iter_mut() {
                *b = self.fill;
            }
            Ok(buf.len())
        }
        fn dispose_read_state(&mut self) {}
    }

    #[test]
    fn reads_through_gap_as_zero() {
        let mut builder = StreamBuilder::new();
        builder.add_extent(Box::new(ConstExtent {
            start: 0,
            length: 4,
            fill: 1,
        }));
        builder.add_extent(Box::new(ConstExtent {
            start: 8,
            length: 4,
            fill: 2,
        }));
        let mut built = builder.build(12);
        let mut buf = [0xFFu8; 12];
        built.read_at(&mut buf).unwrap();
        assert_eq!(buf, [1, 1, 1, 1, 0, 0, 0, 0, 2, 2, 2, 2]);
    }

    #[test]
    fn a_single_read_spanning_gap_into_next_extent_stops_zeros_at_the_boundary() {
        let mut builder = StreamBuilder::new();
        builder.add_extent(Box::new(ConstExtent {
            start: 0,
            length: 4,
            fill: 1,
        }));
        builder.add_extent(Box::new(ConstExtent {
            start: 8,
            length: 4,
            fill: 2,
        }));
        let mut built = builder.build(12);
        built.set_position(5);
        let mut buf = [0xFFu8; 6];
        let n = built.read_at(&mut buf).unwrap();
        assert_eq!(n, 6);
        assert_eq!(buf, [0, 0, 0, 2, 2, 2]);
    }

    #[test]
    fn cursor_speeds_up_sequential_reads() {
        let mut builder = StreamBuilder::new();
        for i in 0..4u64 {
            builder.add_extent(Box::new(ConstExtent {
                start: i * 4,
                length: 4,
                fill: i as u8,
            }));
        }
        let mut built = builder.build(16);
        for i in 0..4u64 {
            built.set_position(i * 4);
            let mut buf = [0u8; 4];
            built.read_at(&mut buf).unwrap();
            assert_eq!(buf, [i as u8; 4]);
        }
    }
}
