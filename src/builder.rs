//! Lays out a set of byte-range-producing extents into one flat,
//! random-access [`crate::stream::built::BuiltStream`] — the shared
//! machinery both the ISO-9660 builder (`iso9660::builder`) and any future
//! image builder use to go from "here are my pieces" to "here is one
//! stream I can copy to disk".

use crate::error::Result;
use crate::stream::built::BuiltStream;
use std::io::Write;

/// The default chunk size `write_to` copies in, matching the teacher's
/// `DEFAULT_CHUNK_SIZE` convention in `export.rs`.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// One placed, readable region of a built stream. Implementations own
/// whatever state producing their bytes needs (a file handle, an in-memory
/// buffer, a reference into another stream) and may defer opening that
/// state until `prepare_for_read`.
pub trait BuilderExtent: Send {
    fn start(&self) -> u64;
    fn length(&self) -> u64;

    /// Called once before the first `read_at` on this extent; a no-op for
    /// extents that need no setup.
    fn prepare_for_read(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read `buf.len()` bytes (or fewer, at end-of-extent) starting
    /// `offset_in_extent` bytes into this extent.
    fn read_at(&mut self, offset_in_extent: u64, buf: &mut [u8]) -> Result<usize>;

    /// Called after the last read planned against this extent; a no-op by
    /// default, overridden by extents holding onto read-only scratch state
    /// (a decompression buffer, a cached grain) worth releasing early.
    fn dispose_read_state(&mut self) {}
}

/// Receives extents from a format-specific layout pass. `StreamBuilder`
/// implements this; a `FixExtents` closure is handed a `&mut dyn
/// BuilderExtentSink` so it can add extents without needing to know the
/// concrete builder type.
pub trait BuilderExtentSink {
    fn add_extent(&mut self, extent: Box<dyn BuilderExtent>);
}

/// A layout-fixing pass: given a sink to register extents against, lay out
/// whatever region it's responsible for and return the total stream length.
/// Format-specific builders (the ISO-9660 builder's path-table and
/// volume-descriptor regions, which depend on the final positions of
/// everything laid out before them) implement this as a closure.
pub type FixExtents = Box<dyn FnOnce(&mut dyn BuilderExtentSink) -> Result<u64>>;

/// Accumulates extents and produces one [`BuiltStream`] sorted by start
/// offset.
#[derive(Default)]
pub struct StreamBuilder {
    extents: Vec<Box<dyn BuilderExtent>>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self {
            extents: Vec::new(),
        }
    }

    pub fn add_extent(&mut self, extent: Box<dyn BuilderExtent>) {
        self.extents.push(extent);
    }

    /// Run a format-specific fixing pass against this builder, returning
    /// whatever total length it computed.
    pub fn fix_extents(&mut self, fix: FixExtents) -> Result<u64> {
        fix(self)
    }

    pub fn build(mut self, total_length: u64) -> BuiltStream {
        self.extents.sort_by_key(|e| e.start());
        BuiltStream::new(self.extents, total_length)
    }
}

impl BuilderExtentSink for StreamBuilder {
    fn add_extent(&mut self, extent: Box<dyn BuilderExtent>) {
        self.extents.push(extent);
    }
}

/// Copy a built stream's full contents to `out`, `DEFAULT_CHUNK_SIZE` bytes
/// at a time.
pub fn write_to(stream: &mut BuiltStream, out: &mut impl Write) -> Result<()> {
    use crate::stream::SparseStream;

    let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
    stream.set_position(0);
    loop {
        let n = stream.read_at(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ZeroExtent {
        start: u64,
        length: u64,
    }

    impl BuilderExtent for ZeroExtent {
        fn start(&self) -> u64 {
            self.start
        }
        fn length(&self) -> u64 {
            self.length
        }
        fn read_at(&mut self, _offset_in_extent: u64, buf: &mut [u8]) -> Result<usize> {
            for b in buf.iter_mut() {
                *b = 0;
            }
            Ok(buf.len())
        }
    }

    #[test]
    fn build_sorts_out_of_order_extents() {
        let mut builder = StreamBuilder::new();
        builder.add_extent(Box::new(ZeroExtent { start: 8, length: 4 }));
        builder.add_extent(Box::new(ZeroExtent { start: 0, length: 4 }));
        let built = builder.build(12);
        let starts: Vec<u64> = built.extents().iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![0, 8]);
    }

    #[test]
    fn write_to_copies_full_length() {
        let mut builder = StreamBuilder::new();
        builder.add_extent(Box::new(ZeroExtent {
            start: 0,
            length: 10,
        }));
        let mut built = builder.build(10);
        let mut out = Vec::new();
        write_to(&mut built, &mut out).unwrap();
        assert_eq!(out.len(), 10);
    }
}
