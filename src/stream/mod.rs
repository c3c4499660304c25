//! A uniform, extent-aware random-access byte view.
//!
//! Every format engine in this crate (ISO-9660, Ext, VMDK, VDI) ultimately
//! exposes file or disk contents as a [`SparseStream`]: something you can
//! seek, read, and (for a subset of wrappers) write, while also being able
//! to ask which byte ranges are actually backed by data versus implicitly
//! zero. That second question is what makes these streams "sparse" — a
//! VMDK extent with no grain allocated, or an Ext hole, reads back as zero
//! without ever touching a disk block for it.

pub mod aligning;
pub mod built;
pub mod circular;
pub mod mirror;
pub mod ownership;
pub mod striped;
pub mod sub;
pub mod wrapping;

pub use ownership::Owned;

use crate::error::Result;

/// One contiguous backed byte range within a stream, in stream-relative
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamExtent {
    pub start: u64,
    pub length: u64,
}

impl StreamExtent {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn intersects(&self, start: u64, length: u64) -> bool {
        self.start < start + length && start < self.end()
    }
}

/// The common interface every stream wrapper in this module implements.
///
/// A default-provided [`SparseStream::extents_in_range`] filters
/// [`SparseStream::extents`] down to the requested window; wrappers that can
/// compute the intersection more cheaply than a full extent list (e.g.
/// [`built::BuiltStream`]'s binary search) override it.
pub trait SparseStream {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self) -> u64;

    fn set_position(&mut self, pos: u64);

    /// Read up to `buf.len()` bytes starting at the current position,
    /// advancing it by the number of bytes read. Positions inside declared
    /// extents but never written, or outside any extent but inside `len()`,
    /// read back as zero.
    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` at the current position, advancing it. Returns
    /// `Error::WriteNotSupported` for read-only wrappers and
    /// `Error::WriteBeyondEnd` for a write that would extend a fixed-length
    /// stream.
    fn write_at(&mut self, buf: &[u8]) -> Result<usize>;

    /// All backed byte ranges, in ascending, non-overlapping order.
    fn extents(&self) -> Vec<StreamExtent>;

    fn extents_in_range(&self, start: u64, length: u64) -> Vec<StreamExtent> {
        self.extents()
            .into_iter()
            .filter(|e| e.intersects(start, length))
            .collect()
    }
}
