//! Owned-vs-borrowed stream composition, replacing a boolean "do I own
//! this" tag with an enum the borrow checker can actually verify.
//!
//! Streams that wrap another stream (`SubStream`, `AligningStream`, ...)
//! sometimes need to own the inner stream (they constructed it themselves)
//! and sometimes need to borrow it (the caller keeps using it directly
//! afterwards). The teacher's `vmdk/reader.rs` reaches for `Arc<Mmap>` when
//! the underlying data is read-only and genuinely shared across many
//! readers; `Owned` is for the single-writer case where shared ownership
//! would be the wrong tool — a wrapper either owns its inner stream
//! outright or borrows it for a bounded lifetime, never both at once.

use super::SparseStream;

/// Either an owned, boxed stream or a borrowed one.
pub enum Owned<'a, T: ?Sized> {
    Owned(Box<T>),
    Borrowed(&'a mut T),
}

impl<'a, T: ?Sized> Owned<'a, T> {
    pub fn as_mut(&mut self) -> &mut T {
        match self {
            Owned::Owned(b) => b.as_mut(),
            Owned::Borrowed(r) => r,
        }
    }

    pub fn as_ref(&self) -> &T {
        match self {
            Owned::Owned(b) => b.as_ref(),
            Owned::Borrowed(r) => r,
        }
    }
}

impl<'a, T: SparseStream + ?Sized> SparseStream for Owned<'a, T> {
    fn len(&self) -> u64 {
        self.as_ref().len()
    }

    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn set_position(&mut self, pos: u64) {
        self.as_mut().set_position(pos)
    }

    fn read_at(&mut self, buf: &mut [u8]) -> crate::error::Result<usize> {
        self.as_mut().read_at(buf)
    }

    fn write_at(&mut self, buf: &[u8]) -> crate::error::Result<usize> {
        self.as_mut().write_at(buf)
    }

    fn extents(&self) -> Vec<super::StreamExtent> {
        self.as_ref().extents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sub::SubStream;
    use crate::stream::wrapping::WrappingStream;

    #[test]
    fn owned_and_borrowed_delegate_len() {
        let base = WrappingStream::new(std::io::Cursor::new(vec![0u8; 16]), 16);
        let mut owned: Owned<SubStream<WrappingStream<std::io::Cursor<Vec<u8>>>>> =
            Owned::Owned(Box::new(SubStream::new(base, 0, 16)));
        assert_eq!(owned.len(), 16);
        owned.set_position(4);
        assert_eq!(owned.position(), 4);
    }
}
