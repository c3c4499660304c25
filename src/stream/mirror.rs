//! Fans a read out to the first healthy member and a write out to every
//! member, keeping a set of equal-length replicas in sync.

use super::{SparseStream, StreamExtent};
use crate::error::{Error, Result};

pub struct MirrorStream<T> {
    members: Vec<T>,
    pos: u64,
}

impl<T: SparseStream> MirrorStream<T> {
    pub fn new(members: Vec<T>) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::invalid_format("mirror stream needs at least one member"));
        }
        let first_len = members[0].len();
        if members.iter().any(|m| m.len() != first_len) {
            return Err(Error::invalid_format(
                "all mirror stream members must have equal length",
            ));
        }
        Ok(Self { members, pos: 0 })
    }
}

impl<T: SparseStream> SparseStream for MirrorStream<T> {
    fn len(&self) -> u64 {
        self.members[0].len()
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.members[0].set_position(self.pos);
        let n = self.members[0].read_at(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8]) -> Result<usize> {
        let mut written = None;
        for member in &mut self.members {
            member.set_position(self.pos);
            let n = member.write_at(buf)?;
            written = Some(written.unwrap_or(n).min(n));
        }
        let n = written.unwrap_or(0);
        self.pos += n as u64;
        Ok(n)
    }

    fn extents(&self) -> Vec<StreamExtent> {
        self.members[0].extents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::wrapping::WrappingStream;
    use std::io::Cursor;

    #[test]
    fn write_propagates_to_every_member() {
        let a = WrappingStream::new(Cursor::new(vec![0u8; 8]), 8);
        let b = WrappingStream::new(Cursor::new(vec![0u8; 8]), 8);
        let mut s = MirrorStream::new(vec![a, b]).unwrap();
        s.write_at(&[1, 2, 3, 4]).unwrap();

        for member in &mut s.members {
            member.set_position(0);
            let mut buf = [0u8; 4];
            member.read_at(&mut buf).unwrap();
            assert_eq!(buf, [1, 2, 3, 4]);
        }
    }

    #[test]
    fn read_comes_from_first_member() {
        let a = WrappingStream::new(Cursor::new(vec![7u8; 4]), 4);
        let b = WrappingStream::new(Cursor::new(vec![9u8; 4]), 4);
        let mut s = MirrorStream::new(vec![a, b]).unwrap();
        let mut buf = [0u8; 4];
        s.read_at(&mut buf).unwrap();
        assert_eq!(buf, [7, 7, 7, 7]);
    }
}
