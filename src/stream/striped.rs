//! Interleaves several equal-length streams in fixed-size stripes, round
//! robin, the way a striped volume concatenates its member disks.

use super::{SparseStream, StreamExtent};
use crate::error::{Error, Result};

pub struct StripedStream<T> {
    members: Vec<T>,
    stripe_size: u64,
    pos: u64,
}

impl<T: SparseStream> StripedStream<T> {
    pub fn new(members: Vec<T>, stripe_size: u64) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::invalid_format("striped stream needs at least one member"));
        }
        let first_len = members[0].len();
        if members.iter().any(|m| m.len() != first_len) {
            return Err(Error::invalid_format(
                "all striped stream members must have equal length",
            ));
        }
        Ok(Self {
            members,
            stripe_size,
            pos: 0,
        })
    }

    fn locate(&self, pos: u64) -> (usize, u64) {
        let stripe_index = pos / self.stripe_size;
        let member = (stripe_index as usize) % self.members.len();
        let stripe_round = stripe_index / self.members.len() as u64;
        let member_pos = stripe_round * self.stripe_size + pos % self.stripe_size;
        (member, member_pos)
    }
}

impl<T: SparseStream> SparseStream for StripedStream<T> {
    fn len(&self) -> u64 {
        self.members[0].len() * self.members.len() as u64
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() && self.pos < self.len() {
            let (member, member_pos) = self.locate(self.pos);
            let stripe_offset = (self.pos % self.stripe_size) as usize;
            let want = (buf.len() - total).min(self.stripe_size as usize - stripe_offset);
            self.members[member].set_position(member_pos);
            let n = self.members[member].read_at(&mut buf[total..total + want])?;
            if n == 0 {
                break;
            }
            total += n;
            self.pos += n as u64;
        }
        Ok(total)
    }

    fn write_at(&mut self, buf: &[u8]) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() {
            let (member, member_pos) = self.locate(self.pos);
            let stripe_offset = (self.pos % self.stripe_size) as usize;
            let want = (buf.len() - total).min(self.stripe_size as usize - stripe_offset);
            self.members[member].set_position(member_pos);
            let n = self.members[member].write_at(&buf[total..total + want])?;
            total += n;
            self.pos += n as u64;
        }
        Ok(total)
    }

    fn extents(&self) -> Vec<StreamExtent> {
        // Conservative: report the whole stream as one extent rather than
        // projecting each member's sparse extents through the stripe map.
        if self.len() == 0 {
            Vec::new()
        } else {
            vec![StreamExtent::new(0, self.len())]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::wrapping::WrappingStream;
    use std::io::Cursor;

    #[test]
    fn round_robin_across_members() {
        let a = WrappingStream::new(Cursor::new(vec![b'A'; 8]), 8);
        let b = WrappingStream::new(Cursor::new(vec![b'B'; 8]), 8);
        let mut s = StripedStream::new(vec![a, b], 4).unwrap();
        let mut buf = [0u8; 8];
        s.read_at(&mut buf).unwrap();
        assert_eq!(&buf, b"AAAABBBB");
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let a = WrappingStream::new(Cursor::new(vec![0u8; 8]), 8);
        let b = WrappingStream::new(Cursor::new(vec![0u8; 4]), 4);
        assert!(StripedStream::new(vec![a, b], 4).is_err());
    }
}
