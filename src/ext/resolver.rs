//! Translates an inode's logical byte offsets into physical block numbers
//! on the backing stream, following either the classic direct/indirect map
//! or the extent tree (§4.G), and exposes a `read`-style helper built on
//! top of that translation.

use super::extent_tree::{decode_extent_node, find_leaf_extent, select_index_child, ExtentNode};
use super::inode::Inode;
use crate::error::{Error, Result};
use crate::stream::SparseStream;

/// Resolves and reads an inode's data blocks against a mounted backing
/// stream, given the filesystem's block size.
pub struct ExtBlockResolver<S> {
    stream: S,
    block_size: u64,
}

fn read_exact_at<S: SparseStream>(stream: &mut S, offset: u64, buf: &mut [u8]) -> Result<()> {
    stream.set_position(offset);
    let mut done = 0usize;
    while done < buf.len() {
        let n = stream.read_at(&mut buf[done..])?;
        if n == 0 {
            return Err(Error::out_of_range(format!(
                "unexpected EOF reading {} bytes at offset {offset}",
                buf.len()
            )));
        }
        done += n;
    }
    Ok(())
}

impl<S: SparseStream> ExtBlockResolver<S> {
    pub fn new(stream: S, block_size: u64) -> Self {
        Self { stream, block_size }
    }

    fn read_block_u32(&mut self, block: u32, index_within_block: u64) -> Result<u32> {
        let offset = block as u64 * self.block_size + index_within_block * 4;
        let mut buf = [0u8; 4];
        read_exact_at(&mut self.stream, offset, &mut buf)?;
        Ok(crate::endian::read_u32_le(&buf))
    }

    /// Resolve logical block `l` via the classic direct/indirect/double-indirect
    /// map. Returns `None` for a hole (a zero pointer at any level).
    fn resolve_classic(&mut self, inode: &Inode, l: u64) -> Result<Option<u64>> {
        if l < 12 {
            let ptr = inode.direct_blocks()[l as usize];
            return Ok(if ptr == 0 { None } else { Some(ptr as u64) });
        }
        let per_block = self.block_size / 4;
        let mut l = l - 12;

        if l < per_block {
            let indirect = inode.indirect_block();
            if indirect == 0 {
                return Ok(None);
            }
            let ptr = self.read_block_u32(indirect, l)?;
            return Ok(if ptr == 0 { None } else { Some(ptr as u64) });
        }
        l -= per_block;

        if l < per_block * per_block {
            let double = inode.double_indirect_block();
            if double == 0 {
                return Ok(None);
            }
            let outer_index = l / per_block;
            let inner_index = l % per_block;
            let outer_ptr = self.read_block_u32(double, outer_index)?;
            if outer_ptr == 0 {
                return Ok(None);
            }
            let inner_ptr = self.read_block_u32(outer_ptr, inner_index)?;
            return Ok(if inner_ptr == 0 { None } else { Some(inner_ptr as u64) });
        }

        Err(Error::triple_indirect(format!(
            "logical block {} requires a triple-indirect lookup",
            l + 12 + per_block + per_block * per_block
        )))
    }

    /// Resolve logical block `l` via the extent tree rooted at the inode's
    /// `i_block`.
    fn resolve_extents(&mut self, inode: &Inode, l: u64) -> Result<Option<u64>> {
        let l = u32::try_from(l)
            .map_err(|_| Error::out_of_range("logical block exceeds extent tree's u32 range"))?;
        let mut node = decode_extent_node(&inode.i_block)?;
        loop {
            match node {
                ExtentNode::Leaf(leaves) => {
                    return Ok(find_leaf_extent(&leaves, l).map(|e| e.physical_block_for(l)));
                }
                ExtentNode::Index(indexes) => {
                    let Some(chosen) = select_index_child(&indexes, l) else {
                        return Ok(None);
                    };
                    let mut block = vec![0u8; self.block_size as usize];
                    read_exact_at(
                        &mut self.stream,
                        chosen.child_block * self.block_size,
                        &mut block,
                    )?;
                    node = decode_extent_node(&block)?;
                }
            }
        }
    }

    /// Resolve logical block `l` to a physical block number, or `None` for
    /// a sparse hole. Dispatches on `inode.uses_extents()`.
    pub fn resolve(&mut self, inode: &Inode, l: u64) -> Result<Option<u64>> {
        if inode.uses_extents() {
            self.resolve_extents(inode, l)
        } else {
            self.resolve_classic(inode, l)
        }
    }

    /// Read up to `buf.len()` bytes of `inode`'s data starting at byte
    /// offset `pos`, returning the number of bytes actually read (capped at
    /// `inode.size - pos`). Holes read back as zero without resolving or
    /// fetching the corresponding data block.
    pub fn read(&mut self, inode: &Inode, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let remaining = inode.size.saturating_sub(pos);
        let want = (buf.len() as u64).min(remaining) as usize;
        let mut done = 0usize;

        while done < want {
            let abs_pos = pos + done as u64;
            let logical_block = abs_pos / self.block_size;
            let block_offset = (abs_pos % self.block_size) as usize;
            let chunk = (self.block_size as usize - block_offset).min(want - done);

            match self.resolve(inode, logical_block)? {
                None => buf[done..done + chunk].fill(0),
                Some(physical) => {
                    let mut block = vec![0u8; self.block_size as usize];
                    read_exact_at(&mut self.stream, physical * self.block_size, &mut block)?;
                    buf[done..done + chunk]
                        .copy_from_slice(&block[block_offset..block_offset + chunk]);
                }
            }
            done += chunk;
        }
        Ok(done)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::inode::InodeFlags;
    use crate::stream::wrapping::WrappingStream;
    use std::io::Cursor;

    const BLOCK_SIZE: u64 = 1024;

    fn stream_from(data: Vec<u8>) -> WrappingStream<Cursor<Vec<u8>>> {
        let len = data.len() as u64;
        WrappingStream::new(Cursor::new(data), len)
    }

    fn make_inode(size: u64, i_block: [u8; 60]) -> Inode {
        Inode { size, flags: InodeFlags::empty(), i_block }
    }

    #[test]
    fn classic_direct_block_resolves() {
        let mut disk = vec![0u8; BLOCK_SIZE as usize * 20];
        disk[5 * BLOCK_SIZE as usize..5 * BLOCK_SIZE as usize + 4].copy_from_slice(b"data");
        let mut i_block = [0u8; 60];
        crate::endian::write_u32_le(&mut i_block[0..4], 5);
        let inode = make_inode(BLOCK_SIZE, i_block);

        let mut resolver = ExtBlockResolver::new(stream_from(disk), BLOCK_SIZE);
        assert_eq!(resolver.resolve(&inode, 0).unwrap(), Some(5));

        let mut buf = vec![0u8; 4];
        resolver.read(&inode, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"data");
    }

    #[test]
    fn ext_hole_read_returns_zeros_without_fetch() {
        // Inode of size 4 MiB, all direct and indirect pointers zero: every
        // byte in [0, 4 MiB) must read back as zero with no block fetch.
        let disk = vec![0xFFu8; BLOCK_SIZE as usize]; // poison: if ever read, assertion fails
        let inode = make_inode(4 * 1024 * 1024, [0u8; 60]);
        let mut resolver = ExtBlockResolver::new(stream_from(disk), BLOCK_SIZE);

        let mut buf = vec![0xAAu8; 8192];
        let n = resolver.read(&inode, 0, &mut buf).unwrap();
        assert_eq!(n, 8192);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn double_indirect_zero_outer_is_a_hole() {
        let per_block = BLOCK_SIZE / 4;
        let l = 12 + per_block; // first double-indirect-range block
        let disk = vec![0u8; BLOCK_SIZE as usize];
        let mut i_block = [0u8; 60];
        crate::endian::write_u32_le(&mut i_block[52..56], 1); // double_indirect_block = 1 (unread, stays zero pointer)
        let inode = make_inode(BLOCK_SIZE * 100, i_block);
        let mut resolver = ExtBlockResolver::new(stream_from(disk), BLOCK_SIZE);
        assert_eq!(resolver.resolve(&inode, l).unwrap(), None);
    }

    #[test]
    fn triple_indirect_is_rejected() {
        let per_block = BLOCK_SIZE / 4;
        let l = 12 + per_block + per_block * per_block;
        let disk = vec![0u8; BLOCK_SIZE as usize];
        let inode = make_inode(BLOCK_SIZE * (l + 1), [0u8; 60]);
        let mut resolver = ExtBlockResolver::new(stream_from(disk), BLOCK_SIZE);
        assert!(matches!(
            resolver.resolve(&inode, l),
            Err(Error::TripleIndirectUnsupported { .. })
        ));
    }

    #[test]
    fn extent_tree_resolves_leaf() {
        let mut i_block = [0u8; 60];
        crate::endian::write_u16_le(&mut i_block[0..2], 0xF30A);
        crate::endian::write_u16_le(&mut i_block[2..4], 1);
        crate::endian::write_u16_le(&mut i_block[4..6], 4);
        crate::endian::write_u16_le(&mut i_block[6..8], 0);
        crate::endian::write_u32_le(&mut i_block[12..16], 0); // first_logical_block
        crate::endian::write_u16_le(&mut i_block[16..18], 3); // num_blocks
        crate::endian::write_u16_le(&mut i_block[18..20], 0); // start_hi
        crate::endian::write_u32_le(&mut i_block[20..24], 50); // start_lo
        let mut flags = InodeFlags::empty();
        flags.insert(InodeFlags::EXTENTS_FL);
        let inode = Inode { size: BLOCK_SIZE * 3, flags, i_block };

        let disk = vec![0u8; BLOCK_SIZE as usize * 60];
        let mut resolver = ExtBlockResolver::new(stream_from(disk), BLOCK_SIZE);
        assert_eq!(resolver.resolve(&inode, 2).unwrap(), Some(52));
        assert_eq!(resolver.resolve(&inode, 5).unwrap(), None);
    }
}
