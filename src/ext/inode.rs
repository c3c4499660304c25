//! Ext2/3/4 inode decode: file size, the 60-byte block-pointer union (either
//! the classic direct/indirect/double/triple pointer array or an extent-tree
//! root), and the flag that says which interpretation applies.

use crate::error::{Error, Result};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InodeFlags: u32 {
        const INDEX_FL = 0x0000_1000;
        const EXTENTS_FL = 0x0008_0000;
        const HUGE_FILE_FL = 0x0004_0000;
    }
}

/// A decoded inode. `i_block` is kept as raw bytes rather than parsed
/// eagerly: the resolver reinterprets it as either twelve direct pointers
/// plus three indirect pointers, or an extent-tree root, based on
/// [`InodeFlags::EXTENTS_FL`].
#[derive(Debug, Clone)]
pub struct Inode {
    pub size: u64,
    pub flags: InodeFlags,
    pub i_block: [u8; 60],
}

impl Inode {
    pub fn uses_extents(&self) -> bool {
        self.flags.contains(InodeFlags::EXTENTS_FL)
    }

    /// The classic map's twelve direct block pointers.
    pub fn direct_blocks(&self) -> [u32; 12] {
        let mut out = [0u32; 12];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = crate::endian::read_u32_le(&self.i_block[i * 4..i * 4 + 4]);
        }
        out
    }

    pub fn indirect_block(&self) -> u32 {
        crate::endian::read_u32_le(&self.i_block[48..52])
    }

    pub fn double_indirect_block(&self) -> u32 {
        crate::endian::read_u32_le(&self.i_block[52..56])
    }

    /// Kept for identification purposes only; the resolver never follows it
    /// (`Error::TripleIndirectUnsupported`).
    pub fn triple_indirect_block(&self) -> u32 {
        crate::endian::read_u32_le(&self.i_block[56..60])
    }
}

/// Decode a single inode record. `buf` must be at least `inode_size` bytes
/// (the superblock's `inode_size`, commonly 128 or 256); only the leading
/// 0xA0 bytes this module cares about are read.
pub fn decode_inode(buf: &[u8]) -> Result<Inode> {
    if buf.len() < 0xA0 {
        return Err(Error::invalid_format("ext inode buffer too short"));
    }
    let size_lo = crate::endian::read_u32_le(&buf[4..8]);
    let size_hi = crate::endian::read_u32_le(&buf[0x6C..0x70]);
    let size = ((size_hi as u64) << 32) | size_lo as u64;
    let flags = InodeFlags::from_bits_truncate(crate::endian::read_u32_le(&buf[0x20..0x24]));
    let mut i_block = [0u8; 60];
    i_block.copy_from_slice(&buf[0x28..0x28 + 60]);
    Ok(Inode { size, flags, i_block })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reads_size_and_direct_pointers() {
        let mut buf = vec![0u8; 0xA0];
        crate::endian::write_u32_le(&mut buf[4..8], 12345);
        crate::endian::write_u32_le(&mut buf[0x28..0x2C], 50); // direct_blocks[0]
        let inode = decode_inode(&buf).unwrap();
        assert_eq!(inode.size, 12345);
        assert!(!inode.uses_extents());
        assert_eq!(inode.direct_blocks()[0], 50);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let buf = vec![0u8; 10];
        assert!(decode_inode(&buf).is_err());
    }

    #[test]
    fn extents_flag_is_detected() {
        let mut buf = vec![0u8; 0xA0];
        crate::endian::write_u32_le(&mut buf[0x20..0x24], InodeFlags::EXTENTS_FL.bits());
        let inode = decode_inode(&buf).unwrap();
        assert!(inode.uses_extents());
    }
}
