//! Ext2/3/4 superblock: the fixed 1024-byte structure at disk offset 1024
//! describing block/inode layout and the feature flags that determine which
//! of the other decoders in this module apply.

use crate::error::{Error, Result};

pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const SUPERBLOCK_SIZE: usize = 1024;

const EXT_MAGIC: u16 = 0xEF53;

bitflags::bitflags! {
    /// Optional features; safe to ignore if unsupported.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompatFeatures: u32 {
        const DIR_PREALLOC = 0x0001;
        const IMAGIC_INODES = 0x0002;
        const HAS_JOURNAL = 0x0004;
        const EXT_ATTR = 0x0008;
        const RESIZE_INODE = 0x0010;
        const DIR_INDEX = 0x0020;
        const SPARSE_SUPER2 = 0x0200;
    }
}

bitflags::bitflags! {
    /// Features required to read or write the filesystem at all.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IncompatFeatures: u32 {
        const COMPRESSION = 0x0001;
        const FILETYPE = 0x0002;
        const RECOVER = 0x0004;
        const JOURNAL_DEV = 0x0008;
        const META_BG = 0x0010;
        const EXTENTS = 0x0040;
        const BIT64 = 0x0080;
        const MMP = 0x0100;
        const FLEX_BG = 0x0200;
        const EA_INODE = 0x0400;
        const DIRDATA = 0x1000;
        const CSUM_SEED = 0x2000;
        const LARGEDIR = 0x4000;
        const INLINE_DATA = 0x8000;
    }
}

bitflags::bitflags! {
    /// Features that, if unsupported, force a read-only mount.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RoCompatFeatures: u32 {
        const SPARSE_SUPER = 0x0001;
        const LARGE_FILE = 0x0002;
        const HUGE_FILE = 0x0008;
        const GDT_CSUM = 0x0010;
        const DIR_NLINK = 0x0020;
        const EXTRA_ISIZE = 0x0040;
        const QUOTA = 0x0100;
        const BIGALLOC = 0x0200;
        const METADATA_CSUM = 0x0400;
    }
}

/// A decoded Ext2/3/4 superblock. Only the fields this crate's resolver and
/// identification logic need are exposed; the remainder of the 1024-byte
/// structure is validated for length but not retained.
#[derive(Debug, Clone)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u64,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub inode_size: u16,
    pub feature_compat: CompatFeatures,
    pub feature_incompat: IncompatFeatures,
    pub feature_ro_compat: RoCompatFeatures,
    pub uuid: uuid::Uuid,
    pub volume_name: String,
    pub journal_inode: u32,
}

impl Superblock {
    /// Block size in bytes: `1024 << log_block_size`.
    pub fn block_size(&self) -> u64 {
        1024u64 << self.log_block_size
    }

    pub fn has_extents(&self) -> bool {
        self.feature_incompat.contains(IncompatFeatures::EXTENTS)
    }

    pub fn has_journal(&self) -> bool {
        self.feature_compat.contains(CompatFeatures::HAS_JOURNAL)
    }
}

/// Decode a superblock from its raw 1024-byte region (the caller reads this
/// slice from offset [`SUPERBLOCK_OFFSET`] of the backing device/stream).
pub fn decode_superblock(buf: &[u8]) -> Result<Superblock> {
    if buf.len() < SUPERBLOCK_SIZE {
        return Err(Error::invalid_format("ext superblock buffer too short"));
    }

    let magic = crate::endian::read_u16_le(&buf[56..58]);
    if magic != EXT_MAGIC {
        return Err(Error::invalid_format(format!(
            "ext superblock magic mismatch: expected {EXT_MAGIC:#06x}, got {magic:#06x}"
        )));
    }

    let inodes_count = crate::endian::read_u32_le(&buf[0..4]);
    let blocks_count_lo = crate::endian::read_u32_le(&buf[4..8]);
    let first_data_block = crate::endian::read_u32_le(&buf[20..24]);
    let log_block_size = crate::endian::read_u32_le(&buf[24..28]);
    let blocks_per_group = crate::endian::read_u32_le(&buf[32..36]);
    let inodes_per_group = crate::endian::read_u32_le(&buf[40..44]);

    let rev_level = crate::endian::read_u32_le(&buf[76..80]);
    let (inode_size, feature_compat, feature_incompat, feature_ro_compat) = if rev_level == 0 {
        // Pre-dynamic-revision filesystems have none of the fields below;
        // the original 128-byte inode size applies and no feature is set.
        (128u16, CompatFeatures::empty(), IncompatFeatures::empty(), RoCompatFeatures::empty())
    } else {
        (
            crate::endian::read_u16_le(&buf[88..90]),
            CompatFeatures::from_bits_truncate(crate::endian::read_u32_le(&buf[92..96])),
            IncompatFeatures::from_bits_truncate(crate::endian::read_u32_le(&buf[96..100])),
            RoCompatFeatures::from_bits_truncate(crate::endian::read_u32_le(&buf[100..104])),
        )
    };

    let blocks_count = if feature_incompat.contains(IncompatFeatures::BIT64) {
        let blocks_count_hi = crate::endian::read_u32_le(&buf[0x150..0x154]);
        ((blocks_count_hi as u64) << 32) | blocks_count_lo as u64
    } else {
        blocks_count_lo as u64
    };

    let uuid = uuid::Uuid::from_slice(&buf[0x68..0x78])
        .map_err(|e| Error::invalid_encoding(format!("ext filesystem UUID: {e}")))?;
    let volume_name = crate::endian::read_ascii(&buf[0x78..0x88]);
    let journal_inode = crate::endian::read_u32_le(&buf[0xE0..0xE4]);

    Ok(Superblock {
        inodes_count,
        blocks_count,
        first_data_block,
        log_block_size,
        blocks_per_group,
        inodes_per_group,
        inode_size,
        feature_compat,
        feature_incompat,
        feature_ro_compat,
        uuid,
        volume_name,
        journal_inode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_superblock_bytes() -> Vec<u8> {
        let mut buf = vec![0u8; SUPERBLOCK_SIZE];
        crate::endian::write_u32_le(&mut buf[0..4], 128);
        crate::endian::write_u32_le(&mut buf[4..8], 4096);
        crate::endian::write_u32_le(&mut buf[24..28], 2); // log_block_size=2 -> 4096
        crate::endian::write_u32_le(&mut buf[32..36], 8192);
        crate::endian::write_u32_le(&mut buf[40..44], 128);
        crate::endian::write_u16_le(&mut buf[56..58], EXT_MAGIC);
        crate::endian::write_u32_le(&mut buf[76..80], 1); // dynamic rev
        crate::endian::write_u16_le(&mut buf[88..90], 256);
        crate::endian::write_u32_le(&mut buf[96..100], IncompatFeatures::EXTENTS.bits());
        buf
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let buf = vec![0u8; SUPERBLOCK_SIZE];
        assert!(decode_superblock(&buf).is_err());
    }

    #[test]
    fn decode_reads_block_size_and_features() {
        let buf = minimal_superblock_bytes();
        let sb = decode_superblock(&buf).unwrap();
        assert_eq!(sb.block_size(), 4096);
        assert_eq!(sb.inode_size, 256);
        assert!(sb.has_extents());
        assert!(!sb.has_journal());
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let buf = vec![0u8; 100];
        assert!(decode_superblock(&buf).is_err());
    }
}
