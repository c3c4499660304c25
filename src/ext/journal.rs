//! Journal superblock identification only — this crate never replays a
//! journal (spec Non-goal), but recognizing one lets callers report that a
//! mounted filesystem is ext3/ext4 rather than plain ext2.

use crate::error::{Error, Result};

/// JBD2 journal superblock magic, stored big-endian.
pub const JOURNAL_MAGIC: u32 = 0xC03B_3998;

/// The two block types that identify a journal superblock (v1 and v2).
const BLOCK_TYPE_SUPERBLOCK_V1: u32 = 3;
const BLOCK_TYPE_SUPERBLOCK_V2: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalSuperblockVersion {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy)]
pub struct JournalSuperblock {
    pub version: JournalSuperblockVersion,
    pub sequence: u32,
}

/// Identify the leading block of a journal inode's data as a journal
/// superblock. Fields are big-endian per the JBD2 on-disk format (the one
/// place in this crate where a header is BE rather than LE, since the
/// journal format was adopted from a separate lineage than the rest of
/// ext2/3/4).
pub fn identify(buf: &[u8]) -> Result<JournalSuperblock> {
    if buf.len() < 24 {
        return Err(Error::invalid_format("journal superblock buffer too short"));
    }
    let magic = crate::endian::read_u32_be(&buf[0..4]);
    if magic != JOURNAL_MAGIC {
        return Err(Error::invalid_format(format!(
            "journal magic mismatch: expected {JOURNAL_MAGIC:#010x}, got {magic:#010x}"
        )));
    }
    let block_type = crate::endian::read_u32_be(&buf[4..8]);
    let version = match block_type {
        BLOCK_TYPE_SUPERBLOCK_V1 => JournalSuperblockVersion::V1,
        BLOCK_TYPE_SUPERBLOCK_V2 => JournalSuperblockVersion::V2,
        other => {
            return Err(Error::invalid_format(format!(
                "block type {other} is not a journal superblock"
            )))
        }
    };
    let sequence = crate::endian::read_u32_be(&buf[8..12]);
    Ok(JournalSuperblock { version, sequence })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal_sb_bytes(block_type: u32) -> Vec<u8> {
        let mut buf = vec![0u8; 24];
        buf[0..4].copy_from_slice(&JOURNAL_MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&block_type.to_be_bytes());
        buf[8..12].copy_from_slice(&7u32.to_be_bytes());
        buf
    }

    #[test]
    fn identifies_v2_superblock() {
        let buf = journal_sb_bytes(BLOCK_TYPE_SUPERBLOCK_V2);
        let sb = identify(&buf).unwrap();
        assert_eq!(sb.version, JournalSuperblockVersion::V2);
        assert_eq!(sb.sequence, 7);
    }

    #[test]
    fn rejects_non_superblock_block_type() {
        let buf = journal_sb_bytes(1); // a descriptor block, not a superblock
        assert!(identify(&buf).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; 24];
        assert!(identify(&buf).is_err());
    }
}
