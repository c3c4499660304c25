//! Ext2/3/4 file-data resolver: superblock/inode decode plus the classic
//! block-pointer map and the extent tree, the two schemes by which an
//! inode's logical byte offsets map onto physical blocks on the backing
//! device. Directory traversal and journal replay are out of scope — the
//! journal is only identified, never replayed.

pub mod extent_tree;
pub mod inode;
pub mod journal;
pub mod resolver;
pub mod superblock;

pub use inode::{decode_inode, Inode, InodeFlags};
pub use resolver::ExtBlockResolver;
pub use superblock::{decode_superblock, Superblock, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
