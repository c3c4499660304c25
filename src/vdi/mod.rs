//! VirtualBox VDI disk engine: pre-header + header decode, the block
//! allocation table, and a [`crate::stream::SparseStream`] over both with
//! copy-on-write (allocate-on-write) block writes.

pub mod block_table;
pub mod disk;
pub mod header;

pub use block_table::BlockTable;
pub use disk::VdiDisk;
pub use header::{ImageType, VdiHeader, VdiPreHeader, BLOCK_FREE, BLOCK_ZERO};
