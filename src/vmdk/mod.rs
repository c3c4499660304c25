//! VMDK descriptor parsing and the sparse/flat/zero grain engine that turns
//! a disk's extents — plus an optional parent chain — into one
//! [`crate::stream::SparseStream`].

pub mod descriptor;
pub mod disk;
pub mod extent;
pub mod grain;
pub mod header;
pub mod parent;

pub use descriptor::{
    acquire_descriptor, parse_descriptor, AdapterType, CreateType, Extent, ExtentType,
    VmdkDescriptor,
};
pub use disk::VmdkDisk;
