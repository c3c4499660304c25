//! vdisk — read-path engines for virtual-disk and optical-media image formats.
//!
//! Four format engines share a common sparse-stream foundation:
//!
//! - `iso9660` — CD-ROM filesystem images (Joliet, Rock Ridge, El Torito).
//! - `ext` — Ext2/3/4 file-data resolution via block maps and extent trees.
//! - `vmdk` — VMware virtual disks (text descriptor, hosted/VMFS sparse extents).
//! - `vdi` — VirtualBox virtual disks (block allocation table, copy-on-write).
//!
//! `stream`, `sparse_buffer`, `builder`, and `endian` are the shared plumbing
//! those four engines are built on: a uniform random-access byte view with
//! extent-aware sparsity, and the scalar/string codecs the on-disk formats
//! need.

pub mod builder;
pub mod endian;
pub mod error;
pub mod ext;
pub mod iso9660;
pub mod sparse_buffer;
pub mod stream;
pub mod vdi;
pub mod vmdk;

pub use error::{Error, Result};
