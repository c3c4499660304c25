//! `VmdkDisk`: the read-for-open entry point composing a descriptor, its
//! extents, and (if present) its parent chain into one [`SparseStream`].

use crate::error::{Error, Result};
use crate::stream::{SparseStream, StreamExtent};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::descriptor::{acquire_descriptor, parse_descriptor, VmdkDescriptor};
use super::extent::open_extents;
use super::parent;

pub struct VmdkDisk {
    stream: Box<dyn SparseStream>,
    descriptor: VmdkDescriptor,
}

impl VmdkDisk {
    /// Open `path` for reading, following its parent chain (if any) to the
    /// base image. Fails with `InvalidFormat` on a cyclic parent chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut visited = HashSet::new();
        let (stream, descriptor) = open_chain(path.as_ref(), &mut visited)?;
        Ok(Self { stream, descriptor })
    }

    pub fn descriptor(&self) -> &VmdkDescriptor {
        &self.descriptor
    }
}

impl SparseStream for VmdkDisk {
    fn len(&self) -> u64 {
        self.stream.len()
    }

    fn position(&self) -> u64 {
        self.stream.position()
    }

    fn set_position(&mut self, pos: u64) {
        self.stream.set_position(pos)
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read_at(buf)
    }

    fn write_at(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write_at(buf)
    }

    fn extents(&self) -> Vec<StreamExtent> {
        self.stream.extents()
    }
}

fn open_chain(
    path: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<(Box<dyn SparseStream>, VmdkDescriptor)> {
    parent::enter(visited, path)?;

    let text = acquire_descriptor(path)?;
    let descriptor = parse_descriptor(&text)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let parent_stream = if descriptor.has_parent() {
        let hint = descriptor.parent_file_name_hint.as_deref().ok_or_else(|| {
            Error::invalid_format("descriptor declares a parentCID but no parentFileNameHint")
        })?;
        let parent_path = parent::resolve_relative(base_dir, hint);
        let (parent_stream, _parent_descriptor) = open_chain(&parent_path, visited)?;
        Some(parent_stream)
    } else {
        None
    };

    let stream = open_extents(base_dir, &descriptor.extents, parent_stream)?;
    Ok((stream, descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_flat_vmdk(dir: &std::path::Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let flat_name = format!("{}-flat.vmdk", name.trim_end_matches(".vmdk"));
        let flat_path = dir.join(&flat_name);
        std::fs::write(&flat_path, data).unwrap();

        let descriptor_path = dir.join(name);
        let mut f = std::fs::File::create(&descriptor_path).unwrap();
        writeln!(f, "version=1").unwrap();
        writeln!(f, "CID=1").unwrap();
        writeln!(f, "parentCID=ffffffff").unwrap();
        writeln!(f, "createType=\"monolithicFlat\"").unwrap();
        writeln!(f).unwrap();
        writeln!(
            f,
            "RW {} FLAT \"{}\" 0",
            data.len() / 512,
            flat_name
        )
        .unwrap();
        descriptor_path
    }

    #[test]
    fn opens_flat_descriptor_and_reads_data() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![7u8; 1024];
        let path = write_flat_vmdk(dir.path(), "disk.vmdk", &data);

        let mut disk = VmdkDisk::open(&path).unwrap();
        assert_eq!(disk.len(), 1024);
        let mut buf = vec![0u8; 1024];
        disk.read_at(&mut buf).unwrap();
        assert_eq!(buf, data);
        assert!(!disk.descriptor().has_parent());
    }

    #[test]
    fn self_referential_parent_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.vmdk");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "version=1").unwrap();
        writeln!(f, "CID=1").unwrap();
        writeln!(f, "parentCID=2").unwrap();
        writeln!(f, "parentFileNameHint=\"loop.vmdk\"").unwrap();
        writeln!(f, "createType=\"monolithicFlat\"").unwrap();

        let result = VmdkDisk::open(&path);
        assert!(result.is_err());
    }
}
