//! Opens one descriptor extent line as a [`SparseStream`], and concatenates
//! a disk's extents into a single logical stream at their declared sector
//! boundaries.

use crate::error::{Error, Result};
use crate::stream::sub::SubStream;
use crate::stream::wrapping::WrappingStream;
use crate::stream::{SparseStream, StreamExtent};
use memmap2::Mmap;
use std::cell::RefCell;
use std::fs::File;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use super::descriptor::{Extent, ExtentType};
use super::grain::GrainEngine;
use super::header::{CowdHeader, HostedSparseHeader, COWD_MAGIC, SECTOR_SIZE, VMDK_MAGIC};

/// A fixed-length all-zero stream, backing `Zero` extents.
pub struct ZeroStream {
    len: u64,
    pos: u64,
}

impl ZeroStream {
    pub fn new(len: u64) -> Self {
        Self { len, pos: 0 }
    }
}

impl SparseStream for ZeroStream {
    fn len(&self) -> u64 {
        self.len
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        let want = buf.len().min((self.len - self.pos) as usize);
        buf[..want].fill(0);
        self.pos += want as u64;
        Ok(want)
    }

    fn write_at(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::write_not_supported("VMDK zero extent is read-only"))
    }

    fn extents(&self) -> Vec<StreamExtent> {
        Vec::new()
    }
}

/// A window onto a parent disk's composed stream, shared across however
/// many of the child's extents need to defer into it. `Rc<RefCell<_>>`
/// rather than the crate's usual `Owned` enum, since several windows must
/// each independently seek the one underlying parent stream.
pub struct ParentWindow {
    parent: Rc<RefCell<Box<dyn SparseStream>>>,
    offset: u64,
    length: u64,
    pos: u64,
}

impl ParentWindow {
    pub fn new(parent: Rc<RefCell<Box<dyn SparseStream>>>, offset: u64, length: u64) -> Self {
        Self {
            parent,
            offset,
            length,
            pos: 0,
        }
    }
}

impl SparseStream for ParentWindow {
    fn len(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.length {
            return Ok(0);
        }
        let want = buf.len().min((self.length - self.pos) as usize);
        let mut parent = self.parent.borrow_mut();
        parent.set_position(self.offset + self.pos);
        let n = parent.read_at(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write_at(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::write_not_supported("VMDK parent window is read-only"))
    }

    fn extents(&self) -> Vec<StreamExtent> {
        self.parent
            .borrow()
            .extents_in_range(self.offset, self.length)
            .into_iter()
            .map(|e| {
                let start = e.start.max(self.offset) - self.offset;
                let end = e.end().min(self.offset + self.length) - self.offset;
                StreamExtent::new(start, end - start)
            })
            .collect()
    }
}

/// Concatenates a disk's extents into one logical `[0, total_len)` stream,
/// in descriptor order.
pub struct ConcatStream {
    parts: Vec<(u64, Box<dyn SparseStream>)>,
    total_len: u64,
    pos: u64,
}

impl ConcatStream {
    pub fn new(parts: Vec<Box<dyn SparseStream>>) -> Self {
        let mut offset = 0u64;
        let mut indexed = Vec::with_capacity(parts.len());
        for part in parts {
            let len = part.len();
            indexed.push((offset, part));
            offset += len;
        }
        Self {
            parts: indexed,
            total_len: offset,
            pos: 0,
        }
    }
}

impl SparseStream for ConcatStream {
    fn len(&self) -> u64 {
        self.total_len
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn read_at(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.total_len {
            return Ok(0);
        }
        for (start, stream) in self.parts.iter_mut() {
            let end = *start + stream.len();
            if self.pos >= *start && self.pos < end {
                let local_pos = self.pos - *start;
                let want = buf.len().min((end - self.pos) as usize);
                stream.set_position(local_pos);
                let n = stream.read_at(&mut buf[..want])?;
                self.pos += n as u64;
                return Ok(n);
            }
        }
        Ok(0)
    }

    fn write_at(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::write_not_supported(
            "VMDK multi-extent concatenation is read-only",
        ))
    }

    fn extents(&self) -> Vec<StreamExtent> {
        self.parts
            .iter()
            .flat_map(|(start, stream)| {
                stream
                    .extents()
                    .into_iter()
                    .map(move |e| StreamExtent::new(start + e.start, e.length))
            })
            .collect()
    }
}

fn open_flat_like(base_dir: &Path, extent: &Extent) -> Result<Box<dyn SparseStream>> {
    let path = base_dir.join(&extent.filename);
    let file = File::open(&path).map_err(|e| Error::io(e, &path))?;
    let len = extent.size_sectors * SECTOR_SIZE;
    let stream = WrappingStream::new(file, extent.offset * SECTOR_SIZE + len);
    Ok(Box::new(SubStream::new(stream, extent.offset * SECTOR_SIZE, len)))
}

fn open_sparse_like(
    base_dir: &Path,
    extent: &Extent,
    parent_window: Option<Box<dyn SparseStream>>,
) -> Result<Box<dyn SparseStream>> {
    let path = base_dir.join(&extent.filename);
    let file = File::open(&path).map_err(|e| Error::io(e, &path))?;
    let mmap = Arc::new(unsafe { Mmap::map(&file).map_err(|e| Error::io(e, &path))? });

    if mmap.len() < 4 {
        return Err(Error::invalid_format("sparse extent file too short"));
    }
    let magic = crate::endian::read_u32_le(&mmap[0..4]);
    match extent.extent_type {
        ExtentType::Sparse if magic == VMDK_MAGIC => {
            let header = HostedSparseHeader::from_bytes(&mmap)?;
            if header.has_markers() {
                return Err(Error::extent_unsupported(
                    "streamOptimized (marker-bearing) sparse extents are not readable here",
                ));
            }
            let grain_directory = super::header::read_grain_directory(
                &mmap,
                header.gd_offset,
                header.num_gd_entries(),
            )?;
            Ok(Box::new(GrainEngine::new(
                mmap,
                header.capacity * SECTOR_SIZE,
                header.grain_size * SECTOR_SIZE,
                header.num_gtes_per_gt,
                grain_directory,
                header.is_compressed(),
                parent_window,
            )))
        }
        ExtentType::VmfsSparse if magic == COWD_MAGIC => {
            let header = CowdHeader::from_bytes(&mmap)?;
            let grain_directory = super::header::read_grain_directory(
                &mmap,
                header.gd_offset_sectors,
                header.num_gd_entries as u64,
            )?;
            Ok(Box::new(GrainEngine::new(
                mmap,
                header.capacity_sectors * SECTOR_SIZE,
                header.grain_size_sectors * SECTOR_SIZE,
                CowdHeader::NUM_GTES_PER_GT,
                grain_directory,
                false,
                parent_window,
            )))
        }
        _ => Err(Error::invalid_format(format!(
            "extent file {} does not match its declared extent type",
            path.display()
        ))),
    }
}

/// Opens every extent of a descriptor and concatenates them, deferring
/// sparse extents into `parent` (the already-composed parent disk, if any)
/// at the byte range each extent covers.
pub fn open_extents(
    base_dir: &Path,
    extents: &[Extent],
    parent: Option<Box<dyn SparseStream>>,
) -> Result<Box<dyn SparseStream>> {
    let shared_parent = parent.map(|p| Rc::new(RefCell::new(p)));
    let mut cumulative = 0u64;
    let mut parts: Vec<Box<dyn SparseStream>> = Vec::with_capacity(extents.len());

    for extent in extents {
        let extent_len = extent.size_sectors * SECTOR_SIZE;
        let part: Box<dyn SparseStream> = match extent.extent_type {
            ExtentType::Flat | ExtentType::Vmfs | ExtentType::VmfsRdm | ExtentType::VmfsRaw => {
                open_flat_like(base_dir, extent)?
            }
            ExtentType::Zero => Box::new(ZeroStream::new(extent_len)),
            ExtentType::Sparse | ExtentType::VmfsSparse => {
                let window = shared_parent
                    .as_ref()
                    .map(|p| Box::new(ParentWindow::new(p.clone(), cumulative, extent_len)) as Box<dyn SparseStream>);
                open_sparse_like(base_dir, extent, window)?
            }
            ExtentType::SeSparse | ExtentType::VsanSparse => {
                return Err(Error::extent_unsupported(format!(
                    "{:?} extents have no read path implemented",
                    extent.extent_type
                )))
            }
        };
        cumulative += extent_len;
        parts.push(part);
    }

    Ok(Box::new(ConcatStream::new(parts)))
}
