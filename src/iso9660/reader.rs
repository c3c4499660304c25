//! `IsoReader`: mounts a volume from any [`SparseStream`] and exposes
//! directory enumeration, file opens, and boot-catalog access.

use super::boot::{decode_catalog, InitialEntry, ValidationEntry, BOOT_CATALOG_LBA_FIELD_OFFSET};
use super::directory_record::{decode_record, DirectoryRecord};
use super::names::compare_identifiers;
use super::susp;
use super::volume_descriptor::{
    decode_common_header, decode_standard_descriptor, is_joliet_escape, StandardDescriptor,
    VolumeDescriptorType, BOOT_SYSTEM_IDENTIFIER,
};
use super::SECTOR_SIZE;
use crate::error::{Error, Result};
use crate::stream::{SparseStream, StreamExtent};

/// Which of the three name-resolution schemes the reader resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoVariant {
    Joliet,
    RockRidge,
    Iso9660,
}

/// One directory entry as presented to callers: the resolved display name
/// (Rock Ridge "NM", Joliet UTF-16BE text, or the plain d-character
/// identifier, in that preference order for whichever variant is active)
/// plus the underlying record.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub record: DirectoryRecord,
}

pub struct IsoReader<S> {
    stream: S,
    variant: IsoVariant,
    logical_block_size: u64,
    primary: StandardDescriptor,
    supplementary: Option<StandardDescriptor>,
    root_record: DirectoryRecord,
    susp_skip: Option<u8>,
    boot_catalog_lba: Option<u32>,
    strict: bool,
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

impl<S: SparseStream> IsoReader<S> {
    /// Mount `stream` as an ISO-9660 volume, choosing the first variant in
    /// `priority` that is actually present. `strict` controls both-endian
    /// mismatch handling (see `endian::read_both_endian_u32`).
    pub fn mount(mut stream: S, priority: &[IsoVariant], strict: bool) -> Result<Self> {
        let mut primary: Option<StandardDescriptor> = None;
        let mut supplementary: Option<StandardDescriptor> = None;
        let mut boot_catalog_lba = None;

        let mut sector_index = 0u64;
        loop {
            let offset = super::VOLUME_DESCRIPTOR_AREA_START + sector_index * SECTOR_SIZE;
            let mut sector = vec![0u8; SECTOR_SIZE as usize];
            read_exact_at(&mut stream, offset, &mut sector)?;
            let header = decode_common_header(&sector)?;
            match header.descriptor_type {
                VolumeDescriptorType::Primary => {
                    primary = Some(decode_standard_descriptor(&sector, strict)?);
                }
                VolumeDescriptorType::Supplementary => {
                    let desc = decode_standard_descriptor(&sector, strict)?;
                    if let Some(seq) = desc.escape_sequence {
                        if is_joliet_escape(&seq) {
                            supplementary = Some(desc);
                        }
                    }
                }
                VolumeDescriptorType::Boot => {
                    if sector[7..7 + BOOT_SYSTEM_IDENTIFIER.len()] == BOOT_SYSTEM_IDENTIFIER[..] {
                        boot_catalog_lba = Some(crate::endian::read_u32_le(
                            &sector[BOOT_CATALOG_LBA_FIELD_OFFSET..BOOT_CATALOG_LBA_FIELD_OFFSET + 4],
                        ));
                    }
                }
                VolumeDescriptorType::SetTerminator => break,
                VolumeDescriptorType::Partition => {}
            }
            sector_index += 1;
        }

        let primary = primary.ok_or_else(|| Error::invalid_format("no primary volume descriptor found"))?;
        let logical_block_size = primary.logical_block_size as u64;

        // Root-self record + SUSP seed (§4.E step 3).
        let mut root_sector = vec![0u8; logical_block_size as usize];
        let root_lba = crate::endian::read_u32_le(&primary.root_directory_record[2..6]);
        read_exact_at(
            &mut stream,
            root_lba as u64 * logical_block_size,
            &mut root_sector,
        )?;
        let (root_self, _) = decode_record(&root_sector, strict)?
            .ok_or_else(|| Error::invalid_format("root directory has no self record"))?;
        let susp_skip = susp::detect_sp(&root_self.system_use);

        let mut variant = None;
        for candidate in priority {
            match candidate {
                IsoVariant::Joliet => {
                    if supplementary.is_some() {
                        variant = Some(IsoVariant::Joliet);
                        break;
                    }
                }
                IsoVariant::RockRidge => {
                    if susp_skip.is_some() {
                        let entries = susp::walk_entries(&root_self.system_use);
                        if susp::detect_rock_ridge(&entries) {
                            variant = Some(IsoVariant::RockRidge);
                            break;
                        }
                    }
                }
                IsoVariant::Iso9660 => {
                    variant = Some(IsoVariant::Iso9660);
                    break;
                }
            }
        }
        let variant = variant.ok_or_else(|| {
            Error::variant_unavailable("no requested ISO-9660 variant is present on this volume")
        })?;

        let root_record = match variant {
            IsoVariant::Joliet => {
                let supp = supplementary.as_ref().unwrap();
                let mut sector = vec![0u8; logical_block_size as usize];
                let lba = crate::endian::read_u32_le(&supp.root_directory_record[2..6]);
                read_exact_at(&mut stream, lba as u64 * logical_block_size, &mut sector)?;
                decode_record(&sector, strict)?.unwrap().0
            }
            _ => root_self,
        };

        Ok(Self {
            stream,
            variant,
            logical_block_size,
            primary,
            supplementary,
            root_record,
            susp_skip,
            boot_catalog_lba,
            strict,
        })
    }

    pub fn variant(&self) -> IsoVariant {
        self.variant
    }

    pub fn volume_label(&self) -> &str {
        match self.variant {
            IsoVariant::Joliet => &self.supplementary.as_ref().unwrap().volume_identifier,
            _ => &self.primary.volume_identifier,
        }
    }

    fn active_descriptor(&self) -> &StandardDescriptor {
        match self.variant {
            IsoVariant::Joliet => self.supplementary.as_ref().unwrap(),
            _ => &self.primary,
        }
    }

    fn resolve_name(&self, record: &DirectoryRecord) -> Result<String> {
        match self.variant {
            IsoVariant::Joliet => crate::endian::read_utf16be(&record.identifier),
            IsoVariant::RockRidge => {
                let entries = susp::walk_entries(&record.system_use);
                Ok(susp::decode_nm(&entries).unwrap_or_else(|| crate::endian::read_ascii(&record.identifier)))
            }
            IsoVariant::Iso9660 => Ok(crate::endian::read_ascii(&record.identifier)),
        }
    }

    /// List the direct children of a directory record (sorted in on-disk
    /// order, i.e. the order `children` enumerates them from the extent —
    /// *not* the builder's emission comparator, which callers apply
    /// themselves when they need the canonical sort).
    pub fn children(&mut self, dir: &DirectoryRecord) -> Result<Vec<DirEntry>> {
        if !dir.is_directory() {
            return Err(Error::invalid_format("children() called on a non-directory record"));
        }
        let mut data = vec![0u8; dir.data_length as usize];
        read_exact_at(
            &mut self.stream,
            dir.extent_lba as u64 * self.logical_block_size,
            &mut data,
        )?;

        let mut entries = Vec::new();
        let mut pos = 0usize;
        while pos < data.len() {
            let remaining_in_sector = self.logical_block_size as usize
                - (pos % self.logical_block_size as usize);
            let slice_end = (pos + remaining_in_sector).min(data.len());
            match decode_record(&data[pos..slice_end], self.strict)? {
                None => {
                    pos += remaining_in_sector;
                }
                Some((record, consumed)) => {
                    if !record.is_self() && !record.is_parent() {
                        let name = self.resolve_name(&record)?;
                        entries.push(DirEntry { name, record });
                    }
                    pos += consumed;
                }
            }
        }
        Ok(entries)
    }

    /// Sort entries the way the builder emits them (names.rs comparator).
    pub fn sort_entries(entries: &mut [DirEntry]) {
        entries.sort_by(|a, b| compare_identifiers(&a.name, &b.name));
    }

    pub fn root(&self) -> DirectoryRecord {
        self.root_record.clone()
    }

    /// Resolve a `/`-separated path from the root, returning its record.
    pub fn find(&mut self, path: &str) -> Result<DirectoryRecord> {
        let mut current = self.root();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let children = self.children(&current)?;
            let found = children.into_iter().find(|e| {
                e.name == component || e.name.trim_end_matches(";1") == component
            });
            current = found
                .ok_or_else(|| Error::invalid_format(format!("path component '{component}' not found")))?
                .record;
        }
        Ok(current)
    }

    /// Open a file's contents as a stream of `(extent_lba * sector, data_length)`.
    /// Rejects non-contiguous extents per §4.E step 5.
    pub fn open_extent(&self, record: &DirectoryRecord) -> Result<StreamExtent> {
        if !record.is_contiguous() {
            return Err(Error::non_contiguous(
                "file has non-zero file-unit-size or interleave-gap",
            ));
        }
        Ok(StreamExtent::new(
            record.extent_lba as u64 * self.logical_block_size,
            record.data_length as u64,
        ))
    }

    /// Read a file's full contents in one call (callers needing a
    /// streaming `SparseStream` handle should build a `SubStream` over
    /// `open_extent`'s range against their own clone of the backing
    /// stream).
    pub fn read_file(&mut self, record: &DirectoryRecord) -> Result<Vec<u8>> {
        let extent = self.open_extent(record)?;
        let mut buf = vec![0u8; extent.length as usize];
        read_exact_at(&mut self.stream, extent.start, &mut buf)?;
        Ok(buf)
    }

    pub fn boot_catalog(&mut self) -> Result<Option<(ValidationEntry, InitialEntry)>> {
        let Some(lba) = self.boot_catalog_lba else {
            return Ok(None);
        };
        let mut sector = vec![0u8; SECTOR_SIZE as usize];
        read_exact_at(&mut self.stream, lba as u64 * SECTOR_SIZE, &mut sector)?;
        Ok(Some(decode_catalog(&sector)?))
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso9660::builder::{BuildOptions, IsoBuilder};

    #[test]
    fn mount_and_read_back_hello_world() {
        let mut builder = IsoBuilder::new(BuildOptions {
            volume_identifier: "MYISO".to_string(),
            joliet: true,
        });
        builder.add_file("A/B/HELLO.TXT", b"hello world!".to_vec()).unwrap();
        let image = builder.build().unwrap();

        let mut reader = IsoReader::mount(
            image,
            &[IsoVariant::Joliet, IsoVariant::RockRidge, IsoVariant::Iso9660],
            false,
        )
        .unwrap();

        assert_eq!(reader.volume_label(), "MYISO");
        let record = reader.find("A/B/HELLO.TXT").unwrap();
        let data = reader.read_file(&record).unwrap();
        assert_eq!(data, b"hello world!");
    }
}
