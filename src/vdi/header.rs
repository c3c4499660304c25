//! VDI pre-header and header decode/encode.
//!
//! A VDI file opens with a 72-byte pre-header (a 64-byte ASCII banner,
//! signature, version) followed by a fixed-layout header carrying the block
//! geometry the rest of the engine needs: block size, how many blocks exist,
//! how many are allocated, and where the block table and data region start.

use crate::error::{Error, Result};

pub const PRE_HEADER_SIZE: usize = 72;
pub const VDI_SIGNATURE: u32 = 0xBEDA_107F;
pub const VDI_VERSION: u32 = 0x0001_0001;

const FILE_INFO: &[u8] = b"<<< Oracle VM VirtualBox Disk Image >>>\n";

/// Block-table sentinel: the block is unallocated and, for a differencing
/// image, should be read through to the parent.
pub const BLOCK_FREE: u32 = 0xFFFF_FFFF;
/// Block-table sentinel: the block is allocated as explicit zero.
pub const BLOCK_ZERO: u32 = 0xFFFF_FFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Dynamic,
    Fixed,
}

impl ImageType {
    fn from_u32(v: u32) -> Result<Self> {
        match v {
            1 => Ok(Self::Dynamic),
            2 => Ok(Self::Fixed),
            other => Err(Error::invalid_format(format!(
                "unknown VDI image type {other}"
            ))),
        }
    }

    fn as_u32(self) -> u32 {
        match self {
            Self::Dynamic => 1,
            Self::Fixed => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VdiPreHeader {
    pub signature: u32,
    pub version: u32,
}

impl VdiPreHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < PRE_HEADER_SIZE {
            return Err(Error::invalid_format("VDI pre-header too short"));
        }
        let signature = crate::endian::read_u32_le(&data[64..68]);
        if signature != VDI_SIGNATURE {
            return Err(Error::invalid_format(format!(
                "VDI signature mismatch: expected {VDI_SIGNATURE:#010x}, got {signature:#010x}"
            )));
        }
        let version = crate::endian::read_u32_le(&data[68..72]);
        Ok(Self { signature, version })
    }

    pub fn to_bytes(&self) -> [u8; PRE_HEADER_SIZE] {
        let mut buf = [0u8; PRE_HEADER_SIZE];
        let n = FILE_INFO.len().min(64);
        buf[..n].copy_from_slice(&FILE_INFO[..n]);
        crate::endian::write_u32_le(&mut buf[64..68], self.signature);
        crate::endian::write_u32_le(&mut buf[68..72], self.version);
        buf
    }

    pub fn new() -> Self {
        Self {
            signature: VDI_SIGNATURE,
            version: VDI_VERSION,
        }
    }
}

impl Default for VdiPreHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Size of the header region following the pre-header. Chosen to match the
/// field layout below; `blocks_offset` is normally this value rounded up by
/// the caller.
pub const HEADER_SIZE: usize = 400 - 8;

/// The VDI header proper (version 1.1 layout), decoded at fixed offsets
/// relative to the end of the pre-header.
#[derive(Debug, Clone)]
pub struct VdiHeader {
    pub image_type: ImageType,
    pub image_flags: u32,
    pub blocks_offset: u32,
    pub data_offset: u32,
    pub sector_size: u32,
    pub disk_size: u64,
    pub block_size: u32,
    pub block_extra_size: u32,
    pub blocks_count: u32,
    pub blocks_allocated: u32,
    pub uuid_image: [u8; 16],
}

const OFF_IMAGE_TYPE: usize = 0x00;
const OFF_IMAGE_FLAGS: usize = 0x04;
const OFF_DESCRIPTION: usize = 0x08;
const DESCRIPTION_LEN: usize = 256;
const OFF_BLOCKS_OFFSET: usize = OFF_DESCRIPTION + DESCRIPTION_LEN; // 0x108
const OFF_DATA_OFFSET: usize = OFF_BLOCKS_OFFSET + 4;
const OFF_CYLINDERS: usize = OFF_DATA_OFFSET + 4;
const OFF_HEADS: usize = OFF_CYLINDERS + 4;
const OFF_SECTORS: usize = OFF_HEADS + 4;
const OFF_SECTOR_SIZE: usize = OFF_SECTORS + 4;
const OFF_UNUSED1: usize = OFF_SECTOR_SIZE + 4;
const OFF_DISK_SIZE: usize = OFF_UNUSED1 + 4;
const OFF_BLOCK_SIZE: usize = OFF_DISK_SIZE + 8;
const OFF_BLOCK_EXTRA_SIZE: usize = OFF_BLOCK_SIZE + 4;
const OFF_BLOCKS_COUNT: usize = OFF_BLOCK_EXTRA_SIZE + 4;
const OFF_BLOCKS_ALLOCATED: usize = OFF_BLOCKS_COUNT + 4;
const OFF_UUID_IMAGE: usize = OFF_BLOCKS_ALLOCATED + 4;
const OFF_UUID_LAST_SNAP: usize = OFF_UUID_IMAGE + 16;
const OFF_UUID_LINK: usize = OFF_UUID_LAST_SNAP + 16;
const OFF_UUID_PARENT: usize = OFF_UUID_LINK + 16;
const HEADER_PAYLOAD_END: usize = OFF_UUID_PARENT + 16;

impl VdiHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_PAYLOAD_END {
            return Err(Error::invalid_format("VDI header too short"));
        }
        let image_type =
            ImageType::from_u32(crate::endian::read_u32_le(&data[OFF_IMAGE_TYPE..OFF_IMAGE_TYPE + 4]))?;
        let image_flags = crate::endian::read_u32_le(&data[OFF_IMAGE_FLAGS..OFF_IMAGE_FLAGS + 4]);
        let blocks_offset =
            crate::endian::read_u32_le(&data[OFF_BLOCKS_OFFSET..OFF_BLOCKS_OFFSET + 4]);
        let data_offset = crate::endian::read_u32_le(&data[OFF_DATA_OFFSET..OFF_DATA_OFFSET + 4]);
        let sector_size = crate::endian::read_u32_le(&data[OFF_SECTOR_SIZE..OFF_SECTOR_SIZE + 4]);
        let disk_size = crate::endian::read_u64_le(&data[OFF_DISK_SIZE..OFF_DISK_SIZE + 8]);
        let block_size = crate::endian::read_u32_le(&data[OFF_BLOCK_SIZE..OFF_BLOCK_SIZE + 4]);
        let block_extra_size =
            crate::endian::read_u32_le(&data[OFF_BLOCK_EXTRA_SIZE..OFF_BLOCK_EXTRA_SIZE + 4]);
        let blocks_count = crate::endian::read_u32_le(&data[OFF_BLOCKS_COUNT..OFF_BLOCKS_COUNT + 4]);
        let blocks_allocated =
            crate::endian::read_u32_le(&data[OFF_BLOCKS_ALLOCATED..OFF_BLOCKS_ALLOCATED + 4]);
        let mut uuid_image = [0u8; 16];
        uuid_image.copy_from_slice(&data[OFF_UUID_IMAGE..OFF_UUID_IMAGE + 16]);

        Ok(Self {
            image_type,
            image_flags,
            blocks_offset,
            data_offset,
            sector_size,
            disk_size,
            block_size,
            block_extra_size,
            blocks_count,
            blocks_allocated,
            uuid_image,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        crate::endian::write_u32_le(&mut buf[OFF_IMAGE_TYPE..], self.image_type.as_u32());
        crate::endian::write_u32_le(&mut buf[OFF_IMAGE_FLAGS..], self.image_flags);
        crate::endian::write_u32_le(&mut buf[OFF_BLOCKS_OFFSET..], self.blocks_offset);
        crate::endian::write_u32_le(&mut buf[OFF_DATA_OFFSET..], self.data_offset);
        crate::endian::write_u32_le(&mut buf[OFF_SECTOR_SIZE..], self.sector_size);
        crate::endian::write_u64_le(&mut buf[OFF_DISK_SIZE..], self.disk_size);
        crate::endian::write_u32_le(&mut buf[OFF_BLOCK_SIZE..], self.block_size);
        crate::endian::write_u32_le(&mut buf[OFF_BLOCK_EXTRA_SIZE..], self.block_extra_size);
        crate::endian::write_u32_le(&mut buf[OFF_BLOCKS_COUNT..], self.blocks_count);
        crate::endian::write_u32_le(&mut buf[OFF_BLOCKS_ALLOCATED..], self.blocks_allocated);
        buf[OFF_UUID_IMAGE..OFF_UUID_IMAGE + 16].copy_from_slice(&self.uuid_image);
        buf
    }

    /// Build the header for a freshly-created image. `blocks_offset` is
    /// placed immediately after the pre-header + header; `data_offset` is
    /// rounded up to a sector boundary past the block table.
    ///
    /// Both `Fixed` and `Dynamic` images start with an empty block table
    /// (`blocks_allocated == 0`, every entry `BLOCK_FREE`) — the allocate-
    /// on-write path in `disk.rs` is the same for either type; `image_type`
    /// is carried through as a tag but changes no allocation behavior here.
    pub fn new_image(image_type: ImageType, disk_size: u64, block_size: u32) -> Self {
        let blocks_count = disk_size.div_ceil(block_size as u64) as u32;
        let blocks_offset = (PRE_HEADER_SIZE + HEADER_SIZE) as u32;
        let block_table_bytes = blocks_count * 4;
        let data_offset = align_up(blocks_offset + block_table_bytes, 512);

        Self {
            image_type,
            image_flags: 0,
            blocks_offset,
            data_offset,
            sector_size: 512,
            disk_size,
            block_size,
            block_extra_size: 0,
            blocks_count,
            blocks_allocated: 0,
            uuid_image: *uuid::Uuid::new_v4().as_bytes(),
        }
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_header_round_trips() {
        let ph = VdiPreHeader::new();
        let bytes = ph.to_bytes();
        let decoded = VdiPreHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.signature, VDI_SIGNATURE);
        assert_eq!(decoded.version, VDI_VERSION);
    }

    #[test]
    fn rejects_bad_signature() {
        let buf = [0u8; PRE_HEADER_SIZE];
        assert!(VdiPreHeader::from_bytes(&buf).is_err());
    }

    #[test]
    fn header_round_trips_fixed_image() {
        let header = VdiHeader::new_image(ImageType::Fixed, 16 * 1024 * 1024, 1024 * 1024);
        let bytes = header.to_bytes();
        let decoded = VdiHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.blocks_count, 16);
        assert_eq!(decoded.blocks_allocated, 0);
        assert_eq!(decoded.disk_size, 16 * 1024 * 1024);
        assert_eq!(decoded.block_size, 1024 * 1024);
        assert!(matches!(decoded.image_type, ImageType::Fixed));
    }

    #[test]
    fn header_round_trips_dynamic_image() {
        let header = VdiHeader::new_image(ImageType::Dynamic, 16 * 1024 * 1024, 1024 * 1024);
        assert_eq!(header.blocks_allocated, 0);
        let bytes = header.to_bytes();
        let decoded = VdiHeader::from_bytes(&bytes).unwrap();
        assert!(matches!(decoded.image_type, ImageType::Dynamic));
    }
}
