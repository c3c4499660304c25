//! On-disk headers for the two sparse VMDK extent flavors: the hosted
//! sparse format (`monolithicSparse`/`twoGbMaxExtentSparse`, magic `VMDK`)
//! and the VMFS server-sparse format (`vmfsSparse`, historically called
//! "COWD", magic `COWD`). Both precede a grain directory and a run of grain
//! tables; `grain.rs` does the actual grain-table walk.

use crate::error::{Error, Result};

/// Hosted sparse extent magic ("VMDK" as little-endian u32).
pub const VMDK_MAGIC: u32 = 0x564D_444B;

/// VMFS server-sparse ("COWD") extent magic.
pub const COWD_MAGIC: u32 = 0x4457_4F43;

/// Size of a sector in bytes, used throughout the grain engine.
pub const SECTOR_SIZE: u64 = 512;

const FLAG_COMPRESSED: u32 = 1 << 16;
const FLAG_MARKERS: u32 = 1 << 17;

/// Parsed hosted-sparse extent header (sector 0 of a `Sparse` extent file).
#[derive(Debug, Clone)]
pub struct HostedSparseHeader {
    pub version: u32,
    pub flags: u32,
    pub capacity: u64,
    pub grain_size: u64,
    pub descriptor_offset: u64,
    pub descriptor_size: u64,
    pub num_gtes_per_gt: u32,
    pub rgd_offset: u64,
    pub gd_offset: u64,
    pub overhead: u64,
    pub unclean_shutdown: u8,
    pub compress_algorithm: u16,
}

impl HostedSparseHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 512 {
            return Err(Error::invalid_format("hosted sparse header too short"));
        }
        let magic = crate::endian::read_u32_le(&data[0..4]);
        if magic != VMDK_MAGIC {
            return Err(Error::invalid_format(format!(
                "hosted sparse magic mismatch: expected {VMDK_MAGIC:#010x}, got {magic:#010x}"
            )));
        }
        let version = crate::endian::read_u32_le(&data[4..8]);
        let flags = crate::endian::read_u32_le(&data[8..12]);
        let capacity = crate::endian::read_u64_le(&data[12..20]);
        let grain_size = crate::endian::read_u64_le(&data[20..28]);
        let descriptor_offset = crate::endian::read_u64_le(&data[28..36]);
        let descriptor_size = crate::endian::read_u64_le(&data[36..44]);
        let num_gtes_per_gt = crate::endian::read_u32_le(&data[44..48]);
        let rgd_offset = crate::endian::read_u64_le(&data[48..56]);
        let gd_offset = crate::endian::read_u64_le(&data[56..64]);
        let overhead = crate::endian::read_u64_le(&data[64..72]);
        let unclean_shutdown = data[72];
        let compress_algorithm = crate::endian::read_u16_le(&data[77..79]);

        Ok(Self {
            version,
            flags,
            capacity,
            grain_size,
            descriptor_offset,
            descriptor_size,
            num_gtes_per_gt,
            rgd_offset,
            gd_offset,
            overhead,
            unclean_shutdown,
            compress_algorithm,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn has_markers(&self) -> bool {
        self.flags & FLAG_MARKERS != 0
    }

    pub fn num_gd_entries(&self) -> u64 {
        let grains_total = (self.capacity + self.grain_size - 1) / self.grain_size;
        (grains_total + self.num_gtes_per_gt as u64 - 1) / self.num_gtes_per_gt as u64
    }
}

/// Parsed VMFS server-sparse ("COWD") header. `num_gtes_per_gt` is not
/// stored on disk for this format and is fixed at 4096.
#[derive(Debug, Clone)]
pub struct CowdHeader {
    pub capacity_sectors: u64,
    pub grain_size_sectors: u64,
    pub gd_offset_sectors: u64,
    pub num_gd_entries: u32,
}

impl CowdHeader {
    pub const NUM_GTES_PER_GT: u32 = 4096;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 0x1C + 4 {
            return Err(Error::invalid_format("COWD header too short"));
        }
        let magic = crate::endian::read_u32_le(&data[0x00..0x04]);
        if magic != COWD_MAGIC {
            return Err(Error::invalid_format(format!(
                "COWD magic mismatch: expected {COWD_MAGIC:#010x}, got {magic:#010x}"
            )));
        }
        let capacity_sectors = crate::endian::read_u32_le(&data[0x0C..0x10]) as u64;
        let grain_size_sectors = crate::endian::read_u32_le(&data[0x10..0x14]) as u64;
        let gd_offset_sectors = crate::endian::read_u32_le(&data[0x14..0x18]) as u64;
        let num_gd_entries = crate::endian::read_u32_le(&data[0x18..0x1C]);
        Ok(Self {
            capacity_sectors,
            grain_size_sectors,
            gd_offset_sectors,
            num_gd_entries,
        })
    }
}

/// Read a run of little-endian u32 grain-directory entries (sector offsets
/// to grain tables, zero meaning "not allocated") out of a mapped extent
/// file.
pub fn read_grain_directory(mmap: &[u8], gd_offset_sectors: u64, num_entries: u64) -> Result<Vec<u32>> {
    let gd_offset_bytes = gd_offset_sectors * SECTOR_SIZE;
    let needed = gd_offset_bytes as usize + num_entries as usize * 4;
    if needed > mmap.len() {
        return Err(Error::invalid_format("grain directory extends beyond file"));
    }
    let mut entries = Vec::with_capacity(num_entries as usize);
    for i in 0..num_entries {
        let off = gd_offset_bytes as usize + i as usize * 4;
        entries.push(crate::endian::read_u32_le(&mmap[off..off + 4]));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosted_header_bytes() -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        buf[0..4].copy_from_slice(&VMDK_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&1u32.to_le_bytes());
        buf[8..12].copy_from_slice(&1u32.to_le_bytes());
        buf[12..20].copy_from_slice(&1000u64.to_le_bytes());
        buf[20..28].copy_from_slice(&128u64.to_le_bytes());
        buf[28..36].copy_from_slice(&1u64.to_le_bytes());
        buf[36..44].copy_from_slice(&20u64.to_le_bytes());
        buf[44..48].copy_from_slice(&512u32.to_le_bytes());
        buf[48..56].copy_from_slice(&0u64.to_le_bytes());
        buf[56..64].copy_from_slice(&100u64.to_le_bytes());
        buf
    }

    #[test]
    fn decodes_hosted_sparse_header() {
        let header = HostedSparseHeader::from_bytes(&hosted_header_bytes()).unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.capacity, 1000);
        assert_eq!(header.grain_size, 128);
        assert_eq!(header.gd_offset, 100);
        assert!(!header.is_compressed());
    }

    #[test]
    fn rejects_bad_hosted_magic() {
        let buf = vec![0u8; 512];
        assert!(HostedSparseHeader::from_bytes(&buf).is_err());
    }

    #[test]
    fn decodes_cowd_header() {
        let mut buf = vec![0u8; 0x20];
        buf[0..4].copy_from_slice(&COWD_MAGIC.to_le_bytes());
        buf[0x0C..0x10].copy_from_slice(&2000u32.to_le_bytes());
        buf[0x10..0x14].copy_from_slice(&512u32.to_le_bytes());
        buf[0x14..0x18].copy_from_slice(&4u32.to_le_bytes());
        buf[0x18..0x1C].copy_from_slice(&1u32.to_le_bytes());
        let header = CowdHeader::from_bytes(&buf).unwrap();
        assert_eq!(header.capacity_sectors, 2000);
        assert_eq!(header.num_gd_entries, 1);
    }
}
