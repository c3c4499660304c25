//! L-path-table (little-endian) and M-path-table (big-endian) entry
//! codec. The four on-disk path tables (primary/supplementary × L/M) are
//! otherwise structurally identical.

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct PathTableEntry {
    pub extent_lba: u32,
    pub parent_directory_index: u16,
    pub name: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

pub fn decode_entry(buf: &[u8], endian: Endianness) -> Result<(PathTableEntry, usize)> {
    if buf.len() < 8 {
        return Err(Error::invalid_format("path table entry too short"));
    }
    let name_length = buf[0] as usize;
    let ext_attr_len = buf[1];
    let (extent_lba, parent_directory_index) = match endian {
        Endianness::Little => (
            crate::endian::read_u32_le(&buf[2..6]),
            crate::endian::read_u16_le(&buf[6..8]),
        ),
        Endianness::Big => (
            crate::endian::read_u32_be(&buf[2..6]),
            crate::endian::read_u16_be(&buf[6..8]),
        ),
    };
    let name_start = 8;
    let name_end = name_start + name_length;
    if name_end > buf.len() {
        return Err(Error::invalid_format("path table entry name overruns buffer"));
    }
    let name = buf[name_start..name_end].to_vec();
    let mut consumed = name_end;
    if name_length % 2 != 0 {
        consumed += 1; // padding byte
    }
    let _ = ext_attr_len;
    Ok((
        PathTableEntry {
            extent_lba,
            parent_directory_index,
            name,
        },
        consumed,
    ))
}

pub fn encode_entry(entry: &PathTableEntry, endian: Endianness) -> Vec<u8> {
    let name_length = entry.name.len();
    let padded = name_length % 2 != 0;
    let mut buf = vec![0u8; 8 + name_length + if padded { 1 } else { 0 }];
    buf[0] = name_length as u8;
    buf[1] = 0;
    match endian {
        Endianness::Little => {
            buf[2..6].copy_from_slice(&entry.extent_lba.to_le_bytes());
            buf[6..8].copy_from_slice(&entry.parent_directory_index.to_le_bytes());
        }
        Endianness::Big => {
            buf[2..6].copy_from_slice(&entry.extent_lba.to_be_bytes());
            buf[6..8].copy_from_slice(&entry.parent_directory_index.to_be_bytes());
        }
    }
    buf[8..8 + name_length].copy_from_slice(&entry.name);
    buf
}

/// Decode every entry in a path table buffer (total length `path_table_size`
/// from the volume descriptor).
pub fn decode_path_table(buf: &[u8], endian: Endianness) -> Result<Vec<PathTableEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos + 8 <= buf.len() {
        let (entry, consumed) = decode_entry(&buf[pos..], endian)?;
        entries.push(entry);
        pos += consumed;
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_little_endian() {
        let entry = PathTableEntry {
            extent_lba: 42,
            parent_directory_index: 1,
            name: b"DIR".to_vec(),
        };
        let encoded = encode_entry(&entry, Endianness::Little);
        let (decoded, consumed) = decode_entry(&encoded, Endianness::Little).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.extent_lba, 42);
        assert_eq!(decoded.name, b"DIR");
    }

    #[test]
    fn round_trip_big_endian() {
        let entry = PathTableEntry {
            extent_lba: 42,
            parent_directory_index: 1,
            name: b"DIR".to_vec(),
        };
        let encoded = encode_entry(&entry, Endianness::Big);
        let (decoded, _) = decode_entry(&encoded, Endianness::Big).unwrap();
        assert_eq!(decoded.extent_lba, 42);
    }

    #[test]
    fn decode_multiple_entries() {
        let mut buf = Vec::new();
        buf.extend(encode_entry(
            &PathTableEntry {
                extent_lba: 1,
                parent_directory_index: 1,
                name: b"A".to_vec(),
            },
            Endianness::Little,
        ));
        buf.extend(encode_entry(
            &PathTableEntry {
                extent_lba: 2,
                parent_directory_index: 1,
                name: b"BB".to_vec(),
            },
            Endianness::Little,
        ));
        let entries = decode_path_table(&buf, Endianness::Little).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
