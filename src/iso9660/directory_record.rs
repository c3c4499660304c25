//! Variable-length directory record decode/encode.

use crate::endian::{read_both_endian_u16, read_both_endian_u32, read_iso_datetime, IsoDateTime};
use crate::error::{Error, Result};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u8 {
        const HIDDEN       = 0x01;
        const DIRECTORY    = 0x02;
        const ASSOCIATED   = 0x04;
        const EXTENDED_ATTR_FORMAT = 0x08;
        const EXTENDED_ATTR_PERMS  = 0x10;
        const MULTI_EXTENT = 0x80;
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryRecord {
    pub extent_lba: u32,
    pub data_length: u32,
    pub recording_time: IsoDateTime,
    pub flags: RecordFlags,
    pub file_unit_size: u8,
    pub interleave_gap_size: u8,
    pub volume_sequence_number: u16,
    pub identifier: Vec<u8>,
    pub system_use: Vec<u8>,
}

impl DirectoryRecord {
    pub fn is_self(&self) -> bool {
        self.identifier == [0u8]
    }

    pub fn is_parent(&self) -> bool {
        self.identifier == [1u8]
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(RecordFlags::DIRECTORY)
    }

    /// A file record's contiguity requirement (§4.E step 5): both of these
    /// must be zero for the reader's contiguous fast path to apply.
    pub fn is_contiguous(&self) -> bool {
        self.file_unit_size == 0 && self.interleave_gap_size == 0
    }
}

/// Decode one directory record starting at `buf[0]`. Returns `None` if the
/// length byte is zero, meaning "padding to the next sector" rather than a
/// record (§4.E step 4 / §8 boundary behavior).
pub fn decode_record(buf: &[u8], strict: bool) -> Result<Option<(DirectoryRecord, usize)>> {
    let length = buf[0] as usize;
    if length == 0 {
        return Ok(None);
    }
    if length < 33 || length > buf.len() {
        return Err(Error::invalid_format(format!(
            "directory record length {length} out of range"
        )));
    }
    let ext_attr_len = buf[1];
    let extent_lba = read_both_endian_u32(&buf[2..10], strict)?;
    let data_length = read_both_endian_u32(&buf[10..18], strict)?;
    let recording_time = read_iso_datetime(buf[18..25].try_into().unwrap());
    let flags = RecordFlags::from_bits_truncate(buf[25]);
    let file_unit_size = buf[26];
    let interleave_gap_size = buf[27];
    let volume_sequence_number = read_both_endian_u16(&buf[28..32], strict)?;
    let name_length = buf[32] as usize;
    let name_start = 33;
    let name_end = name_start + name_length;
    if name_end > length {
        return Err(Error::invalid_format("directory record name overruns record length"));
    }
    let identifier = buf[name_start..name_end].to_vec();
    // Padding byte if name_length is even.
    let system_use_start = name_end + (1 - name_length % 2);
    let system_use = if system_use_start < length {
        buf[system_use_start..length].to_vec()
    } else {
        Vec::new()
    };

    let _ = ext_attr_len;
    Ok(Some((
        DirectoryRecord {
            extent_lba,
            data_length,
            recording_time,
            flags,
            file_unit_size,
            interleave_gap_size,
            volume_sequence_number,
            identifier,
            system_use,
        },
        length,
    )))
}

/// Encode a directory record. `both_endian` fields are always written in
/// both-endian form; the name is written as-is (caller handles
/// ASCII vs. UTF-16BE and normalization).
pub fn encode_record(record: &DirectoryRecord) -> Vec<u8> {
    let name_padded = record.identifier.len() % 2 == 0;
    let mut len = 33 + record.identifier.len() + if name_padded { 1 } else { 0 };
    len += record.system_use.len();
    // Round the total record length up to even (ISO-9660 requires even record lengths).
    if len % 2 != 0 {
        len += 1;
    }

    let mut buf = vec![0u8; len];
    buf[0] = len as u8;
    buf[1] = 0; // ext_attr_len
    crate::endian::write_both_endian_u32(&mut buf[2..10], record.extent_lba);
    crate::endian::write_both_endian_u32(&mut buf[10..18], record.data_length);
    buf[18..25].copy_from_slice(&crate::endian::write_iso_datetime(&record.recording_time));
    buf[25] = record.flags.bits();
    buf[26] = record.file_unit_size;
    buf[27] = record.interleave_gap_size;
    crate::endian::write_both_endian_u16(&mut buf[28..32], record.volume_sequence_number);
    buf[32] = record.identifier.len() as u8;
    let name_start = 33;
    let name_end = name_start + record.identifier.len();
    buf[name_start..name_end].copy_from_slice(&record.identifier);
    let system_use_start = name_end + if name_padded { 1 } else { 0 };
    let system_use_end = system_use_start + record.system_use.len();
    buf[system_use_start..system_use_end].copy_from_slice(&record.system_use);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> DirectoryRecord {
        DirectoryRecord {
            extent_lba: 20,
            data_length: 12,
            recording_time: IsoDateTime::UNSET,
            flags: RecordFlags::empty(),
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_sequence_number: 1,
            identifier: b"HELLO.TXT;1".to_vec(),
            system_use: Vec::new(),
        }
    }

    #[test]
    fn round_trip_encode_decode() {
        let record = sample_record();
        let encoded = encode_record(&record);
        let (decoded, consumed) = decode_record(&encoded, true).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.extent_lba, 20);
        assert_eq!(decoded.data_length, 12);
        assert_eq!(decoded.identifier, b"HELLO.TXT;1");
    }

    #[test]
    fn zero_length_byte_is_padding() {
        let buf = [0u8; 16];
        assert!(decode_record(&buf, true).unwrap().is_none());
    }

    #[test]
    fn is_contiguous_checks_both_fields() {
        let mut record = sample_record();
        assert!(record.is_contiguous());
        record.file_unit_size = 1;
        assert!(!record.is_contiguous());
    }
}
