//! Volume descriptor decode/encode: the 7-byte common header shared by all
//! descriptor types, and the primary/supplementary field layout from
//! ECMA-119 at the byte offsets spelled out in the on-disk interfaces.

use super::ISO_IDENTIFIER;
use crate::endian::{
    read_ascii, read_both_endian_u16, read_both_endian_u32, read_iso_datetime, read_utf16be,
    write_both_endian_u16, write_both_endian_u32, write_iso_datetime, write_vd_datetime_unset,
    IsoDateTime,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDescriptorType {
    Boot,
    Primary,
    Supplementary,
    Partition,
    SetTerminator,
}

impl VolumeDescriptorType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Boot),
            1 => Some(Self::Primary),
            2 => Some(Self::Supplementary),
            3 => Some(Self::Partition),
            255 => Some(Self::SetTerminator),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Boot => 0,
            Self::Primary => 1,
            Self::Supplementary => 2,
            Self::Partition => 3,
            Self::SetTerminator => 255,
        }
    }
}

/// The 7-byte header common to every volume descriptor sector: type byte,
/// 5-byte `"CD001"` identifier, version byte.
pub struct CommonHeader {
    pub descriptor_type: VolumeDescriptorType,
    pub version: u8,
}

pub fn decode_common_header(sector: &[u8]) -> Result<CommonHeader> {
    let descriptor_type = VolumeDescriptorType::from_byte(sector[0])
        .ok_or_else(|| Error::invalid_format(format!("unknown volume descriptor type {}", sector[0])))?;
    if &sector[1..6] != ISO_IDENTIFIER {
        return Err(Error::invalid_format(
            "volume descriptor identifier is not 'CD001'",
        ));
    }
    Ok(CommonHeader {
        descriptor_type,
        version: sector[6],
    })
}

/// Fields shared by the primary and supplementary descriptors — the layout
/// is byte-for-byte identical between the two; only the encoding of the
/// string fields and the escape-sequence byte differ.
#[derive(Debug, Clone)]
pub struct StandardDescriptor {
    pub system_identifier: String,
    pub volume_identifier: String,
    pub volume_space_size: u32,
    pub logical_block_size: u16,
    pub path_table_size: u32,
    pub type_l_path_table: u32,
    pub type_m_path_table: u32,
    pub root_directory_record: Vec<u8>,
    pub volume_set_identifier: String,
    pub publisher_identifier: String,
    pub preparer_identifier: String,
    pub application_identifier: String,
    pub creation_date: IsoDateTime,
    pub modification_date: IsoDateTime,
    pub file_structure_version: u8,
    /// Joliet escape sequence bytes at offset 88, present only on a
    /// supplementary descriptor; `None` for a plain primary descriptor.
    pub escape_sequence: Option<[u8; 3]>,
}

const SYSTEM_ID_OFF: usize = 8;
const VOLUME_ID_OFF: usize = 40;
const ESCAPE_SEQ_OFF: usize = 88;
const SPACE_SIZE_OFF: usize = 80;
const BLOCK_SIZE_OFF: usize = 128;
const PATH_TABLE_SIZE_OFF: usize = 132;
const L_PATH_TABLE_OFF: usize = 140;
const M_PATH_TABLE_OFF: usize = 148;
const ROOT_DIR_RECORD_OFF: usize = 156;
const VOLUME_SET_ID_OFF: usize = 190;
const PUBLISHER_ID_OFF: usize = 318;
const PREPARER_ID_OFF: usize = 446;
const APPLICATION_ID_OFF: usize = 574;
const CREATION_DATE_OFF: usize = 813;
const MODIFICATION_DATE_OFF: usize = 830;
const FILE_STRUCTURE_VERSION_OFF: usize = 881;

/// Joliet UCS-2 level-3 escape sequence, ECMA-119 appendix.
pub const JOLIET_ESCAPE_LEVEL3: [u8; 3] = [0x25, 0x2F, 0x45];

fn decode_text(buf: &[u8], joliet: bool) -> Result<String> {
    if joliet {
        read_utf16be(buf)
    } else {
        Ok(read_ascii(buf))
    }
}

pub fn decode_standard_descriptor(sector: &[u8], strict: bool) -> Result<StandardDescriptor> {
    let escape_sequence = {
        let bytes = &sector[ESCAPE_SEQ_OFF..ESCAPE_SEQ_OFF + 3];
        if bytes == [0, 0, 0] {
            None
        } else {
            Some([bytes[0], bytes[1], bytes[2]])
        }
    };
    let joliet = matches!(escape_sequence, Some(seq) if seq == JOLIET_ESCAPE_LEVEL3 || seq[2] == 0x40 || seq[2] == 0x43 || seq[2] == 0x45);

    Ok(StandardDescriptor {
        system_identifier: decode_text(&sector[SYSTEM_ID_OFF..SYSTEM_ID_OFF + 32], joliet)?,
        volume_identifier: decode_text(&sector[VOLUME_ID_OFF..VOLUME_ID_OFF + 32], joliet)?,
        volume_space_size: read_both_endian_u32(&sector[SPACE_SIZE_OFF..SPACE_SIZE_OFF + 8], strict)?,
        logical_block_size: read_both_endian_u16(&sector[BLOCK_SIZE_OFF..BLOCK_SIZE_OFF + 4], strict)?,
        path_table_size: read_both_endian_u32(
            &sector[PATH_TABLE_SIZE_OFF..PATH_TABLE_SIZE_OFF + 8],
            strict,
        )?,
        type_l_path_table: crate::endian::read_u32_le(&sector[L_PATH_TABLE_OFF..L_PATH_TABLE_OFF + 4]),
        type_m_path_table: crate::endian::read_u32_be(&sector[M_PATH_TABLE_OFF..M_PATH_TABLE_OFF + 4]),
        root_directory_record: sector[ROOT_DIR_RECORD_OFF..ROOT_DIR_RECORD_OFF + 34].to_vec(),
        volume_set_identifier: decode_text(&sector[VOLUME_SET_ID_OFF..VOLUME_SET_ID_OFF + 128], joliet)?,
        publisher_identifier: decode_text(&sector[PUBLISHER_ID_OFF..PUBLISHER_ID_OFF + 128], joliet)?,
        preparer_identifier: decode_text(&sector[PREPARER_ID_OFF..PREPARER_ID_OFF + 128], joliet)?,
        application_identifier: decode_text(
            &sector[APPLICATION_ID_OFF..APPLICATION_ID_OFF + 128],
            joliet,
        )?,
        creation_date: read_iso_datetime(
            sector[CREATION_DATE_OFF..CREATION_DATE_OFF + 7]
                .try_into()
                .unwrap(),
        ),
        modification_date: read_iso_datetime(
            sector[MODIFICATION_DATE_OFF..MODIFICATION_DATE_OFF + 7]
                .try_into()
                .unwrap(),
        ),
        file_structure_version: sector[FILE_STRUCTURE_VERSION_OFF],
        escape_sequence,
    })
}

/// Returns `true` if `escape_sequence` identifies Joliet (any of the three
/// documented UCS-2 levels).
pub fn is_joliet_escape(seq: &[u8; 3]) -> bool {
    seq[0] == 0x25 && seq[1] == 0x2F && matches!(seq[2], 0x40 | 0x43 | 0x45)
}

/// Encode a standard descriptor sector (used by the builder). `joliet`
/// selects UTF-16BE text encoding and writes the level-3 escape sequence.
pub fn encode_standard_descriptor(
    descriptor_type: VolumeDescriptorType,
    desc: &StandardDescriptor,
    joliet: bool,
) -> [u8; 2048] {
    let mut sector = [0u8; 2048];
    sector[0] = descriptor_type.to_byte();
    sector[1..6].copy_from_slice(ISO_IDENTIFIER);
    sector[6] = 1;

    write_field(&mut sector, SYSTEM_ID_OFF, 32, &desc.system_identifier, joliet);
    write_field(&mut sector, VOLUME_ID_OFF, 32, &desc.volume_identifier, joliet);
    if joliet {
        sector[ESCAPE_SEQ_OFF..ESCAPE_SEQ_OFF + 3].copy_from_slice(&JOLIET_ESCAPE_LEVEL3);
    }
    write_both_endian_u32(
        &mut sector[SPACE_SIZE_OFF..SPACE_SIZE_OFF + 8],
        desc.volume_space_size,
    );
    write_both_endian_u16(
        &mut sector[BLOCK_SIZE_OFF..BLOCK_SIZE_OFF + 4],
        desc.logical_block_size,
    );
    write_both_endian_u32(
        &mut sector[PATH_TABLE_SIZE_OFF..PATH_TABLE_SIZE_OFF + 8],
        desc.path_table_size,
    );
    sector[L_PATH_TABLE_OFF..L_PATH_TABLE_OFF + 4]
        .copy_from_slice(&desc.type_l_path_table.to_le_bytes());
    sector[M_PATH_TABLE_OFF..M_PATH_TABLE_OFF + 4]
        .copy_from_slice(&desc.type_m_path_table.to_be_bytes());
    sector[ROOT_DIR_RECORD_OFF..ROOT_DIR_RECORD_OFF + desc.root_directory_record.len()]
        .copy_from_slice(&desc.root_directory_record);
    write_field(
        &mut sector,
        VOLUME_SET_ID_OFF,
        128,
        &desc.volume_set_identifier,
        joliet,
    );
    write_field(
        &mut sector,
        PUBLISHER_ID_OFF,
        128,
        &desc.publisher_identifier,
        joliet,
    );
    write_field(
        &mut sector,
        PREPARER_ID_OFF,
        128,
        &desc.preparer_identifier,
        joliet,
    );
    write_field(
        &mut sector,
        APPLICATION_ID_OFF,
        128,
        &desc.application_identifier,
        joliet,
    );
    sector[CREATION_DATE_OFF..CREATION_DATE_OFF + 7]
        .copy_from_slice(&write_iso_datetime(&desc.creation_date));
    sector[MODIFICATION_DATE_OFF..MODIFICATION_DATE_OFF + 7]
        .copy_from_slice(&write_iso_datetime(&desc.modification_date));
    let unset = write_vd_datetime_unset();
    sector[864..864 + 17].copy_from_slice(&unset); // expiration date, unused
    sector[847..847 + 17].copy_from_slice(&unset); // effective date, unused
    sector[FILE_STRUCTURE_VERSION_OFF] = desc.file_structure_version;
    sector
}

fn write_field(sector: &mut [u8], offset: usize, width: usize, value: &str, joliet: bool) {
    if joliet {
        let encoded = crate::endian::write_utf16be(value, width);
        sector[offset..offset + width].copy_from_slice(&encoded);
    } else {
        let mut bytes = vec![b' '; width];
        let src = value.as_bytes();
        let n = src.len().min(width);
        bytes[..n].copy_from_slice(&src[..n]);
        sector[offset..offset + width].copy_from_slice(&bytes);
    }
}

pub fn encode_boot_record(boot_catalog_lba: u32) -> [u8; 2048] {
    let mut sector = [0u8; 2048];
    sector[0] = VolumeDescriptorType::Boot.to_byte();
    sector[1..6].copy_from_slice(ISO_IDENTIFIER);
    sector[6] = 1;
    sector[7..7 + 23].copy_from_slice(b"EL TORITO SPECIFICATION");
    sector[71..75].copy_from_slice(&boot_catalog_lba.to_le_bytes());
    sector
}

pub fn encode_set_terminator() -> [u8; 2048] {
    let mut sector = [0u8; 2048];
    sector[0] = VolumeDescriptorType::SetTerminator.to_byte();
    sector[1..6].copy_from_slice(ISO_IDENTIFIER);
    sector[6] = 1;
    sector
}

pub const BOOT_SYSTEM_IDENTIFIER: &[u8; 23] = b"EL TORITO SPECIFICATION";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_header_rejects_bad_identifier() {
        let mut sector = [0u8; 2048];
        sector[0] = 1;
        sector[1..6].copy_from_slice(b"XXXXX");
        assert!(decode_common_header(&sector).is_err());
    }

    #[test]
    fn common_header_accepts_primary() {
        let mut sector = [0u8; 2048];
        sector[0] = 1;
        sector[1..6].copy_from_slice(b"CD001");
        sector[6] = 1;
        let header = decode_common_header(&sector).unwrap();
        assert_eq!(header.descriptor_type, VolumeDescriptorType::Primary);
    }

    #[test]
    fn joliet_escape_detection() {
        assert!(is_joliet_escape(&JOLIET_ESCAPE_LEVEL3));
        assert!(!is_joliet_escape(&[0, 0, 0]));
    }
}
