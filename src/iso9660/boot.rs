//! El Torito boot catalog: the validation entry checksum and the initial
//! entry describing the default boot image.

use crate::error::{Error, Result};

/// Offset of the boot record volume descriptor's catalog-LBA field.
pub const BOOT_CATALOG_LBA_FIELD_OFFSET: usize = 0x47;

#[derive(Debug, Clone, Copy)]
pub struct ValidationEntry {
    pub platform_id: u8,
    pub checksum: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct InitialEntry {
    pub boot_indicator: u8,
    pub media_type: u8,
    pub load_segment: u16,
    pub system_type: u8,
    pub sector_count: u16,
    pub load_rba: u32,
}

/// Validate and decode the 32-byte validation entry (catalog entry 0) plus
/// the 32-byte initial entry that follows it.
pub fn decode_catalog(catalog_sector: &[u8]) -> Result<(ValidationEntry, InitialEntry)> {
    if catalog_sector.len() < 64 {
        return Err(Error::invalid_format("boot catalog sector too short"));
    }
    let validation = &catalog_sector[0..32];
    if validation[0] != 0x01 {
        return Err(Error::invalid_format("boot catalog validation entry header byte is not 0x01"));
    }
    let platform_id = validation[1];
    if !matches!(platform_id, 0 | 1 | 2) {
        return Err(Error::invalid_format(format!(
            "unknown El Torito platform id {platform_id}"
        )));
    }
    if validation[30] != 0x55 || validation[31] != 0xAA {
        return Err(Error::invalid_format("boot catalog signature bytes are not 0x55AA"));
    }
    let checksum = crate::endian::read_u16_le(&validation[28..30]);

    let sum = sum_words_le(validation);
    if sum != 0 {
        return Err(Error::invalid_format(format!(
            "boot catalog validation entry checksum failed: word sum = {sum:#06x}"
        )));
    }

    let initial = &catalog_sector[32..64];
    let entry = InitialEntry {
        boot_indicator: initial[0],
        media_type: initial[1],
        load_segment: crate::endian::read_u16_le(&initial[2..4]),
        system_type: initial[4],
        sector_count: crate::endian::read_u16_le(&initial[6..8]),
        load_rba: crate::endian::read_u32_le(&initial[8..12]),
    };

    Ok((
        ValidationEntry {
            platform_id,
            checksum,
        },
        entry,
    ))
}

fn sum_words_le(bytes: &[u8]) -> u16 {
    bytes
        .chunks_exact(2)
        .fold(0u16, |acc, pair| acc.wrapping_add(u16::from_le_bytes([pair[0], pair[1]])))
}

/// Encode a validation entry + initial entry pair, computing the checksum
/// that makes the 32-byte validation entry sum to zero.
pub fn encode_catalog(platform_id: u8, entry: &InitialEntry) -> [u8; 64] {
    let mut out = [0u8; 64];
    out[0] = 0x01;
    out[1] = platform_id;
    out[30] = 0x55;
    out[31] = 0xAA;
    // Checksum field (bytes 28..30) starts zeroed; compute the word-sum of
    // the rest, then write its two's-complement negation so the full
    // 32-byte entry sums to zero.
    let partial_sum = sum_words_le(&out[0..28]) .wrapping_add(sum_words_le(&out[30..32]));
    let checksum = 0u16.wrapping_sub(partial_sum);
    out[28..30].copy_from_slice(&checksum.to_le_bytes());

    out[32] = entry.boot_indicator;
    out[33] = entry.media_type;
    out[34..36].copy_from_slice(&entry.load_segment.to_le_bytes());
    out[36] = entry.system_type;
    out[38..40].copy_from_slice(&entry.sector_count.to_le_bytes());
    out[40..44].copy_from_slice(&entry.load_rba.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips_and_validates() {
        let entry = InitialEntry {
            boot_indicator: 0x88,
            media_type: 0,
            load_segment: 0,
            system_type: 0,
            sector_count: 4,
            load_rba: 25,
        };
        let catalog = encode_catalog(0, &entry);
        let (validation, decoded) = decode_catalog(&catalog).unwrap();
        assert_eq!(validation.platform_id, 0);
        assert_eq!(decoded.load_rba, 25);
        assert_eq!(decoded.sector_count, 4);
    }

    #[test]
    fn bad_signature_rejected() {
        let mut catalog = [0u8; 64];
        catalog[0] = 0x01;
        assert!(decode_catalog(&catalog).is_err());
    }
}
