//! Scalar, string, and timestamp codecs shared by the on-disk formats.
//!
//! ISO-9660 stores many integers twice — little-endian then big-endian of
//! the same value — a convention this module calls a "both-endian integer".
//! VMDK and VDI headers are plain little-endian. Ext superblocks are plain
//! little-endian too. Everything here is a free function rather than a
//! trait: each format only ever needs one direction for a given field, and a
//! trait would buy nothing but indirection.

use crate::error::{Error, Result};

pub fn read_u16_le(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}

pub fn read_u32_le(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

pub fn read_u64_le(buf: &[u8]) -> u64 {
    u64::from_le_bytes(buf[..8].try_into().unwrap())
}

pub fn read_u16_be(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

pub fn read_u32_be(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

pub fn write_u16_le(buf: &mut [u8], value: u16) {
    buf[..2].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u32_le(buf: &mut [u8], value: u32) {
    buf[..4].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u64_le(buf: &mut [u8], value: u64) {
    buf[..8].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u16_be(buf: &mut [u8], value: u16) {
    buf[..2].copy_from_slice(&value.to_be_bytes());
}

pub fn write_u32_be(buf: &mut [u8], value: u32) {
    buf[..4].copy_from_slice(&value.to_be_bytes());
}

/// Read an ISO-9660 both-endian `u16`: LE half at `buf[0..2]`, BE half at
/// `buf[2..4]`. The LE half is authoritative; a mismatch is logged and
/// ignored rather than failing the mount, matching real-world ISO images
/// that are occasionally sloppy about the redundant half. Pass `strict` to
/// turn a mismatch into `Error::InvalidFormat` instead.
pub fn read_both_endian_u16(buf: &[u8], strict: bool) -> Result<u16> {
    let le = read_u16_le(&buf[0..2]);
    let be = read_u16_be(&buf[2..4]);
    if le != be {
        if strict {
            return Err(Error::invalid_format(format!(
                "both-endian u16 mismatch: le={le:#x} be={be:#x}"
            )));
        }
        tracing::warn!(le, be, "both-endian u16 halves disagree, trusting LE");
    }
    Ok(le)
}

/// Read an ISO-9660 both-endian `u32`: LE half at `buf[0..4]`, BE half at
/// `buf[4..8]`.
pub fn read_both_endian_u32(buf: &[u8], strict: bool) -> Result<u32> {
    let le = read_u32_le(&buf[0..4]);
    let be = read_u32_be(&buf[4..8]);
    if le != be {
        if strict {
            return Err(Error::invalid_format(format!(
                "both-endian u32 mismatch: le={le:#x} be={be:#x}"
            )));
        }
        tracing::warn!(le, be, "both-endian u32 halves disagree, trusting LE");
    }
    Ok(le)
}

pub fn write_both_endian_u16(buf: &mut [u8], value: u16) {
    write_u16_le(&mut buf[0..2], value);
    write_u16_be(&mut buf[2..4], value);
}

pub fn write_both_endian_u32(buf: &mut [u8], value: u32) {
    write_u32_le(&mut buf[0..4], value);
    write_u32_be(&mut buf[4..8], value);
}

/// Decode a fixed-width ASCII field, trimming trailing spaces (the ISO-9660
/// a/d-character convention pads unused width with `0x20`).
pub fn read_ascii(buf: &[u8]) -> String {
    let text = String::from_utf8_lossy(buf);
    text.trim_end().to_string()
}

/// Decode a UTF-16BE field (Joliet names and the supplementary descriptor's
/// text fields), trimming trailing spaces the same way `read_ascii` does.
pub fn read_utf16be(buf: &[u8]) -> Result<String> {
    if buf.len() % 2 != 0 {
        return Err(Error::invalid_encoding("UTF-16BE field has odd length"));
    }
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map(|s| s.trim_end().to_string())
        .map_err(|_| Error::invalid_encoding("invalid UTF-16BE sequence"))
}

/// Encode a string as UTF-16BE, right-padding with spaces to `width` bytes.
pub fn write_utf16be(name: &str, width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width);
    for unit in name.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    while out.len() < width {
        out.extend_from_slice(&0x0020u16.to_be_bytes());
    }
    out.truncate(width.max(out.len()));
    out
}

/// ISO-9660 d-characters: `[A-Z0-9_]`.
pub fn is_d_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'
}

/// ISO-9660 a-characters: the restricted IA-5 subset used in text fields —
/// uppercase letters, digits, space, and a fixed set of punctuation.
pub fn is_a_char(c: char) -> bool {
    matches!(c,
        'A'..='Z' | '0'..='9' | ' ' | '!' | '"' | '%' | '&' | '\'' | '(' | ')'
        | '*' | '+' | ',' | '-' | '.' | '/' | ':' | ';' | '<' | '=' | '>' | '?'
    )
}

pub fn validate_d_chars(s: &str) -> Result<()> {
    if s.chars().all(is_d_char) {
        Ok(())
    } else {
        Err(Error::invalid_encoding(format!(
            "'{s}' contains characters outside the d-character set"
        )))
    }
}

pub fn validate_a_chars(s: &str) -> Result<()> {
    if s.chars().all(is_a_char) {
        Ok(())
    } else {
        Err(Error::invalid_encoding(format!(
            "'{s}' contains characters outside the a-character set"
        )))
    }
}

/// The seven-byte ISO-9660 "recording date and time" field: years since
/// 1900, month, day, hour, minute, second, and a signed GMT offset in
/// 15-minute units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoDateTime {
    pub years_since_1900: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub gmt_offset_quarter_hours: i8,
}

impl IsoDateTime {
    /// The sentinel "unset" date: all zero fields, used as the fallback
    /// when recorded bytes are out of range rather than failing the read.
    pub const UNSET: Self = Self {
        years_since_1900: 0,
        month: 0,
        day: 0,
        hour: 0,
        minute: 0,
        second: 0,
        gmt_offset_quarter_hours: 0,
    };
}

/// Read the seven-byte recording time. Month/day bytes outside `1..=12` /
/// `1..=31` fall back to `IsoDateTime::UNSET` (spec: out-of-range date bytes
/// recover to a sentinel rather than failing the mount).
pub fn read_iso_datetime(buf: &[u8; 7]) -> IsoDateTime {
    let month = buf[1];
    let day = buf[2];
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        tracing::warn!(month, day, "recording time out of range, using sentinel");
        return IsoDateTime::UNSET;
    }
    IsoDateTime {
        years_since_1900: buf[0],
        month,
        day,
        hour: buf[3],
        minute: buf[4],
        second: buf[5],
        gmt_offset_quarter_hours: buf[6] as i8,
    }
}

pub fn write_iso_datetime(dt: &IsoDateTime) -> [u8; 7] {
    [
        dt.years_since_1900,
        dt.month,
        dt.day,
        dt.hour,
        dt.minute,
        dt.second,
        dt.gmt_offset_quarter_hours as u8,
    ]
}

/// The 17-byte ASCII volume-descriptor timestamp
/// (`YYYYMMDDHHMMSSmm` + a signed GMT-offset byte). Unset fields are all
/// `'0'` with a zero offset byte per ECMA-119.
pub fn read_vd_datetime(buf: &[u8; 17]) -> Result<String> {
    std::str::from_utf8(&buf[0..16])
        .map(|s| s.to_string())
        .map_err(|_| Error::invalid_encoding("volume descriptor timestamp is not ASCII"))
}

pub fn write_vd_datetime_unset() -> [u8; 17] {
    let mut out = [b'0'; 17];
    out[16] = 0;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_endian_u16_round_trip() {
        let mut buf = [0u8; 4];
        write_both_endian_u16(&mut buf, 0x1234);
        assert_eq!(read_both_endian_u16(&buf, true).unwrap(), 0x1234);
    }

    #[test]
    fn both_endian_u32_round_trip() {
        let mut buf = [0u8; 8];
        write_both_endian_u32(&mut buf, 0xdead_beef);
        assert_eq!(read_both_endian_u32(&buf, true).unwrap(), 0xdead_beef);
    }

    #[test]
    fn both_endian_mismatch_is_lenient_by_default() {
        let mut buf = [0u8; 4];
        write_u16_le(&mut buf[0..2], 5);
        write_u16_be(&mut buf[2..4], 6);
        assert_eq!(read_both_endian_u16(&buf, false).unwrap(), 5);
        assert!(read_both_endian_u16(&buf, true).is_err());
    }

    #[test]
    fn ascii_trims_trailing_spaces() {
        assert_eq!(read_ascii(b"HELLO     "), "HELLO");
    }

    #[test]
    fn utf16be_round_trip() {
        let bytes = write_utf16be("HELLO", 12);
        assert_eq!(read_utf16be(&bytes).unwrap(), "HELLO");
    }

    #[test]
    fn d_char_validation() {
        assert!(validate_d_chars("HELLO_WORLD123").is_ok());
        assert!(validate_d_chars("hello.txt").is_err());
    }

    #[test]
    fn out_of_range_date_falls_back_to_sentinel() {
        let buf = [120u8, 13, 40, 0, 0, 0, 0]; // month=13, day=40
        assert_eq!(read_iso_datetime(&buf), IsoDateTime::UNSET);
    }

    #[test]
    fn in_range_date_round_trips() {
        let dt = IsoDateTime {
            years_since_1900: 124,
            month: 3,
            day: 15,
            hour: 10,
            minute: 30,
            second: 0,
            gmt_offset_quarter_hours: 4,
        };
        let buf = write_iso_datetime(&dt);
        assert_eq!(read_iso_datetime(&buf), dt);
    }
}
