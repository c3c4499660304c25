//! SUSP (System Use Sharing Protocol) TLV walk and the Rock Ridge entries
//! layered on top of it.

use crate::error::{Error, Result};

/// The "SP" signature identifying SUSP presence on the root-self record:
/// `"SP" 0x07 0x01 0xBE 0xEF`.
pub const SP_SIGNATURE: [u8; 5] = [b'S', b'P', 0x07, 0x01, 0xBE];
const SP_CHECK_BYTES: [u8; 2] = [0xBE, 0xEF];

#[derive(Debug, Clone)]
pub struct SuspEntry {
    pub signature: [u8; 2],
    pub data: Vec<u8>,
}

/// A continuation pointer decoded from a "CE" entry: the (block,
/// block-offset, length) triple the chained system-use area lives at.
#[derive(Debug, Clone, Copy)]
pub struct Continuation {
    pub block: u32,
    pub offset: u32,
    pub length: u32,
}

/// Walk one system-use area's TLV entries. Each entry is `(sig[2], len u8,
/// version u8, data[len-4])`. Stops at a zero-length or truncated entry
/// rather than erroring — trailing padding is common.
pub fn walk_entries(area: &[u8]) -> Vec<SuspEntry> {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos + 4 <= area.len() {
        let len = area[pos + 2] as usize;
        if len < 4 || pos + len > area.len() {
            break;
        }
        entries.push(SuspEntry {
            signature: [area[pos], area[pos + 1]],
            data: area[pos + 4..pos + len].to_vec(),
        });
        pos += len;
    }
    entries
}

/// Detects SUSP presence on the root-self record's system-use area and
/// returns the "SP" record's `SuspSkipBytes` field (bytes of each
/// subsequent system-use area to skip before TLV entries begin — almost
/// always zero).
pub fn detect_sp(root_self_system_use: &[u8]) -> Option<u8> {
    if root_self_system_use.len() < 7 {
        return None;
    }
    if root_self_system_use[0..2] == SP_SIGNATURE[0..2]
        && root_self_system_use[4..6] == SP_CHECK_BYTES
    {
        Some(root_self_system_use[6])
    } else {
        None
    }
}

/// Identifiers an "ER" (extension reference) entry may declare; presence of
/// any of these confirms Rock Ridge.
pub const RR_EXTENSION_IDS: [&str; 3] = ["RRIP_1991A", "IEEE_P1282", "IEEE_1282"];

/// Scan entries for an "ER" or "RR" record identifying Rock Ridge.
pub fn detect_rock_ridge(entries: &[SuspEntry]) -> bool {
    entries.iter().any(|e| {
        if e.signature == *b"RR" {
            return true;
        }
        if e.signature == *b"ER" {
            if let Ok(text) = std::str::from_utf8(&e.data) {
                return RR_EXTENSION_IDS.iter().any(|id| text.contains(id));
            }
        }
        false
    })
}

/// Chase "CE" continuation entries, resolving a single logical system-use
/// area as the concatenation of the original area plus every chained
/// continuation's bytes. `fetch` reads `length` bytes at `block * 2048 +
/// offset` from the volume.
pub fn resolve_with_continuations(
    initial: &[u8],
    mut fetch: impl FnMut(Continuation) -> Result<Vec<u8>>,
) -> Result<Vec<u8>> {
    let mut out = initial.to_vec();
    let mut entries = walk_entries(initial);
    loop {
        let ce = entries.iter().find(|e| e.signature == *b"CE");
        let Some(ce) = ce else { break };
        if ce.data.len() < 24 {
            return Err(Error::invalid_format("CE entry too short"));
        }
        let block = crate::endian::read_u32_le(&ce.data[0..4]);
        let offset = crate::endian::read_u32_le(&ce.data[8..12]);
        let length = crate::endian::read_u32_le(&ce.data[16..20]);
        let chunk = fetch(Continuation {
            block,
            offset,
            length,
        })?;
        entries = walk_entries(&chunk);
        out.extend_from_slice(&chunk);
        // Avoid an infinite loop on a self-referential or repeated CE chain:
        // only the entries parsed from the freshly fetched chunk are
        // considered for the next iteration, and a chunk with no further
        // CE entry terminates the walk.
        if !entries.iter().any(|e| e.signature == *b"CE") {
            break;
        }
    }
    Ok(out)
}

/// Rock Ridge "NM" (alternate name) entry, possibly split across several
/// TLV records with a continuation-bit flag in the first data byte.
pub fn decode_nm(entries: &[SuspEntry]) -> Option<String> {
    let mut name = Vec::new();
    let mut found = false;
    for e in entries.iter().filter(|e| e.signature == *b"NM") {
        if e.data.is_empty() {
            continue;
        }
        found = true;
        name.extend_from_slice(&e.data[1..]);
    }
    if found {
        String::from_utf8(name).ok()
    } else {
        None
    }
}

/// Rock Ridge "PX" (POSIX file attributes): mode, link count, uid, gid.
#[derive(Debug, Clone, Copy)]
pub struct PosixAttributes {
    pub mode: u32,
    pub links: u32,
    pub uid: u32,
    pub gid: u32,
}

pub fn decode_px(entry: &SuspEntry) -> Result<PosixAttributes> {
    if entry.data.len() < 32 {
        return Err(Error::invalid_format("PX entry too short"));
    }
    Ok(PosixAttributes {
        mode: crate::endian::read_u32_le(&entry.data[0..4]),
        links: crate::endian::read_u32_le(&entry.data[8..12]),
        uid: crate::endian::read_u32_le(&entry.data[16..20]),
        gid: crate::endian::read_u32_le(&entry.data[24..28]),
    })
}

/// Rock Ridge "SL" (symbolic link) entry: components are emitted in order,
/// with a small flag byte distinguishing literal text from `.`/`..`/root.
pub fn decode_sl(entry: &SuspEntry) -> Result<String> {
    if entry.data.len() < 1 {
        return Err(Error::invalid_format("SL entry too short"));
    }
    let mut parts = Vec::new();
    let mut pos = 1usize; // skip the SL-level flags byte
    while pos + 2 <= entry.data.len() {
        let flags = entry.data[pos];
        let len = entry.data[pos + 1] as usize;
        pos += 2;
        if flags & 0x02 != 0 {
            parts.push(".".to_string());
        } else if flags & 0x04 != 0 {
            parts.push("..".to_string());
        } else if flags & 0x08 != 0 {
            parts.push("/".to_string());
        } else {
            if pos + len > entry.data.len() {
                return Err(Error::invalid_format("SL component overruns entry"));
            }
            parts.push(String::from_utf8_lossy(&entry.data[pos..pos + len]).to_string());
            pos += len;
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_stops_on_short_entry() {
        let area = [b'N', b'M', 3, 1];
        let entries = walk_entries(&area);
        assert!(entries.is_empty());
    }

    #[test]
    fn walk_decodes_one_entry() {
        let mut area = vec![b'N', b'M', 6, 1, 1, b'x'];
        area.extend_from_slice(&[]);
        let entries = walk_entries(&area);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].signature, *b"NM");
    }

    #[test]
    fn nm_decode_concatenates_continuation_bit_payload() {
        let area = vec![b'N', b'M', 8, 1, 0, b'h', b'i', b'!'];
        let entries = walk_entries(&area);
        let name = decode_nm(&entries).unwrap();
        assert_eq!(name, "hi!");
    }

    #[test]
    fn rock_ridge_detected_via_er_identifier() {
        let mut data = Vec::new();
        data.extend_from_slice(&10u8.to_le_bytes()[0..1]); // len_id placeholder unused
        let text = "RRIP_1991A";
        let entry = SuspEntry {
            signature: *b"ER",
            data: text.as_bytes().to_vec(),
        };
        assert!(detect_rock_ridge(&[entry]));
        let _ = data;
    }
}
