//! File-identifier splitting, the reader/builder sort comparator, and the
//! builder-side name-normalization rules.

use crate::endian::is_d_char;
use crate::error::{Error, Result};
use std::cmp::Ordering;

/// A file identifier split at the first `.` (stem/ext boundary) and the
/// final `;` (version boundary), per §4.E's last paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitName {
    pub stem: String,
    pub ext: String,
    pub version: u32,
}

pub fn split_identifier(identifier: &str) -> SplitName {
    let (name_part, version) = match identifier.rfind(';') {
        Some(idx) => {
            let v = identifier[idx + 1..].parse().unwrap_or(1);
            (&identifier[..idx], v)
        }
        None => (identifier, 1),
    };
    match name_part.find('.') {
        Some(idx) => SplitName {
            stem: name_part[..idx].to_string(),
            ext: name_part[idx + 1..].to_string(),
            version,
        },
        None => SplitName {
            stem: name_part.to_string(),
            ext: String::new(),
            version,
        },
    }
}

/// Compare two identifiers the way the builder sorts directory entries and
/// the reader's round-trip property checks against: stem, then extension —
/// each right-padded with spaces to equal length and compared by ASCII
/// code point — then version compared **descending** (higher version
/// first), left-padded with `'0'` as digit strings.
pub fn compare_identifiers(a: &str, b: &str) -> Ordering {
    let sa = split_identifier(a);
    let sb = split_identifier(b);

    let stem_cmp = pad_compare(&sa.stem, &sb.stem);
    if stem_cmp != Ordering::Equal {
        return stem_cmp;
    }
    let ext_cmp = pad_compare(&sa.ext, &sb.ext);
    if ext_cmp != Ordering::Equal {
        return ext_cmp;
    }
    // Version descending.
    sb.version.cmp(&sa.version)
}

fn pad_compare(a: &str, b: &str) -> Ordering {
    let width = a.len().max(b.len());
    let pa = format!("{:<width$}", a, width = width);
    let pb = format!("{:<width$}", b, width = width);
    pa.cmp(&pb)
}

/// Builder-side normalization (§4.F): uppercase, invalid d-characters
/// become `_`, `stem + "." + ext` truncated to ≤ 30 characters (extension
/// truncated to 3 first if the combined length still exceeds 30), version
/// defaults to 1.
pub fn normalize_file_identifier(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let (name_part, version) = match upper.rfind(';') {
        Some(idx) => (&upper[..idx], upper[idx + 1..].parse().unwrap_or(1)),
        None => (upper.as_str(), 1u32),
    };
    let (mut stem, mut ext) = match name_part.find('.') {
        Some(idx) => (name_part[..idx].to_string(), name_part[idx + 1..].to_string()),
        None => (name_part.to_string(), String::new()),
    };
    stem = sanitize_d_chars(&stem);
    ext = sanitize_d_chars(&ext);

    if !ext.is_empty() && ext.len() > 3 {
        ext.truncate(3);
    }
    while stem.len() + 1 + ext.len() > 30 && !stem.is_empty() {
        stem.pop();
    }

    if ext.is_empty() {
        format!("{stem};{version}")
    } else {
        format!("{stem}.{ext};{version}")
    }
}

fn sanitize_d_chars(s: &str) -> String {
    s.chars()
        .map(|c| if is_d_char(c) { c } else { '_' })
        .collect()
}

pub fn validate_volume_identifier(id: &str) -> Result<()> {
    if id.chars().count() > 32 {
        return Err(Error::invalid_encoding("volume identifier exceeds 32 characters"));
    }
    crate::endian::validate_d_chars(id)
}

pub fn validate_file_identifier(id: &str) -> Result<()> {
    let allowed = id.chars().all(|c| is_d_char(c) || c == '.' || c == ';');
    if !allowed {
        return Err(Error::invalid_encoding(format!(
            "'{id}' contains characters outside d-chars/./;"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_stem_ext_version() {
        let split = split_identifier("HELLO.TXT;2");
        assert_eq!(split.stem, "HELLO");
        assert_eq!(split.ext, "TXT");
        assert_eq!(split.version, 2);
    }

    #[test]
    fn sort_order_from_spec_example() {
        let mut names = vec!["B.TXT;1", "A.TXT;2", "A.TXT;1"];
        names.sort_by(|a, b| compare_identifiers(a, b));
        assert_eq!(names, vec!["A.TXT;2", "A.TXT;1", "B.TXT;1"]);
    }

    #[test]
    fn normalize_replaces_invalid_chars_and_truncates() {
        let normalized = normalize_file_identifier("hello world.longextension");
        assert!(normalized.starts_with("HELLO_WORLD"));
        assert!(normalized.contains(";1"));
    }

    #[test]
    fn validate_file_identifier_rejects_invalid_chars() {
        assert!(validate_file_identifier("HELLO.TXT;1").is_ok());
        assert!(validate_file_identifier("hello.txt").is_err());
    }
}
