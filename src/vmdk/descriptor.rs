//! VMDK descriptor file parsing and emission.
//!
//! Handles the text key/value descriptor that accompanies every VMDK disk
//! (embedded in the hosted-sparse extent's header region, or standalone next
//! to a flat/vmfs extent), plus the logic for locating that text wherever it
//! lives.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::header::{HostedSparseHeader, VMDK_MAGIC};

/// Guard against reading an unreasonably large standalone descriptor file.
const MAX_STANDALONE_DESCRIPTOR_BYTES: u64 = 20 * 1024;

/// The type of a VMDK extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentType {
    /// Flat extent - raw disk data in a separate file.
    Flat,
    /// Sparse extent - uses grain tables for allocation.
    Sparse,
    /// Zero extent - represents zeroed data without storage.
    Zero,
    /// VMFS extent - VMware VMFS filesystem.
    Vmfs,
    /// VMFS sparse extent ("COWD").
    VmfsSparse,
    /// VMFS raw device mapping.
    VmfsRdm,
    /// VMFS raw extent.
    VmfsRaw,
    /// ESXi SE-sparse extent. Recognized so a descriptor parses, but has no
    /// implemented read path.
    SeSparse,
    /// vSAN sparse extent. Same status as `SeSparse`.
    VsanSparse,
}

impl ExtentType {
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "FLAT" => Ok(ExtentType::Flat),
            "SPARSE" => Ok(ExtentType::Sparse),
            "ZERO" => Ok(ExtentType::Zero),
            "VMFS" => Ok(ExtentType::Vmfs),
            "VMFSSPARSE" => Ok(ExtentType::VmfsSparse),
            "VMFSRDM" => Ok(ExtentType::VmfsRdm),
            "VMFSRAW" => Ok(ExtentType::VmfsRaw),
            "SESPARSE" => Ok(ExtentType::SeSparse),
            "VSANSPARSE" => Ok(ExtentType::VsanSparse),
            _ => Err(Error::invalid_format(format!("unknown extent type: {s}"))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ExtentType::Flat => "FLAT",
            ExtentType::Sparse => "SPARSE",
            ExtentType::Zero => "ZERO",
            ExtentType::Vmfs => "VMFS",
            ExtentType::VmfsSparse => "VMFSSPARSE",
            ExtentType::VmfsRdm => "VMFSRDM",
            ExtentType::VmfsRaw => "VMFSRAW",
            ExtentType::SeSparse => "SESPARSE",
            ExtentType::VsanSparse => "VSANSPARSE",
        }
    }
}

/// The `createType` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateType {
    MonolithicSparse,
    VmfsSparse,
    MonolithicFlat,
    Vmfs,
    TwoGbMaxExtentSparse,
    TwoGbMaxExtentFlat,
    FullDevice,
    VmfsRaw,
    PartitionedDevice,
    VmfsRawDeviceMap,
    VmfsPassthroughRawDeviceMap,
    StreamOptimized,
    SeSparse,
    VsanSparse,
}

impl CreateType {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "monolithicSparse" => Ok(Self::MonolithicSparse),
            "vmfsSparse" => Ok(Self::VmfsSparse),
            "monolithicFlat" => Ok(Self::MonolithicFlat),
            "vmfs" => Ok(Self::Vmfs),
            "twoGbMaxExtentSparse" => Ok(Self::TwoGbMaxExtentSparse),
            "twoGbMaxExtentFlat" => Ok(Self::TwoGbMaxExtentFlat),
            "fullDevice" => Ok(Self::FullDevice),
            "vmfsRaw" => Ok(Self::VmfsRaw),
            "partitionedDevice" => Ok(Self::PartitionedDevice),
            "vmfsRawDeviceMap" => Ok(Self::VmfsRawDeviceMap),
            "vmfsPassthroughRawDeviceMap" => Ok(Self::VmfsPassthroughRawDeviceMap),
            "streamOptimized" => Ok(Self::StreamOptimized),
            "seSparse" => Ok(Self::SeSparse),
            "vsanSparse" => Ok(Self::VsanSparse),
            other => Err(Error::invalid_format(format!("unknown createType: {other}"))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::MonolithicSparse => "monolithicSparse",
            Self::VmfsSparse => "vmfsSparse",
            Self::MonolithicFlat => "monolithicFlat",
            Self::Vmfs => "vmfs",
            Self::TwoGbMaxExtentSparse => "twoGbMaxExtentSparse",
            Self::TwoGbMaxExtentFlat => "twoGbMaxExtentFlat",
            Self::FullDevice => "fullDevice",
            Self::VmfsRaw => "vmfsRaw",
            Self::PartitionedDevice => "partitionedDevice",
            Self::VmfsRawDeviceMap => "vmfsRawDeviceMap",
            Self::VmfsPassthroughRawDeviceMap => "vmfsPassthroughRawDeviceMap",
            Self::StreamOptimized => "streamOptimized",
            Self::SeSparse => "seSparse",
            Self::VsanSparse => "vsanSparse",
        }
    }
}

/// The `ddb.adapterType` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterType {
    Ide,
    BusLogic,
    LsiLogic,
    LegacyEsx,
}

impl AdapterType {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ide" => Ok(Self::Ide),
            "buslogic" => Ok(Self::BusLogic),
            "lsilogic" => Ok(Self::LsiLogic),
            "legacyESX" => Ok(Self::LegacyEsx),
            other => Err(Error::invalid_format(format!("unknown adapter type: {other}"))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Ide => "ide",
            Self::BusLogic => "buslogic",
            Self::LsiLogic => "lsilogic",
            Self::LegacyEsx => "legacyESX",
        }
    }
}

/// A VMDK extent entry describing a portion of the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    /// Access mode (e.g., "RW" for read-write, "RDONLY" for read-only).
    pub access: String,
    /// Size of this extent in 512-byte sectors.
    pub size_sectors: u64,
    /// Type of the extent.
    pub extent_type: ExtentType,
    /// Filename of the extent file.
    pub filename: String,
    /// Offset within the extent file (in sectors).
    pub offset: u64,
}

/// Parsed VMDK descriptor containing disk metadata.
#[derive(Debug, Clone)]
pub struct VmdkDescriptor {
    /// Descriptor format version.
    pub version: u32,
    /// Content ID for change tracking.
    pub cid: u32,
    /// Parent content ID for delta disks. `0xFFFFFFFF` means "no parent".
    pub parent_cid: u32,
    /// Relative locator to the parent descriptor, when `parent_cid` is set.
    pub parent_file_name_hint: Option<String>,
    /// The type of VMDK (e.g., `MonolithicFlat`, `TwoGbMaxExtentSparse`).
    pub create_type: Option<CreateType>,
    /// List of extent entries.
    pub extents: Vec<Extent>,
    /// Disk geometry: cylinders.
    pub cylinders: u64,
    /// Disk geometry: heads.
    pub heads: u32,
    /// Disk geometry: sectors per track.
    pub sectors: u32,
    /// Virtual hardware version.
    pub hw_version: String,
    /// Disk adapter type.
    pub adapter_type: Option<AdapterType>,
    /// `ddb.uuid.image`, kept as its raw dash/space-separated hex string.
    pub uuid: Option<String>,
}

impl VmdkDescriptor {
    /// Calculate the total disk size in bytes.
    pub fn disk_size_bytes(&self) -> u64 {
        self.disk_size_sectors() * 512
    }

    /// Calculate the total disk size in sectors.
    pub fn disk_size_sectors(&self) -> u64 {
        self.extents.iter().map(|e| e.size_sectors).sum()
    }

    pub fn has_parent(&self) -> bool {
        self.parent_cid != 0xFFFF_FFFF
    }
}

/// Locate and read a descriptor's text content, whether embedded in a
/// hosted-sparse extent's header region or standing alone as a plain text
/// file (per §4.I's descriptor-acquisition algorithm).
pub fn acquire_descriptor(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(e, path))?;
    let mut sector = [0u8; 512];
    let n = file.read(&mut sector).map_err(|e| Error::io(e, path))?;

    if n >= 4 && crate::endian::read_u32_le(&sector[0..4]) == VMDK_MAGIC {
        let mut header_bytes = sector.to_vec();
        if n < 512 {
            header_bytes.resize(512, 0);
        }
        let header = HostedSparseHeader::from_bytes(&header_bytes)?;
        if header.descriptor_offset == 0 {
            return Err(Error::invalid_format(
                "hosted sparse extent has no embedded descriptor",
            ));
        }
        let offset = header.descriptor_offset * super::header::SECTOR_SIZE;
        let size = header.descriptor_size * super::header::SECTOR_SIZE;
        let mut buf = vec![0u8; size as usize];
        file.seek(SeekFrom::Start(offset)).map_err(|e| Error::io(e, path))?;
        file.read_exact(&mut buf).map_err(|e| Error::io(e, path))?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8(buf[..end].to_vec())
            .map_err(|e| Error::invalid_encoding(format!("embedded descriptor is not UTF-8: {e}")))
    } else {
        let len = std::fs::metadata(path).map_err(|e| Error::io(e, path))?.len();
        if len > MAX_STANDALONE_DESCRIPTOR_BYTES {
            return Err(Error::invalid_format(format!(
                "standalone descriptor {} exceeds {} byte guard",
                path.display(),
                MAX_STANDALONE_DESCRIPTOR_BYTES
            )));
        }
        std::fs::read_to_string(path).map_err(|e| Error::io(e, path))
    }
}

/// Parse a VMDK descriptor from its text content.
pub fn parse_descriptor(content: &str) -> Result<VmdkDescriptor> {
    let mut version = 1;
    let mut cid = 0u32;
    let mut parent_cid = 0xffffffffu32;
    let mut parent_file_name_hint = None;
    let mut create_type = None;
    let mut extents = Vec::new();
    let mut cylinders = 0u64;
    let mut heads = 0u32;
    let mut sectors = 0u32;
    let mut hw_version = String::new();
    let mut adapter_type = None;
    let mut uuid = None;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with("RW ") || line.starts_with("RDONLY ") || line.starts_with("NOACCESS ") {
            extents.push(parse_extent_line(line)?);
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            match key.as_str() {
                "version" => {
                    version = value
                        .parse()
                        .map_err(|_| Error::invalid_format(format!("invalid version: {value}")))?;
                }
                "CID" => {
                    cid = u32::from_str_radix(&value, 16)
                        .map_err(|_| Error::invalid_format(format!("invalid CID: {value}")))?;
                }
                "parentCID" => {
                    parent_cid = u32::from_str_radix(&value, 16)
                        .map_err(|_| Error::invalid_format(format!("invalid parentCID: {value}")))?;
                }
                "parentFileNameHint" => {
                    parent_file_name_hint = Some(value);
                }
                "createType" => {
                    create_type = Some(CreateType::from_str(&value)?);
                }
                "ddb.virtualHWVersion" => {
                    hw_version = value;
                }
                "ddb.geometry.cylinders" => {
                    cylinders = value
                        .parse()
                        .map_err(|_| Error::invalid_format(format!("invalid cylinders: {value}")))?;
                }
                "ddb.geometry.heads" => {
                    heads = value
                        .parse()
                        .map_err(|_| Error::invalid_format(format!("invalid heads: {value}")))?;
                }
                "ddb.geometry.sectors" => {
                    sectors = value
                        .parse()
                        .map_err(|_| Error::invalid_format(format!("invalid sectors: {value}")))?;
                }
                "ddb.adapterType" => {
                    adapter_type = Some(AdapterType::from_str(&value)?);
                }
                "ddb.uuid.image" => {
                    uuid = Some(value);
                }
                _ => {}
            }
        }
    }

    Ok(VmdkDescriptor {
        version,
        cid,
        parent_cid,
        parent_file_name_hint,
        create_type,
        extents,
        cylinders,
        heads,
        sectors,
        hw_version,
        adapter_type,
        uuid,
    })
}

/// Emit a descriptor back to its canonical textual form. Round-tripping
/// through `parse_descriptor` again reaches a fixed point.
pub fn format_descriptor(d: &VmdkDescriptor) -> String {
    let mut out = String::new();
    out.push_str("# Disk DescriptorFile\n");
    out.push_str(&format!("version={}\n", d.version));
    out.push_str(&format!("CID={:x}\n", d.cid));
    out.push_str(&format!("parentCID={:x}\n", d.parent_cid));
    if let Some(hint) = &d.parent_file_name_hint {
        out.push_str(&format!("parentFileNameHint=\"{hint}\"\n"));
    }
    if let Some(ct) = d.create_type {
        out.push_str(&format!("createType=\"{}\"\n", ct.as_str()));
    }
    out.push_str("\n# Extent description\n");
    for e in &d.extents {
        out.push_str(&format!(
            "{} {} {} \"{}\" {}\n",
            e.access,
            e.size_sectors,
            e.extent_type.as_str(),
            e.filename,
            e.offset
        ));
    }
    out.push_str("\n# The Disk Data Base\n#DDB\n");
    if !d.hw_version.is_empty() {
        out.push_str(&format!("ddb.virtualHWVersion = \"{}\"\n", d.hw_version));
    }
    if let Some(adapter) = d.adapter_type {
        out.push_str(&format!("ddb.adapterType = \"{}\"\n", adapter.as_str()));
    }
    out.push_str(&format!("ddb.geometry.cylinders = \"{}\"\n", d.cylinders));
    out.push_str(&format!("ddb.geometry.heads = \"{}\"\n", d.heads));
    out.push_str(&format!("ddb.geometry.sectors = \"{}\"\n", d.sectors));
    if let Some(uuid) = &d.uuid {
        out.push_str(&format!("ddb.uuid.image = \"{uuid}\"\n"));
    }
    out
}

/// Parse a key=value or key = value line.
fn parse_key_value(line: &str) -> Option<(String, String)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim().to_string();
    let mut value = line[eq_pos + 1..].trim().to_string();

    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        value = value[1..value.len() - 1].to_string();
    }

    Some((key, value))
}

/// Parse an extent line like: `RW 838860800 FLAT "TestVM-flat.vmdk" 0`
fn parse_extent_line(line: &str) -> Result<Extent> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(Error::invalid_format(format!("invalid extent line: {line}")));
    }

    let access = parts[0].to_string();
    let size_sectors: u64 = parts[1]
        .parse()
        .map_err(|_| Error::invalid_format(format!("invalid extent size: {}", parts[1])))?;
    let extent_type = ExtentType::from_str(parts[2])?;

    let rest_of_line = line.split_whitespace().skip(3).collect::<Vec<&str>>().join(" ");
    let (filename, offset_str) = parse_quoted_filename_and_offset(&rest_of_line)?;

    let offset: u64 = if offset_str.is_empty() {
        0
    } else {
        offset_str
            .parse()
            .map_err(|_| Error::invalid_format(format!("invalid extent offset: {offset_str}")))?
    };

    Ok(Extent {
        access,
        size_sectors,
        extent_type,
        filename,
        offset,
    })
}

/// Parse a quoted filename followed by an offset from a string like: `"filename.vmdk" 0`
fn parse_quoted_filename_and_offset(s: &str) -> Result<(String, String)> {
    let s = s.trim();

    if !s.starts_with('"') {
        return Err(Error::invalid_format(format!("expected quoted filename, got: {s}")));
    }

    let end_quote = s[1..]
        .find('"')
        .ok_or_else(|| Error::invalid_format(format!("unclosed quote in: {s}")))?
        + 1;

    let filename = s[1..end_quote].to_string();
    let offset_str = s[end_quote + 1..].trim().to_string();

    Ok((filename, offset_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_type_from_str() {
        assert_eq!(ExtentType::from_str("FLAT").unwrap(), ExtentType::Flat);
        assert_eq!(ExtentType::from_str("flat").unwrap(), ExtentType::Flat);
        assert_eq!(ExtentType::from_str("SESPARSE").unwrap(), ExtentType::SeSparse);
        assert_eq!(ExtentType::from_str("VSANSPARSE").unwrap(), ExtentType::VsanSparse);
    }

    #[test]
    fn test_extent_type_unknown() {
        assert!(ExtentType::from_str("UNKNOWN").is_err());
    }

    #[test]
    fn test_create_type_round_trip() {
        let ct = CreateType::from_str("twoGbMaxExtentSparse").unwrap();
        assert_eq!(ct.as_str(), "twoGbMaxExtentSparse");
    }

    #[test]
    fn test_parse_key_value_no_spaces() {
        let (key, value) = parse_key_value("version=1").unwrap();
        assert_eq!(key, "version");
        assert_eq!(value, "1");
    }

    #[test]
    fn test_parse_key_value_with_spaces() {
        let (key, value) = parse_key_value("ddb.geometry.cylinders = \"52216\"").unwrap();
        assert_eq!(key, "ddb.geometry.cylinders");
        assert_eq!(value, "52216");
    }

    #[test]
    fn test_parse_extent_line() {
        let extent = parse_extent_line("RW 838860800 FLAT \"TestVM-flat.vmdk\" 0").unwrap();
        assert_eq!(extent.access, "RW");
        assert_eq!(extent.size_sectors, 838860800);
        assert_eq!(extent.extent_type, ExtentType::Flat);
        assert_eq!(extent.filename, "TestVM-flat.vmdk");
        assert_eq!(extent.offset, 0);
    }

    #[test]
    fn test_parse_quoted_filename_with_spaces() {
        let (filename, offset) =
            parse_quoted_filename_and_offset("\"my disk file.vmdk\" 128").unwrap();
        assert_eq!(filename, "my disk file.vmdk");
        assert_eq!(offset, "128");
    }

    #[test]
    fn test_disk_size_calculations() {
        let descriptor = VmdkDescriptor {
            version: 1,
            cid: 0,
            parent_cid: 0xffffffff,
            parent_file_name_hint: None,
            create_type: Some(CreateType::MonolithicFlat),
            extents: vec![
                Extent {
                    access: "RW".to_string(),
                    size_sectors: 1000,
                    extent_type: ExtentType::Flat,
                    filename: "a.vmdk".to_string(),
                    offset: 0,
                },
                Extent {
                    access: "RW".to_string(),
                    size_sectors: 2000,
                    extent_type: ExtentType::Flat,
                    filename: "b.vmdk".to_string(),
                    offset: 0,
                },
            ],
            cylinders: 0,
            heads: 0,
            sectors: 0,
            hw_version: String::new(),
            adapter_type: None,
            uuid: None,
        };

        assert_eq!(descriptor.disk_size_sectors(), 3000);
        assert_eq!(descriptor.disk_size_bytes(), 3000 * 512);
        assert!(!descriptor.has_parent());
    }

    #[test]
    fn parse_emit_parse_is_a_fixed_point() {
        let text = "version=1\nCID=abc123\nparentCID=ffffffff\ncreateType=\"monolithicFlat\"\n\nRW 2048 FLAT \"disk-flat.vmdk\" 0\n\nddb.adapterType = \"lsilogic\"\nddb.geometry.cylinders = \"10\"\nddb.geometry.heads = \"16\"\nddb.geometry.sectors = \"63\"\n";
        let first = parse_descriptor(text).unwrap();
        let emitted = format_descriptor(&first);
        let second = parse_descriptor(&emitted).unwrap();
        assert_eq!(first.cid, second.cid);
        assert_eq!(first.create_type, second.create_type);
        assert_eq!(first.extents, second.extents);
        assert_eq!(first.adapter_type, second.adapter_type);
        assert_eq!(first.cylinders, second.cylinders);
    }
}
