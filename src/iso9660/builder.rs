//! Single forward-pass ISO-9660 builder: lays out file data, primary and
//! (optionally) Joliet supplementary directory trees, four path tables,
//! and the fixed-position volume descriptors, registering one
//! [`BuilderExtent`] per region through a [`crate::builder::BuilderExtentSink`]
//! rather than materializing the whole image in one buffer, then packages
//! the result as one [`BuiltStream`].
//!
//! Name-collision handling (the "make unique" step left undefined by the
//! original system, per the Open Question this rewrite resolves): a file
//! whose normalized identifier collides with an earlier sibling has its
//! version field bumped until it is unique within that directory.
//!
//! File data is deduplicated by byte-array equality: two files added with
//! identical content share one extent and one LBA, per the "equal source
//! files reuse the earlier sector" rule.

use std::collections::{HashMap, HashSet};

use super::directory_record::{encode_record, DirectoryRecord, RecordFlags};
use super::names::{compare_identifiers, normalize_file_identifier, split_identifier, validate_volume_identifier};
use super::path_table::{encode_entry, Endianness, PathTableEntry};
use super::volume_descriptor::{encode_set_terminator, encode_standard_descriptor, StandardDescriptor, VolumeDescriptorType};
use super::SECTOR_SIZE;
use crate::builder::{BuilderExtent, BuilderExtentSink, StreamBuilder};
use crate::endian::IsoDateTime;
use crate::error::{Error, Result};
use crate::stream::built::BuiltStream;

pub struct BuildOptions {
    pub volume_identifier: String,
    pub joliet: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            volume_identifier: "VDISK".to_string(),
            joliet: false,
        }
    }
}

struct FileNode {
    raw_name: String,
    normalized_name: String,
    data: Vec<u8>,
    /// `data.len()`, kept separately so directory-record encoding still has
    /// it after `data` is moved out into a [`RawDataExtent`].
    data_len: u32,
    lba: u32,
}

struct DirNode {
    raw_name: String,
    normalized_name: String,
    children: Vec<Entry>,
    primary_lba: u32,
    primary_len: u32,
    supp_lba: u32,
    supp_len: u32,
}

enum Entry {
    File(FileNode),
    Dir(DirNode),
}

impl DirNode {
    fn root() -> Self {
        Self {
            raw_name: String::new(),
            normalized_name: String::new(),
            children: Vec::new(),
            primary_lba: 0,
            primary_len: 0,
            supp_lba: 0,
            supp_len: 0,
        }
    }
}

fn normalize_dir_name(raw: &str) -> String {
    let mut name: String = raw
        .to_uppercase()
        .chars()
        .map(|c| if crate::endian::is_d_char(c) { c } else { '_' })
        .collect();
    name.truncate(30);
    if name.is_empty() {
        name.push('_');
    }
    name
}

pub struct IsoBuilder {
    options: BuildOptions,
    root: DirNode,
}

impl IsoBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            root: DirNode::root(),
        }
    }

    /// Add a file at `path` (`/`-separated, directories created as
    /// needed).
    pub fn add_file(&mut self, path: &str, data: Vec<u8>) -> Result<()> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Err(Error::invalid_format("empty file path"));
        }
        let mut dir = &mut self.root;
        for component in &components[..components.len() - 1] {
            let idx = dir.children.iter().position(|e| matches!(e, Entry::Dir(d) if d.raw_name == *component));
            let idx = match idx {
                Some(i) => i,
                None => {
                    dir.children.push(Entry::Dir(DirNode {
                        raw_name: component.to_string(),
                        normalized_name: normalize_dir_name(component),
                        children: Vec::new(),
                        primary_lba: 0,
                        primary_len: 0,
                        supp_lba: 0,
                        supp_len: 0,
                    }));
                    dir.children.len() - 1
                }
            };
            dir = match &mut dir.children[idx] {
                Entry::Dir(d) => d,
                Entry::File(_) => {
                    return Err(Error::invalid_format(format!(
                        "'{component}' is a file, not a directory"
                    )))
                }
            };
        }
        let file_name = components[components.len() - 1];
        let mut normalized = normalize_file_identifier(file_name);
        dedup_sibling_name(&dir.children, &mut normalized);
        let data_len = data.len() as u32;
        dir.children.push(Entry::File(FileNode {
            raw_name: file_name.to_string(),
            normalized_name: normalized,
            data,
            data_len,
            lba: 0,
        }));
        Ok(())
    }

    pub fn build(mut self) -> Result<BuiltStream> {
        validate_volume_identifier(&self.options.volume_identifier)?;
        let mut sb = StreamBuilder::new();
        let total_len = sb.fix_extents(Box::new(move |sink| self.layout_and_emit(sink)))?;
        Ok(sb.build(total_len))
    }

    /// The forward-pass layout: assign every region's LBA, then register
    /// its bytes as one extent through `sink`. Runs as the builder's single
    /// [`crate::builder::FixExtents`] pass, since path tables and volume
    /// descriptors need the final positions of everything laid out first.
    fn layout_and_emit(&mut self, sink: &mut dyn BuilderExtentSink) -> Result<u64> {
        let joliet = self.options.joliet;

        let vd_count: u64 = 1 + if joliet { 1 } else { 0 } + 1;
        let mut cursor = super::VOLUME_DESCRIPTOR_AREA_START + vd_count * SECTOR_SIZE;

        let mut content_index: HashMap<Vec<u8>, u32> = HashMap::new();
        assign_file_lbas(&mut self.root, &mut cursor, &mut content_index);

        assign_dir_lbas_bfs(&mut self.root, &mut cursor, false);
        if joliet {
            assign_dir_lbas_bfs(&mut self.root, &mut cursor, true);
        }

        // Path tables: L primary, M primary, [L supp, M supp].
        let primary_entries = flatten_path_table(&self.root, false);
        let (l_primary, l_primary_lba) = place_path_table(&primary_entries, Endianness::Little, &mut cursor);
        let (m_primary, m_primary_lba) = place_path_table(&primary_entries, Endianness::Big, &mut cursor);
        let (l_supp, l_supp_lba, m_supp, m_supp_lba) = if joliet {
            let supp_entries = flatten_path_table(&self.root, true);
            let (l, llba) = place_path_table(&supp_entries, Endianness::Little, &mut cursor);
            let (m, mlba) = place_path_table(&supp_entries, Endianness::Big, &mut cursor);
            (l, llba, m, mlba)
        } else {
            (Vec::new(), 0, Vec::new(), 0)
        };

        let total_len = cursor;
        let total_sectors = (total_len / SECTOR_SIZE) as u32;

        let mut emitted_file_lbas: HashSet<u32> = HashSet::new();
        emit_file_extents(&mut self.root, &mut emitted_file_lbas, sink);
        emit_dir_content_extents(&self.root, &self.root, sink, false);
        if joliet {
            emit_dir_content_extents(&self.root, &self.root, sink, true);
        }
        sink.add_extent(Box::new(RawDataExtent::new(l_primary_lba, l_primary)));
        sink.add_extent(Box::new(RawDataExtent::new(m_primary_lba, m_primary)));
        if joliet {
            sink.add_extent(Box::new(RawDataExtent::new(l_supp_lba, l_supp)));
            sink.add_extent(Box::new(RawDataExtent::new(m_supp_lba, m_supp)));
        }

        let primary_desc = StandardDescriptor {
            system_identifier: String::new(),
            volume_identifier: self.options.volume_identifier.clone(),
            volume_space_size: total_sectors,
            logical_block_size: SECTOR_SIZE as u16,
            path_table_size: (primary_entries_len(&primary_entries)) as u32,
            type_l_path_table: l_primary_lba,
            type_m_path_table: m_primary_lba,
            root_directory_record: encode_record(&DirectoryRecord {
                extent_lba: self.root.primary_lba,
                data_length: self.root.primary_len,
                recording_time: IsoDateTime::UNSET,
                flags: RecordFlags::DIRECTORY,
                file_unit_size: 0,
                interleave_gap_size: 0,
                volume_sequence_number: 1,
                identifier: vec![0u8],
                system_use: Vec::new(),
            }),
            volume_set_identifier: String::new(),
            publisher_identifier: String::new(),
            preparer_identifier: String::new(),
            application_identifier: String::new(),
            creation_date: IsoDateTime::UNSET,
            modification_date: IsoDateTime::UNSET,
            file_structure_version: 1,
            escape_sequence: None,
        };
        let pvd = encode_standard_descriptor(VolumeDescriptorType::Primary, &primary_desc, false);
        sink.add_extent(Box::new(RawDataExtent::new(16, pvd)));

        if joliet {
            let supp_desc = StandardDescriptor {
                path_table_size: primary_entries_len(&flatten_path_table(&self.root, true)) as u32,
                type_l_path_table: l_supp_lba,
                type_m_path_table: m_supp_lba,
                root_directory_record: encode_record(&DirectoryRecord {
                    extent_lba: self.root.supp_lba,
                    data_length: self.root.supp_len,
                    recording_time: IsoDateTime::UNSET,
                    flags: RecordFlags::DIRECTORY,
                    file_unit_size: 0,
                    interleave_gap_size: 0,
                    volume_sequence_number: 1,
                    identifier: vec![0u8],
                    system_use: Vec::new(),
                }),
                escape_sequence: Some(super::volume_descriptor::JOLIET_ESCAPE_LEVEL3),
                ..clone_standard_descriptor_shell(&primary_desc)
            };
            let svd = encode_standard_descriptor(VolumeDescriptorType::Supplementary, &supp_desc, true);
            sink.add_extent(Box::new(RawDataExtent::new(17, svd)));
        }

        let terminator = encode_set_terminator();
        sink.add_extent(Box::new(RawDataExtent::new((vd_count - 1 + 16) as u32, terminator)));

        Ok(total_len)
    }
}

fn clone_standard_descriptor_shell(src: &StandardDescriptor) -> StandardDescriptor {
    StandardDescriptor {
        system_identifier: src.system_identifier.clone(),
        volume_identifier: src.volume_identifier.clone(),
        volume_space_size: src.volume_space_size,
        logical_block_size: src.logical_block_size,
        path_table_size: src.path_table_size,
        type_l_path_table: src.type_l_path_table,
        type_m_path_table: src.type_m_path_table,
        root_directory_record: src.root_directory_record.clone(),
        volume_set_identifier: src.volume_set_identifier.clone(),
        publisher_identifier: src.publisher_identifier.clone(),
        preparer_identifier: src.preparer_identifier.clone(),
        application_identifier: src.application_identifier.clone(),
        creation_date: src.creation_date,
        modification_date: src.modification_date,
        file_structure_version: src.file_structure_version,
        escape_sequence: src.escape_sequence,
    }
}

fn dedup_sibling_name(children: &[Entry], normalized: &mut String) {
    loop {
        let collision = children.iter().any(|e| match e {
            Entry::File(f) => f.normalized_name == *normalized,
            Entry::Dir(d) => d.normalized_name == *normalized,
        });
        if !collision {
            return;
        }
        let split = split_identifier(normalized);
        let bumped = split.version + 1;
        *normalized = if split.ext.is_empty() {
            format!("{};{}", split.stem, bumped)
        } else {
            format!("{}.{};{}", split.stem, split.ext, bumped)
        };
    }
}

fn round_up_sector(len: u64) -> u64 {
    ((len + SECTOR_SIZE - 1) / SECTOR_SIZE) * SECTOR_SIZE
}

/// Assigns each file an LBA, reusing an earlier file's LBA (and sector)
/// when its content is byte-for-byte identical instead of placing a new
/// copy — the "equal source files reuse the earlier sector" rule.
fn assign_file_lbas(dir: &mut DirNode, cursor: &mut u64, content_index: &mut HashMap<Vec<u8>, u32>) {
    for entry in &mut dir.children {
        match entry {
            Entry::File(f) => {
                if let Some(&existing_lba) = content_index.get(&f.data) {
                    f.lba = existing_lba;
                } else {
                    f.lba = (*cursor / SECTOR_SIZE) as u32;
                    *cursor += round_up_sector(f.data.len() as u64).max(SECTOR_SIZE);
                    content_index.insert(f.data.clone(), f.lba);
                }
            }
            Entry::Dir(d) => assign_file_lbas(d, cursor, content_index),
        }
    }
}

fn compute_dir_content_len(dir: &DirNode, joliet: bool) -> u32 {
    // Self + parent records are always 34 bytes (identifier length 1, even).
    let mut len: u64 = 34 + 34;
    let mut sector_pos = len % SECTOR_SIZE;
    for entry in &dir.children {
        let name_bytes = child_identifier_bytes(entry, joliet);
        let rec_len = record_len_for_name(name_bytes.len());
        if sector_pos + rec_len > SECTOR_SIZE {
            len += SECTOR_SIZE - sector_pos;
            sector_pos = 0;
        }
        len += rec_len;
        sector_pos += rec_len;
    }
    round_up_sector(len) as u32
}

fn record_len_for_name(name_len: usize) -> u64 {
    let padded = name_len % 2 == 0;
    (33 + name_len + if padded { 1 } else { 0}) as u64
}

fn child_identifier_bytes(entry: &Entry, joliet: bool) -> Vec<u8> {
    let name = match entry {
        Entry::File(f) => {
            if joliet {
                &f.raw_name
            } else {
                &f.normalized_name
            }
        }
        Entry::Dir(d) => {
            if joliet {
                &d.raw_name
            } else {
                &d.normalized_name
            }
        }
    };
    if joliet {
        crate::endian::write_utf16be(name, name.encode_utf16().count() * 2)
    } else {
        name.as_bytes().to_vec()
    }
}

fn assign_dir_lbas_bfs(root: &mut DirNode, cursor: &mut u64, joliet: bool) {
    let mut level = vec![root];
    while !level.is_empty() {
        let mut next_level: Vec<&mut DirNode> = Vec::new();
        for dir in level {
            let content_len = compute_dir_content_len(dir, joliet);
            if joliet {
                dir.supp_lba = (*cursor / SECTOR_SIZE) as u32;
                dir.supp_len = content_len;
            } else {
                dir.primary_lba = (*cursor / SECTOR_SIZE) as u32;
                dir.primary_len = content_len;
            }
            *cursor += content_len as u64;
            for entry in &mut dir.children {
                if let Entry::Dir(child) = entry {
                    next_level.push(child);
                }
            }
        }
        level = next_level;
    }
}

fn flatten_path_table(root: &DirNode, joliet: bool) -> Vec<PathTableEntry> {
    // BFS producing (name, extent_lba, parent_directory_index) in the same
    // order LBAs were assigned; parent index is 1-based into this vector.
    let mut entries = Vec::new();
    let root_name: Vec<u8> = vec![0u8];
    entries.push(PathTableEntry {
        extent_lba: if joliet { root.supp_lba } else { root.primary_lba },
        parent_directory_index: 1,
        name: root_name,
    });
    let mut queue: Vec<(usize, &DirNode)> = vec![(1, root)];
    let mut i = 0;
    while i < queue.len() {
        let (parent_index, dir) = queue[i];
        i += 1;
        for entry in &dir.children {
            if let Entry::Dir(child) = entry {
                let name = if joliet {
                    crate::endian::write_utf16be(&child.raw_name, child.raw_name.encode_utf16().count() * 2)
                } else {
                    child.normalized_name.as_bytes().to_vec()
                };
                entries.push(PathTableEntry {
                    extent_lba: if joliet { child.supp_lba } else { child.primary_lba },
                    parent_directory_index: parent_index as u16,
                    name,
                });
                queue.push((entries.len(), child));
            }
        }
    }
    entries
}

fn primary_entries_len(entries: &[PathTableEntry]) -> usize {
    entries
        .iter()
        .map(|e| {
            let padded = e.name.len() % 2 != 0;
            8 + e.name.len() + if padded { 1 } else { 0 }
        })
        .sum()
}

fn place_path_table(entries: &[PathTableEntry], endian: Endianness, cursor: &mut u64) -> (Vec<u8>, u32) {
    let mut bytes = Vec::new();
    for e in entries {
        bytes.extend(encode_entry(e, endian));
    }
    let lba = (*cursor / SECTOR_SIZE) as u32;
    *cursor += round_up_sector(bytes.len() as u64).max(SECTOR_SIZE);
    (bytes, lba)
}

/// Registers one extent per unique file LBA: a file whose content
/// deduplicated onto an earlier file's LBA (see `assign_file_lbas`) is
/// skipped here, since that LBA's extent was already registered for the
/// first file that used it.
fn emit_file_extents(dir: &mut DirNode, emitted: &mut HashSet<u32>, sink: &mut dyn BuilderExtentSink) {
    for entry in &mut dir.children {
        match entry {
            Entry::File(f) => {
                if emitted.insert(f.lba) {
                    sink.add_extent(Box::new(RawDataExtent::new(f.lba, std::mem::take(&mut f.data))));
                }
            }
            Entry::Dir(d) => emit_file_extents(d, emitted, sink),
        }
    }
}

fn emit_dir_content_extents(root: &DirNode, dir: &DirNode, sink: &mut dyn BuilderExtentSink, joliet: bool) {
    let (lba, _len) = if joliet {
        (dir.supp_lba, dir.supp_len)
    } else {
        (dir.primary_lba, dir.primary_len)
    };
    let (parent_lba, parent_len) = find_parent(root, dir, joliet).unwrap_or((lba, 0));

    let mut sorted: Vec<&Entry> = dir.children.iter().collect();
    sorted.sort_by(|a, b| {
        let na = entry_sort_name(a, joliet);
        let nb = entry_sort_name(b, joliet);
        compare_identifiers(&na, &nb)
    });

    let mut records = Vec::new();
    records.push(encode_record(&DirectoryRecord {
        extent_lba: lba,
        data_length: if joliet { dir.supp_len } else { dir.primary_len },
        recording_time: IsoDateTime::UNSET,
        flags: RecordFlags::DIRECTORY,
        file_unit_size: 0,
        interleave_gap_size: 0,
        volume_sequence_number: 1,
        identifier: vec![0u8],
        system_use: Vec::new(),
    }));
    records.push(encode_record(&DirectoryRecord {
        extent_lba: parent_lba,
        data_length: parent_len,
        recording_time: IsoDateTime::UNSET,
        flags: RecordFlags::DIRECTORY,
        file_unit_size: 0,
        interleave_gap_size: 0,
        volume_sequence_number: 1,
        identifier: vec![1u8],
        system_use: Vec::new(),
    }));

    for entry in sorted {
        let identifier = child_identifier_bytes(entry, joliet);
        let (extent_lba, data_length, is_dir) = match entry {
            Entry::File(f) => (f.lba, f.data_len, false),
            Entry::Dir(d) => {
                let (l, n) = if joliet { (d.supp_lba, d.supp_len) } else { (d.primary_lba, d.primary_len) };
                (l, n, true)
            }
        };
        records.push(encode_record(&DirectoryRecord {
            extent_lba,
            data_length,
            recording_time: IsoDateTime::UNSET,
            flags: if is_dir { RecordFlags::DIRECTORY } else { RecordFlags::empty() },
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_sequence_number: 1,
            identifier,
            system_use: Vec::new(),
        }));
    }

    let content = pack_records(records);
    sink.add_extent(Box::new(RawDataExtent::new(lba, content)));

    for entry in &dir.children {
        if let Entry::Dir(child) = entry {
            emit_dir_content_extents(root, child, sink, joliet);
        }
    }
}

fn entry_sort_name(entry: &Entry, joliet: bool) -> String {
    match entry {
        Entry::File(f) => if joliet { f.raw_name.clone() } else { f.normalized_name.clone() },
        Entry::Dir(d) => if joliet { d.raw_name.clone() } else { d.normalized_name.clone() },
    }
}

fn find_parent<'a>(root: &'a DirNode, target: &DirNode, joliet: bool) -> Option<(u32, u32)> {
    if std::ptr::eq(root, target) {
        return Some(if joliet {
            (root.supp_lba, root.supp_len)
        } else {
            (root.primary_lba, root.primary_len)
        });
    }
    for entry in &root.children {
        if let Entry::Dir(d) = entry {
            if std::ptr::eq(d as *const DirNode, target as *const DirNode) {
                return Some(if joliet { (root.supp_lba, root.supp_len) } else { (root.primary_lba, root.primary_len) });
            }
            if let Some(found) = find_parent(d, target, joliet) {
                return Some(found);
            }
        }
    }
    None
}

fn pack_records(records: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut sector_pos = 0u64;
    for rec in records {
        if sector_pos + rec.len() as u64 > SECTOR_SIZE {
            let pad = SECTOR_SIZE - sector_pos;
            out.resize(out.len() + pad as usize, 0);
            sector_pos = 0;
        }
        out.extend_from_slice(&rec);
        sector_pos += rec.len() as u64;
    }
    if sector_pos > 0 {
        let total = round_up_sector(out.len() as u64);
        out.resize(total as usize, 0);
    }
    out
}

/// One fixed-position region's worth of bytes (a file, a directory's
/// records, a path table, a volume descriptor) placed at a given LBA.
struct RawDataExtent {
    start: u64,
    data: Vec<u8>,
}

impl RawDataExtent {
    fn new(lba: u32, data: Vec<u8>) -> Self {
        Self {
            start: lba as u64 * SECTOR_SIZE,
            data,
        }
    }
}

impl BuilderExtent for RawDataExtent {
    fn start(&self) -> u64 {
        self.start
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset_in_extent: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset_in_extent as usize;
        let n = buf.len().min(self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::SparseStream;

    #[test]
    fn build_small_image_round_trips_file_data() {
        let mut builder = IsoBuilder::new(BuildOptions {
            volume_identifier: "MYISO".to_string(),
            joliet: true,
        });
        builder.add_file("A/B/HELLO.TXT", b"hello world!".to_vec()).unwrap();
        let mut built = builder.build().unwrap();
        assert!(built.len() >= 32 * 1024 + 5 * SECTOR_SIZE);

        let mut pvd = [0u8; 2048];
        built.set_position(0x8000);
        built.read_at(&mut pvd).unwrap();
        assert_eq!(&pvd[1..6], b"CD001");
    }

    #[test]
    fn duplicate_file_names_get_unique_versions() {
        let mut builder = IsoBuilder::new(BuildOptions::default());
        builder.add_file("A.TXT", vec![1]).unwrap();
        builder.add_file("A.TXT", vec![2]).unwrap();
        let names: Vec<&str> = builder
            .root
            .children
            .iter()
            .map(|e| match e {
                Entry::File(f) => f.normalized_name.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_ne!(names[0], names[1]);
    }
}
