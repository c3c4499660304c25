//! End-to-end VMDK parent-chain read scenario: a parent extent with
//! `grain_size = 128 sectors`, `num_gtes_per_gt = 512`; the child leaves
//! grain-table index 3 unset (deferring to the parent) and allocates its own
//! grain for index 4.

use std::io::Write;
use std::sync::Arc;

use vdisk::stream::SparseStream;
use vdisk::vmdk::grain::GrainEngine;

const GRAIN_SIZE_SECTORS: u64 = 128;
const SECTOR_SIZE: u64 = 512;
const GRAIN_SIZE_BYTES: u64 = GRAIN_SIZE_SECTORS * SECTOR_SIZE;
const NUM_GTES_PER_GT: u32 = 512;
const GT_OFFSET_SECTOR: u32 = 2; // GT lives at byte 1024
const CAPACITY_BYTES: u64 = GRAIN_SIZE_BYTES * 8;

fn mmap_from(bytes: Vec<u8>) -> Arc<memmap2::Mmap> {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&bytes).unwrap();
    Arc::new(unsafe { memmap2::Mmap::map(&file).unwrap() })
}

fn build_parent() -> GrainEngine {
    let grain_sector = 128u32; // byte 65536
    let mut data = vec![0u8; (grain_sector as u64 * SECTOR_SIZE + GRAIN_SIZE_BYTES) as usize];

    let gt_offset = GT_OFFSET_SECTOR as u64 * SECTOR_SIZE;
    data[gt_offset as usize + 3 * 4..gt_offset as usize + 3 * 4 + 4]
        .copy_from_slice(&grain_sector.to_le_bytes());

    let grain_start = grain_sector as u64 * SECTOR_SIZE;
    data[grain_start as usize..grain_start as usize + GRAIN_SIZE_BYTES as usize].fill(b'P');

    GrainEngine::new(
        mmap_from(data),
        CAPACITY_BYTES,
        GRAIN_SIZE_BYTES,
        NUM_GTES_PER_GT,
        vec![GT_OFFSET_SECTOR],
        false,
        None,
    )
}

fn build_child(parent: GrainEngine) -> GrainEngine {
    let grain_sector = 300u32; // byte 153600
    let mut data = vec![0u8; (grain_sector as u64 * SECTOR_SIZE + GRAIN_SIZE_BYTES) as usize];

    let gt_offset = GT_OFFSET_SECTOR as u64 * SECTOR_SIZE;
    // entry 3 stays zero (unallocated, defers to parent).
    data[gt_offset as usize + 4 * 4..gt_offset as usize + 4 * 4 + 4]
        .copy_from_slice(&grain_sector.to_le_bytes());

    let grain_start = grain_sector as u64 * SECTOR_SIZE;
    data[grain_start as usize..grain_start as usize + 5].copy_from_slice(b"CHILD");

    GrainEngine::new(
        mmap_from(data),
        CAPACITY_BYTES,
        GRAIN_SIZE_BYTES,
        NUM_GTES_PER_GT,
        vec![GT_OFFSET_SECTOR],
        false,
        Some(Box::new(parent)),
    )
}

#[test]
fn unset_child_grain_falls_through_to_parent_data() {
    let parent = build_parent();
    let mut child = build_child(parent);

    child.set_position(3 * GRAIN_SIZE_BYTES);
    let mut buf = [0u8; 1];
    child.read_at(&mut buf).unwrap();
    assert_eq!(buf[0], b'P');
}

#[test]
fn allocated_child_grain_shadows_parent() {
    let parent = build_parent();
    let mut child = build_child(parent);

    child.set_position(4 * GRAIN_SIZE_BYTES);
    let mut buf = [0u8; 5];
    child.read_at(&mut buf).unwrap();
    assert_eq!(&buf, b"CHILD");
}
