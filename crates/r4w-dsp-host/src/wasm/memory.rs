//! Scratch-region layout inside the module's linear memory.
//!
//! The host and the DSP module agree out-of-band on where the audio I/O
//! buffers and the sample arena live. Nothing in the module tells the host
//! where its own static data and heap end, so the offsets are a versioned
//! compatibility contract ([`MemoryLayout::V1`]) and every layout is checked
//! against the real memory size before an offset is used.
//!
//! ## Memory Convention
//!
//! ```text
//! 0 ─ module data/heap ─ io_offset ─ [L in][R in][L out][R out] ─ ... ─
//!     sample_offset ─ [slot 0][slot 1] ... [slot N-1]
//! ```
//! - Samples are little-endian f32 (4 bytes)
//! - Offsets handed to the module are i32 (WASM32 address space)
//! - Regions never hold host pointers; byte views are taken per call from the
//!   live memory, so a view cannot outlive the store borrow

use serde::{Deserialize, Serialize};

use crate::error::AllocError;

/// WebAssembly page size in bytes.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Size of one f32 sample in bytes.
pub const BYTES_PER_SAMPLE: usize = 4;

/// Name of the linear memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// Fixed offsets shared between the host and the compiled DSP module.
///
/// Changing any field requires rebuilding the module against the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLayout {
    /// Layout revision, bumped whenever an offset changes
    pub version: u32,

    /// Start of the four audio I/O regions
    pub io_offset: usize,

    /// Start of the sample arena (sampler modules only)
    pub sample_offset: usize,

    /// Number of sample slots in the arena
    pub slot_count: usize,

    /// Capacity of each slot in samples
    pub max_samples_per_slot: usize,
}

impl MemoryLayout {
    /// First layout revision: I/O at 900 000, eight 30 s slots (at 48 kHz) at 1 000 000.
    pub const V1: MemoryLayout = MemoryLayout {
        version: 1,
        io_offset: 900_000,
        sample_offset: 1_000_000,
        slot_count: 8,
        max_samples_per_slot: 1_440_000,
    };

    /// Compute the four I/O regions for a block capacity.
    pub fn io_regions(&self, max_block_size: usize) -> Result<IoRegions, AllocError> {
        if max_block_size == 0 {
            return Err(AllocError::InvalidBlockSize(max_block_size));
        }
        let region_len = max_block_size
            .checked_mul(BYTES_PER_SAMPLE)
            .ok_or(AllocError::InvalidBlockSize(max_block_size))?;
        let end = region_len
            .checked_mul(4)
            .and_then(|total| total.checked_add(self.io_offset))
            .ok_or(AllocError::InvalidBlockSize(max_block_size))?;
        if end > i32::MAX as usize {
            return Err(AllocError::InvalidBlockSize(max_block_size));
        }

        let region = |index: usize| Region::new(self.io_offset + index * region_len, region_len);
        Ok(IoRegions {
            left_in: region(0),
            right_in: region(1),
            left_out: region(2),
            right_out: region(3),
            capacity: max_block_size,
        })
    }

    /// Compute the sample arena.
    pub fn sample_arena(&self) -> Result<SampleArena, AllocError> {
        let slot_bytes = self
            .max_samples_per_slot
            .checked_mul(BYTES_PER_SAMPLE)
            .ok_or(AllocError::InvalidBlockSize(self.max_samples_per_slot))?;
        let len = slot_bytes
            .checked_mul(self.slot_count)
            .ok_or(AllocError::InvalidBlockSize(self.max_samples_per_slot))?;
        let end = self
            .sample_offset
            .checked_add(len)
            .ok_or(AllocError::OutOfAddressRange(usize::MAX))?;
        if end > i32::MAX as usize {
            return Err(AllocError::OutOfAddressRange(end));
        }
        Ok(SampleArena {
            base: Region::new(self.sample_offset, len),
            slot_count: self.slot_count,
            max_samples_per_slot: self.max_samples_per_slot,
        })
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::V1
    }
}

/// A byte range inside linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Byte offset from address 0 of the sandbox
    pub offset: usize,
    /// Length in bytes
    pub len: usize,
}

impl Region {
    /// Create a region.
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Offset as the module sees it.
    pub fn wasm_offset(&self) -> i32 {
        self.offset as u32 as i32
    }

    /// The leading `samples` f32 values of this region, if they fit.
    pub fn prefix(&self, samples: usize) -> Option<Region> {
        let len = samples.checked_mul(BYTES_PER_SAMPLE)?;
        (len <= self.len).then_some(Region::new(self.offset, len))
    }

    /// Byte view of this region, `None` if it lies outside `memory`.
    pub fn bytes<'a>(&self, memory: &'a [u8]) -> Option<&'a [u8]> {
        memory.get(self.offset..self.end())
    }

    /// Mutable byte view of this region, `None` if it lies outside `memory`.
    pub fn bytes_mut<'a>(&self, memory: &'a mut [u8]) -> Option<&'a mut [u8]> {
        memory.get_mut(self.offset..self.end())
    }

    fn overlaps(&self, other: &Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// The four audio I/O regions, laid out contiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRegions {
    /// Left input
    pub left_in: Region,
    /// Right input
    pub right_in: Region,
    /// Left output
    pub left_out: Region,
    /// Right output
    pub right_out: Region,
    /// Capacity of each region in samples
    pub capacity: usize,
}

impl IoRegions {
    /// Start of the first region.
    pub fn start(&self) -> usize {
        self.left_in.offset
    }

    /// End of the last region.
    pub fn end(&self) -> usize {
        self.right_out.end()
    }

    fn span(&self) -> Region {
        Region::new(self.start(), self.end() - self.start())
    }
}

/// Per-slot sample storage for sampler modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleArena {
    /// Whole arena
    pub base: Region,
    /// Number of slots
    pub slot_count: usize,
    /// Capacity of each slot in samples
    pub max_samples_per_slot: usize,
}

impl SampleArena {
    /// Full-capacity region of a slot.
    pub fn slot(&self, slot: usize) -> Option<Region> {
        if slot >= self.slot_count {
            return None;
        }
        let slot_len = self.max_samples_per_slot * BYTES_PER_SAMPLE;
        Some(Region::new(self.base.offset + slot * slot_len, slot_len))
    }
}

/// Everything `allocate` committed for one block capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regions {
    /// Audio I/O regions
    pub io: IoRegions,
    /// Sample arena, present for sampler modules
    pub arena: Option<SampleArena>,
}

/// Lay out the I/O regions (and the arena when `with_arena`) inside `memory`.
///
/// `memory` is the module's whole linear memory, so its length is the page
/// count times [`WASM_PAGE_SIZE`]. Every bound is checked before anything is
/// written. The I/O regions are zero-filled; the arena is zero-filled only
/// when it was not already committed (`existing_arena`), so loaded samples
/// survive a capacity change.
pub fn allocate(
    memory: &mut [u8],
    layout: &MemoryLayout,
    max_block_size: usize,
    with_arena: bool,
    existing_arena: Option<SampleArena>,
) -> Result<Regions, AllocError> {
    let io = layout.io_regions(max_block_size)?;

    let (arena, fresh_arena) = match (with_arena, existing_arena) {
        (false, _) => (None, false),
        (true, Some(arena)) => (Some(arena), false),
        (true, None) => (Some(layout.sample_arena()?), true),
    };

    let mut required = io.end();
    if let Some(arena) = &arena {
        if io.span().overlaps(&arena.base) {
            return Err(AllocError::RegionOverlap {
                io_end: io.end(),
                arena_start: arena.base.offset,
            });
        }
        required = required.max(arena.base.end());
    }

    if memory.len() < required {
        return Err(AllocError::MemoryTooSmall {
            required,
            available: memory.len(),
        });
    }

    // Bounds were checked above.
    if let Some(bytes) = io.span().bytes_mut(memory) {
        bytes.fill(0);
    }
    if let (true, Some(arena)) = (fresh_arena, &arena) {
        if let Some(bytes) = arena.base.bytes_mut(memory) {
            bytes.fill(0);
        }
    }

    Ok(Regions { io, arena })
}

/// Validate and zero the sample arena on its own (sample load before `prepare`).
pub fn commit_arena(memory: &mut [u8], layout: &MemoryLayout) -> Result<SampleArena, AllocError> {
    let arena = layout.sample_arena()?;
    let available = memory.len();
    let bytes = arena
        .base
        .bytes_mut(memory)
        .ok_or(AllocError::MemoryTooSmall {
            required: arena.base.end(),
            available,
        })?;
    bytes.fill(0);
    Ok(arena)
}

/// Copy host samples into `region`. Returns `false` if they do not fit.
pub fn write_samples(memory: &mut [u8], region: &Region, samples: &[f32]) -> bool {
    let Some(dst) = (match region.prefix(samples.len()) {
        Some(r) => r.bytes_mut(memory),
        None => None,
    }) else {
        return false;
    };
    for (chunk, sample) in dst.chunks_exact_mut(BYTES_PER_SAMPLE).zip(samples) {
        chunk.copy_from_slice(&sample.to_le_bytes());
    }
    true
}

/// Copy samples out of `region` into `out`. Returns `false` if `region` is too short.
pub fn read_samples(memory: &[u8], region: &Region, out: &mut [f32]) -> bool {
    let Some(src) = region.prefix(out.len()).and_then(|r| r.bytes(memory)) else {
        return false;
    };
    for (sample, chunk) in out.iter_mut().zip(src.chunks_exact(BYTES_PER_SAMPLE)) {
        *sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_layout() -> MemoryLayout {
        MemoryLayout {
            version: 0,
            io_offset: 1024,
            sample_offset: 8192,
            slot_count: 2,
            max_samples_per_slot: 256,
        }
    }

    #[test]
    fn test_io_regions_contiguous() {
        let io = MemoryLayout::V1.io_regions(512).unwrap();
        assert_eq!(io.left_in, Region::new(900_000, 2048));
        assert_eq!(io.right_in.offset, 902_048);
        assert_eq!(io.left_out.offset, 904_096);
        assert_eq!(io.right_out.offset, 906_144);
        assert_eq!(io.end(), 908_192);
        assert_eq!(io.capacity, 512);
    }

    #[test]
    fn test_io_regions_rejects_zero() {
        assert_eq!(
            MemoryLayout::V1.io_regions(0),
            Err(AllocError::InvalidBlockSize(0))
        );
    }

    #[test]
    fn test_v1_arena_size() {
        let arena = MemoryLayout::V1.sample_arena().unwrap();
        assert_eq!(arena.base.offset, 1_000_000);
        assert_eq!(arena.base.len, 8 * 1_440_000 * 4);
        assert_eq!(arena.slot(1).unwrap().offset, 1_000_000 + 1_440_000 * 4);
        assert!(arena.slot(8).is_none());
    }

    #[test]
    fn test_arena_must_stay_addressable() {
        let layout = MemoryLayout {
            sample_offset: 2_000_000_000,
            max_samples_per_slot: 100_000_000,
            ..MemoryLayout::V1
        };
        assert_eq!(
            layout.sample_arena(),
            Err(AllocError::OutOfAddressRange(2_000_000_000 + 8 * 400_000_000))
        );

        let mut memory = vec![0u8; WASM_PAGE_SIZE];
        let err = allocate(&mut memory, &layout, 64, true, None).unwrap_err();
        assert!(matches!(err, AllocError::OutOfAddressRange(_)));
        assert!(matches!(
            commit_arena(&mut memory, &layout),
            Err(AllocError::OutOfAddressRange(_))
        ));
    }

    #[test]
    fn test_allocate_memory_too_small() {
        let mut memory = vec![0u8; WASM_PAGE_SIZE];
        let err = allocate(&mut memory, &MemoryLayout::V1, 512, false, None).unwrap_err();
        assert_eq!(
            err,
            AllocError::MemoryTooSmall {
                required: 908_192,
                available: WASM_PAGE_SIZE
            }
        );
    }

    #[test]
    fn test_allocate_zero_fills_io() {
        let layout = small_layout();
        let mut memory = vec![0xAAu8; 16 * 1024];
        let regions = allocate(&mut memory, &layout, 64, false, None).unwrap();
        assert!(regions.arena.is_none());
        assert!(memory[1024..regions.io.end()].iter().all(|&b| b == 0));
        assert_eq!(memory[1023], 0xAA);
        assert_eq!(memory[regions.io.end()], 0xAA);
    }

    #[test]
    fn test_allocate_detects_overlap() {
        let layout = small_layout();
        let mut memory = vec![0u8; 64 * 1024];
        // 4 regions of 512 * 4 bytes from 1024 run past 8192
        let err = allocate(&mut memory, &layout, 512, true, None).unwrap_err();
        assert!(matches!(err, AllocError::RegionOverlap { .. }));
        // Without an arena the same capacity is fine
        assert!(allocate(&mut memory, &layout, 512, false, None).is_ok());
    }

    #[test]
    fn test_existing_arena_is_preserved() {
        let layout = small_layout();
        let mut memory = vec![0u8; 16 * 1024];
        let first = allocate(&mut memory, &layout, 16, true, None).unwrap();
        let arena = first.arena.unwrap();
        let slot = arena.slot(0).unwrap();
        assert!(write_samples(&mut memory, &slot, &[0.25, 0.5]));

        let grown = allocate(&mut memory, &layout, 32, true, Some(arena)).unwrap();
        assert_eq!(grown.io.capacity, 32);
        let mut out = [0.0f32; 2];
        assert!(read_samples(&memory, &slot, &mut out));
        assert_eq!(out, [0.25, 0.5]);
    }

    #[test]
    fn test_sample_copy_bounds() {
        let mut memory = vec![0u8; 64];
        let region = Region::new(48, 16);
        assert!(write_samples(&mut memory, &region, &[1.0, -1.0, 0.5, 2.0]));
        assert!(!write_samples(&mut memory, &region, &[0.0; 5]));

        let mut out = [0.0f32; 4];
        assert!(read_samples(&memory, &region, &mut out));
        assert_eq!(out, [1.0, -1.0, 0.5, 2.0]);

        // Region claims more than the memory holds
        let past_end = Region::new(60, 16);
        assert!(!read_samples(&memory, &past_end, &mut out));
    }

    #[test]
    fn test_commit_arena_too_small() {
        let mut memory = vec![0u8; 4096];
        let err = commit_arena(&mut memory, &small_layout()).unwrap_err();
        assert!(matches!(err, AllocError::MemoryTooSmall { required: 10240, .. }));
    }
}
