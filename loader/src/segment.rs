//! Realizes PT_LOAD entries as mappings in the memory manager.
//!
//! Each segment becomes at most two mapping requests: one `map_file` call
//! covering every page touched by the segment's file-backed bytes (the
//! memory manager zero-fills past EOF within that call, mmap-style — see
//! [`crate::collab::MemoryManager::map_file`]), and one `map_anon` call
//! for any further whole pages that are pure bss. This avoids the
//! read-modify-write dance a stricter W^X design might otherwise need: the
//! file-backed call already carries the segment's final permissions, so no
//! separate RW-then-retighten pass is required here. A memory manager that
//! enforces W^X more strictly than the page cache allows is free to do that
//! retightening on its own side of `map_file`; this mapper does not relax
//! or special-case it.

use alloc::vec::Vec;

use crate::collab::{FileHandle, MemoryManager};
use crate::elf::ProgramSegment;
use crate::error::LoadError;
use crate::limits::PAGE_SIZE;

fn align_down(v: u64, align: u64) -> u64 {
    v & !(align - 1)
}

fn align_up(v: u64, align: u64) -> Result<u64, LoadError> {
    let mask = align - 1;
    v.checked_add(mask)
        .map(|v| v & !mask)
        .ok_or(LoadError::Overflow {
            detail: "segment length rounds past address space",
        })
}

/// Map every segment in `segments`, backed by `file`. Returns the highest
/// virtual address written by any mapping, for the caller to round up into
/// a `brk`.
///
/// On the first mapping failure, every mapping made so far in this call is
/// left in place — the memory manager is assumed empty at entry to the
/// overall load attempt, and the caller tears down the whole address space
/// on error rather than asking this function to undo partial work.
pub fn map_segments(
    mm: &mut dyn MemoryManager,
    file: &dyn FileHandle,
    segments: &[ProgramSegment],
) -> Result<u64, LoadError> {
    let mut highest_end = 0u64;
    for seg in segments {
        let end = map_one(mm, file, seg)?;
        highest_end = highest_end.max(end);
    }
    Ok(highest_end)
}

fn map_one(
    mm: &mut dyn MemoryManager,
    file: &dyn FileHandle,
    seg: &ProgramSegment,
) -> Result<u64, LoadError> {
    let pad = seg.vaddr % PAGE_SIZE;
    if seg.file_offset % PAGE_SIZE != pad {
        return Err(LoadError::not_executable(
            "segment vaddr/offset not congruent modulo page size",
        ));
    }

    let map_vaddr = align_down(seg.vaddr, PAGE_SIZE);
    let map_offset = seg.file_offset - pad;
    let total_len = align_up(pad + seg.mem_size, PAGE_SIZE)?;

    let file_backed_len = align_up(pad + seg.file_size, PAGE_SIZE)?.min(total_len);

    if file_backed_len > 0 {
        mm.map_file(
            file,
            map_offset,
            map_vaddr,
            file_backed_len as usize,
            seg.perms,
        )?;
    }

    let anon_len = total_len - file_backed_len;
    if anon_len > 0 {
        mm.map_anon(map_vaddr + file_backed_len, anon_len as usize, seg.perms)?;
    }

    map_vaddr
        .checked_add(total_len)
        .ok_or(LoadError::Overflow {
            detail: "segment end address",
        })
}
