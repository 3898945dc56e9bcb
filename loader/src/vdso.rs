//! Maps the pre-built VDSO image and reports its entry points.
//!
//! The VDSO itself is not produced by this crate — it is a pre-linked
//! shared object built once per platform, handed to the loader as a byte
//! slice plus the one offset (`sigreturn`) that matters to the signal
//! subsystem. Everything else about its contents is opaque here.

use alloc::vec::Vec;

use crate::collab::{FileHandle, MemoryManager, Perms};
use crate::error::LoadError;
use crate::limits::PAGE_SIZE;

/// A pre-built VDSO image: its bytes, source handle, and the offset within
/// it of the sigreturn trampoline.
pub struct VdsoImage<'a> {
    pub file: &'a dyn FileHandle,
    pub len: usize,
    pub sigreturn_offset: u64,
}

fn align_up(v: u64, align: u64) -> Result<u64, LoadError> {
    let mask = align - 1;
    v.checked_add(mask)
        .map(|v| v & !mask)
        .ok_or(LoadError::Overflow {
            detail: "VDSO size rounds past address space",
        })
}

/// Map `vdso` read-execute at a memory-manager-chosen address, returning
/// the base address and the absolute sigreturn entry point.
pub fn map_vdso(mm: &mut dyn MemoryManager, vdso: &VdsoImage) -> Result<(u64, u64), LoadError> {
    let mapped_len = align_up(vdso.len as u64, PAGE_SIZE)?;
    let base = mm.pick_region(mapped_len as usize, PAGE_SIZE as usize)?;
    mm.map_file(
        vdso.file,
        0,
        base,
        mapped_len as usize,
        Perms::READ | Perms::EXEC,
    )?;
    let sigreturn = base
        .checked_add(vdso.sigreturn_offset)
        .ok_or(LoadError::Overflow {
            detail: "VDSO sigreturn address",
        })?;
    mm.set_vdso_sigreturn(sigreturn);
    Ok((base, sigreturn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeFile, FakeMemoryManager, MapKind};

    #[test]
    fn maps_vdso_and_reports_sigreturn() {
        let mut mm = FakeMemoryManager::new();
        let file = FakeFile::new("[vdso]", Vec::new());
        let vdso = VdsoImage {
            file: &file,
            len: 4096,
            sigreturn_offset: 0x200,
        };
        let (base, sigreturn) = map_vdso(&mut mm, &vdso).unwrap();
        assert_eq!(sigreturn, base + 0x200);
        assert_eq!(mm.vdso_sigreturn, Some(sigreturn));
        assert_eq!(mm.calls.len(), 1);
        assert_eq!(mm.calls[0].kind, MapKind::File);
        assert_eq!(mm.calls[0].perms, Perms::READ | Perms::EXEC);
    }

    #[test]
    fn rounds_up_odd_sized_vdso() {
        let mut mm = FakeMemoryManager::new();
        let file = FakeFile::new("[vdso]", Vec::new());
        let vdso = VdsoImage {
            file: &file,
            len: 1,
            sigreturn_offset: 0,
        };
        map_vdso(&mut mm, &vdso).unwrap();
        assert_eq!(mm.calls[0].length, PAGE_SIZE as usize);
    }
}
