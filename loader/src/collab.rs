//! Contracts for everything outside the loader's own responsibility.
//!
//! The loader does not allocate address space, read a filesystem, generate
//! randomness, or touch a register file: a host kernel does, and hands the
//! loader a handful of trait objects through which to ask for it. None of
//! these traits has a production implementation in this crate — only the
//! contracts, plus the `testutil` fakes the test suite drives them with.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::LoadError;

bitflags::bitflags! {
    /// Mapping permissions requested for a region of address space.
    ///
    /// Mirrors `PF_R`/`PF_W`/`PF_X` from the ELF program header flags, so a
    /// [`crate::elf::ProgramSegment`]'s flags convert to this directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Perms: u32 {
        const READ = 0b001;
        const WRITE = 0b010;
        const EXEC = 0b100;
    }
}

/// A half-open virtual address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrRange {
    pub start: u64,
    pub end: u64,
}

impl AddrRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// What kind of filesystem entry a `stat` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// An open file handle, opaque to the loader beyond what the `Vfs` methods
/// report about it. Collaborators define the concrete type; the loader only
/// ever holds `&dyn FileHandle` or `Box<dyn FileHandle>`.
pub trait FileHandle: Send + Sync {
    /// Identifies the handle in log output; not necessarily a full path.
    fn debug_name(&self) -> &str;
}

/// Allocates and populates the target address space for a load.
///
/// Every method here is a request to the embedding kernel's memory
/// subsystem; none of them touches bytes the loader owns directly. Segment
/// and VDSO *content* is copied via `map_file` (the source is always some
/// [`FileHandle`]); the stack's synthesized bytes have no file behind them,
/// so they go through `write_stack` instead.
pub trait MemoryManager {
    /// Reserve `size` bytes for the initial stack and report the range
    /// chosen. The loader writes into it top-down via `write_stack`.
    fn map_stack(&mut self, size: usize) -> Result<AddrRange, LoadError>;

    /// Map `length` bytes of `file` starting at `offset` into the address
    /// space at `vaddr`, with the given permissions. Mirrors `mmap`
    /// semantics for a file-backed private mapping: if `offset + length`
    /// runs past the file's actual content, the excess within `length` is
    /// treated as already zero rather than an error — this is what lets
    /// the segment mapper issue one `map_file` call per PT_LOAD's
    /// file-backed pages and have the trailing partial page's bss tail
    /// come out zeroed without a separate read-modify-write.
    fn map_file(
        &mut self,
        file: &dyn FileHandle,
        offset: u64,
        vaddr: u64,
        length: usize,
        perms: Perms,
    ) -> Result<(), LoadError>;

    /// Map `length` anonymous, zero-filled bytes at `vaddr`. Used for BSS
    /// tail padding past a segment's file-backed portion.
    fn map_anon(&mut self, vaddr: u64, length: usize, perms: Perms) -> Result<(), LoadError>;

    /// Ask for `size` bytes of free address space, aligned to `align`,
    /// suitable as the load bias for an ET_DYN image or the VDSO.
    fn pick_region(&mut self, size: usize, align: usize) -> Result<u64, LoadError>;

    /// Copy `bytes` into the address space at `vaddr`, which must already
    /// be mapped writable (by a prior `map_stack` call).
    fn write_stack(&mut self, vaddr: u64, bytes: &[u8]) -> Result<(), LoadError>;

    /// Establish the initial program break at `end_addr`, rounded up to the
    /// next page by the caller.
    fn brk_setup(&mut self, end_addr: u64) -> Result<(), LoadError>;

    /// Record where argv's bytes landed on the stack, for introspection
    /// (`/proc/self/cmdline`-style reporting by the embedding kernel).
    fn set_argv_range(&mut self, start: u64, end: u64);

    /// Record where envp's bytes landed on the stack.
    fn set_envp_range(&mut self, start: u64, end: u64);

    /// Record the final auxiliary vector, as `(tag, value)` pairs.
    fn set_auxv(&mut self, entries: &[(u64, u64)]);

    /// Record which file became the process image (for AT_EXECFN /
    /// `/proc/self/exe`-style reporting).
    fn set_executable(&mut self, file: &dyn FileHandle);

    /// Record the VDSO's sigreturn trampoline address, if a VDSO was
    /// mapped.
    fn set_vdso_sigreturn(&mut self, addr: u64);
}

/// Filesystem access the loader needs: opening files relative to a root and
/// working directory, stat, reads, and extended attributes.
pub trait Vfs {
    /// Resolve `path` starting at `start` (capped at `root`), following the
    /// final path component's symlink only if `follow_final` is set.
    fn open_at(
        &mut self,
        root: &dyn FileHandle,
        start: &dyn FileHandle,
        path: &str,
        follow_final: bool,
    ) -> Result<Box<dyn FileHandle>, LoadError>;

    fn stat(&self, file: &dyn FileHandle) -> Result<FileKind, LoadError>;

    /// Read up to `buf.len()` bytes starting at `offset`, returning the
    /// number actually read. A short read is not an error.
    fn read_full(
        &self,
        file: &dyn FileHandle,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, LoadError>;

    /// Fetch up to `max` bytes of extended attribute `name`, or an empty
    /// `Vec` if the attribute is absent.
    fn get_xattr(
        &self,
        file: &dyn FileHandle,
        name: &str,
        max: usize,
    ) -> Result<Vec<u8>, LoadError>;
}

/// The executing task's credentials, consulted for setuid/setgid bit
/// handling and `AT_SECURE`.
pub trait Credentials {
    fn uid(&self) -> u32;
    fn euid(&self) -> u32;
    fn gid(&self) -> u32;
    fn egid(&self) -> u32;
}

/// A source of randomness for `AT_RANDOM` and stack-pointer ASLR padding.
pub trait Random {
    fn fill(&mut self, buf: &mut [u8]);
}

/// The CPU register file for the task being exec'd into.
pub trait ArchContext {
    fn set_ip(&mut self, addr: u64);
    fn set_sp(&mut self, addr: u64);
}

/// CPU feature bits surfaced at `AT_HWCAP`/`AT_HWCAP2`.
pub trait FeatureSet {
    fn hwcap1(&self) -> u64;
    fn hwcap2(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_range_len_and_empty() {
        let r = AddrRange {
            start: 0x1000,
            end: 0x3000,
        };
        assert_eq!(r.len(), 0x2000);
        assert!(!r.is_empty());

        let empty = AddrRange {
            start: 0x2000,
            end: 0x2000,
        };
        assert!(empty.is_empty());
    }

    #[test]
    fn perms_from_elf_flags_bits() {
        let p = Perms::READ | Perms::EXEC;
        assert!(p.contains(Perms::READ));
        assert!(!p.contains(Perms::WRITE));
        assert!(p.contains(Perms::EXEC));
    }
}
