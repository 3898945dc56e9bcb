//! In-memory fakes for every collaborator trait, used only by this crate's
//! own test suite. None of this is production code: a real kernel's VFS,
//! memory manager, and arch context live elsewhere and are not shaped like
//! these.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::collab::{
    AddrRange, ArchContext, Credentials, FeatureSet, FileHandle, FileKind, MemoryManager, Perms,
    Random, Vfs,
};
use crate::error::LoadError;

/// A named, byte-backed stand-in for an open file.
#[derive(Debug, Clone)]
pub struct FakeFile {
    name: String,
    pub data: Vec<u8>,
    pub kind: FileKind,
    pub close_on_exec: bool,
}

impl FakeFile {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            data,
            kind: FileKind::Regular,
            close_on_exec: false,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Vec::new(),
            kind: FileKind::Directory,
            close_on_exec: false,
        }
    }
}

impl FileHandle for FakeFile {
    fn debug_name(&self) -> &str {
        &self.name
    }
}

/// An in-memory filesystem: a flat map from absolute path to file content.
/// `open_at` ignores `root`/`start`/`follow_final` beyond using them as
/// `FileHandle`s that must themselves come from this fake.
#[derive(Default)]
pub struct FakeVfs {
    pub files: BTreeMap<String, FakeFile>,
}

impl FakeVfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(path.to_string(), FakeFile::new(path, data));
    }
}

impl Vfs for FakeVfs {
    fn open_at(
        &mut self,
        _root: &dyn FileHandle,
        _start: &dyn FileHandle,
        path: &str,
        _follow_final: bool,
    ) -> Result<Box<dyn FileHandle>, LoadError> {
        match self.files.get(path) {
            Some(f) => Ok(Box::new(f.clone())),
            None => Err(LoadError::NoSuchEntry {
                file: Some(path.to_string()),
            }),
        }
    }

    fn stat(&self, file: &dyn FileHandle) -> Result<FileKind, LoadError> {
        self.files
            .get(file.debug_name())
            .map(|f| f.kind)
            .ok_or_else(|| LoadError::NoSuchEntry {
                file: Some(file.debug_name().to_string()),
            })
    }

    fn read_full(
        &self,
        file: &dyn FileHandle,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, LoadError> {
        let f = self
            .files
            .get(file.debug_name())
            .ok_or_else(|| LoadError::NoSuchEntry {
                file: Some(file.debug_name().to_string()),
            })?;
        let offset = offset as usize;
        if offset >= f.data.len() {
            return Ok(0);
        }
        let available = &f.data[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn get_xattr(
        &self,
        _file: &dyn FileHandle,
        _name: &str,
        _max: usize,
    ) -> Result<Vec<u8>, LoadError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    File,
    Anon,
}

#[derive(Debug, Clone)]
pub struct MapCall {
    pub kind: MapKind,
    pub vaddr: u64,
    pub length: usize,
    pub perms: Perms,
}

/// A bump-pointer memory manager that never actually stores bytes — it
/// records every mapping request so tests can assert on call shape and
/// ordering, and hands out monotonically increasing addresses from
/// `pick_region`/`map_stack`.
pub struct FakeMemoryManager {
    pub calls: Vec<MapCall>,
    pub next_free: u64,
    pub stack_bytes: BTreeMap<u64, u8>,
    pub argv_range: Option<(u64, u64)>,
    pub envp_range: Option<(u64, u64)>,
    pub auxv: Vec<(u64, u64)>,
    pub brk: Option<u64>,
    pub executable: Option<String>,
    pub vdso_sigreturn: Option<u64>,
}

impl FakeMemoryManager {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_free: 0x7000_0000_0000,
            stack_bytes: BTreeMap::new(),
            argv_range: None,
            envp_range: None,
            auxv: Vec::new(),
            brk: None,
            executable: None,
            vdso_sigreturn: None,
        }
    }

    pub fn read_stack_bytes(&self, vaddr: u64, len: usize) -> Vec<u8> {
        (0..len as u64)
            .map(|i| *self.stack_bytes.get(&(vaddr + i)).unwrap_or(&0))
            .collect()
    }
}

impl Default for FakeMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager for FakeMemoryManager {
    fn map_stack(&mut self, size: usize) -> Result<AddrRange, LoadError> {
        let start = self.next_free - size as u64;
        Ok(AddrRange {
            start,
            end: self.next_free,
        })
    }

    fn map_file(
        &mut self,
        _file: &dyn FileHandle,
        _offset: u64,
        vaddr: u64,
        length: usize,
        perms: Perms,
    ) -> Result<(), LoadError> {
        self.calls.push(MapCall {
            kind: MapKind::File,
            vaddr,
            length,
            perms,
        });
        Ok(())
    }

    fn map_anon(&mut self, vaddr: u64, length: usize, perms: Perms) -> Result<(), LoadError> {
        self.calls.push(MapCall {
            kind: MapKind::Anon,
            vaddr,
            length,
            perms,
        });
        Ok(())
    }

    fn pick_region(&mut self, size: usize, align: usize) -> Result<u64, LoadError> {
        let base = (self.next_free).next_multiple_of(align as u64);
        self.next_free = base + size as u64;
        Ok(base)
    }

    fn write_stack(&mut self, vaddr: u64, bytes: &[u8]) -> Result<(), LoadError> {
        for (i, b) in bytes.iter().enumerate() {
            self.stack_bytes.insert(vaddr + i as u64, *b);
        }
        Ok(())
    }

    fn brk_setup(&mut self, end_addr: u64) -> Result<(), LoadError> {
        self.brk = Some(end_addr);
        Ok(())
    }

    fn set_argv_range(&mut self, start: u64, end: u64) {
        self.argv_range = Some((start, end));
    }

    fn set_envp_range(&mut self, start: u64, end: u64) {
        self.envp_range = Some((start, end));
    }

    fn set_auxv(&mut self, entries: &[(u64, u64)]) {
        self.auxv = entries.to_vec();
    }

    fn set_executable(&mut self, file: &dyn FileHandle) {
        self.executable = Some(file.debug_name().to_string());
    }

    fn set_vdso_sigreturn(&mut self, addr: u64) {
        self.vdso_sigreturn = Some(addr);
    }
}

pub struct FixedRandom {
    pub bytes: Vec<u8>,
}

impl FixedRandom {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl Random for FixedRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.bytes[i % self.bytes.len()];
        }
    }
}

#[derive(Default)]
pub struct RecordingArchContext {
    pub ip: u64,
    pub sp: u64,
}

impl ArchContext for RecordingArchContext {
    fn set_ip(&mut self, addr: u64) {
        self.ip = addr;
    }

    fn set_sp(&mut self, addr: u64) {
        self.sp = addr;
    }
}

pub struct FixedFeatureSet {
    pub hwcap1: u64,
    pub hwcap2: u64,
}

impl FeatureSet for FixedFeatureSet {
    fn hwcap1(&self) -> u64 {
        self.hwcap1
    }

    fn hwcap2(&self) -> u64 {
        self.hwcap2
    }
}

pub struct FixedCredentials {
    pub uid: u32,
    pub euid: u32,
    pub gid: u32,
    pub egid: u32,
}

impl Credentials for FixedCredentials {
    fn uid(&self) -> u32 {
        self.uid
    }

    fn euid(&self) -> u32 {
        self.euid
    }

    fn gid(&self) -> u32 {
        self.gid
    }

    fn egid(&self) -> u32 {
        self.egid
    }
}
