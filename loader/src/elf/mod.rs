//! Decodes an ELF64 header and program-header table into a validated,
//! typed description of what the segment mapper needs to realize.
//!
//! [`parse`] is a pure function of its input bytes: it never consults a
//! collaborator, never picks a load address, and never writes anything. The
//! driver (`crate::driver`) is responsible for asking the memory manager
//! for a load bias and applying it via [`LoadedImage::apply_bias`] — the
//! parser only reports addresses as found in the file.

pub mod types;

use alloc::string::String;
use alloc::vec::Vec;

use crate::collab::Perms;
use crate::error::LoadError;

pub use types::{
    ElfClass, ElfData, ElfMachine, ElfType, OsTag, ProgramType, ELF_MAGIC, PT_GNU_STACK,
};
use types::{Elf64Header, Elf64ProgramHeader};

/// One PT_LOAD entry, translated into what the segment mapper needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSegment {
    pub file_offset: u64,
    pub file_size: u64,
    pub mem_size: u64,
    pub vaddr: u64,
    pub align: u64,
    pub perms: Perms,
}

/// The parser's validated output: enough to map segments, load an
/// interpreter if named, and contribute the image's auxv entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: u64,
    /// Highest virtual address occupied by any loaded segment.
    pub end: u64,
    /// Address of the program header table once mapped, if derivable.
    pub phdr_vaddr: Option<u64>,
    pub phent: u16,
    pub phnum: u16,
    pub os_tag: OsTag,
    /// PT_INTERP content, if present.
    pub interpreter: Option<String>,
    pub segments: Vec<ProgramSegment>,
    /// Whether PT_GNU_STACK (or its absence) implies an executable stack.
    pub stack_exec: bool,
    /// `true` for ET_DYN (position-independent, needs a driver-chosen load
    /// bias), `false` for ET_EXEC (fixed addresses, bias is always zero).
    pub pie: bool,
}

impl LoadedImage {
    /// Translate every address in this image by `bias` (zero for ET_EXEC,
    /// a memory-manager-chosen free region for ET_DYN). Called by the
    /// driver exactly once, after `parse` and before segment mapping.
    pub fn apply_bias(&mut self, bias: u64) {
        if bias == 0 {
            return;
        }
        self.entry = self.entry.wrapping_add(bias);
        self.end = self.end.wrapping_add(bias);
        self.phdr_vaddr = self.phdr_vaddr.map(|v| v.wrapping_add(bias));
        for seg in &mut self.segments {
            seg.vaddr = seg.vaddr.wrapping_add(bias);
        }
    }
}

fn get_u16(b: &[u8], off: usize) -> Result<u16, LoadError> {
    let s: [u8; 2] = b
        .get(off..off + 2)
        .ok_or_else(|| LoadError::not_executable("truncated ELF header"))?
        .try_into()
        .map_err(|_| LoadError::Internal {
            detail: "slice length mismatch reading u16",
        })?;
    Ok(u16::from_le_bytes(s))
}

fn get_u32(b: &[u8], off: usize) -> Result<u32, LoadError> {
    let s: [u8; 4] = b
        .get(off..off + 4)
        .ok_or_else(|| LoadError::not_executable("truncated ELF header"))?
        .try_into()
        .map_err(|_| LoadError::Internal {
            detail: "slice length mismatch reading u32",
        })?;
    Ok(u32::from_le_bytes(s))
}

fn get_u64(b: &[u8], off: usize) -> Result<u64, LoadError> {
    let s: [u8; 8] = b
        .get(off..off + 8)
        .ok_or_else(|| LoadError::not_executable("truncated ELF header"))?
        .try_into()
        .map_err(|_| LoadError::Internal {
            detail: "slice length mismatch reading u64",
        })?;
    Ok(u64::from_le_bytes(s))
}

fn parse_header(b: &[u8]) -> Result<Elf64Header, LoadError> {
    if b.len() < Elf64Header::SIZE {
        return Err(LoadError::not_executable("file shorter than ELF header"));
    }
    let mut ident = [0u8; 16];
    ident.copy_from_slice(&b[0..16]);
    Ok(Elf64Header {
        ident,
        e_type: get_u16(b, 16)?,
        machine: get_u16(b, 18)?,
        version: get_u32(b, 20)?,
        entry: get_u64(b, 24)?,
        phoff: get_u64(b, 32)?,
        shoff: get_u64(b, 40)?,
        flags: get_u32(b, 48)?,
        ehsize: get_u16(b, 52)?,
        phentsize: get_u16(b, 54)?,
        phnum: get_u16(b, 56)?,
        shentsize: get_u16(b, 58)?,
        shnum: get_u16(b, 60)?,
        shstrndx: get_u16(b, 62)?,
    })
}

fn validate_header(h: &Elf64Header) -> Result<OsTag, LoadError> {
    if h.ident[0..4] != ELF_MAGIC {
        return Err(LoadError::not_executable("bad ELF magic"));
    }
    if ElfClass::from_u8(h.ident[4]) != Some(ElfClass::Elf64) {
        return Err(LoadError::not_executable("not a 64-bit ELF"));
    }
    if ElfData::from_u8(h.ident[5]) != Some(ElfData::LittleEndian) {
        return Err(LoadError::not_executable("unsupported data encoding"));
    }
    if h.ident[6] != 1 {
        return Err(LoadError::not_executable("unsupported ELF version"));
    }
    let os_tag = OsTag::from_u8(h.ident[7]);
    match ElfType::from_u16(h.e_type) {
        Some(ElfType::Executable) | Some(ElfType::SharedObject) => {}
        _ => return Err(LoadError::not_executable("not ET_EXEC or ET_DYN")),
    }
    if h.machine != ElfMachine::expected() as u16 {
        return Err(LoadError::not_executable("machine mismatch"));
    }
    if h.phentsize as usize != Elf64ProgramHeader::SIZE {
        return Err(LoadError::not_executable(
            "unexpected program header entry size",
        ));
    }
    Ok(os_tag)
}

fn parse_program_header(b: &[u8], off: usize) -> Result<Elf64ProgramHeader, LoadError> {
    Ok(Elf64ProgramHeader {
        p_type: get_u32(b, off)?,
        p_flags: get_u32(b, off + 4)?,
        p_offset: get_u64(b, off + 8)?,
        p_vaddr: get_u64(b, off + 16)?,
        p_paddr: get_u64(b, off + 24)?,
        p_filesz: get_u64(b, off + 32)?,
        p_memsz: get_u64(b, off + 40)?,
        p_align: get_u64(b, off + 48)?,
    })
}

fn perms_from_flags(p_flags: u32) -> Perms {
    let mut perms = Perms::empty();
    if p_flags & 0b100 != 0 {
        perms |= Perms::READ;
    }
    if p_flags & 0b010 != 0 {
        perms |= Perms::WRITE;
    }
    if p_flags & 0b001 != 0 {
        perms |= Perms::EXEC;
    }
    perms
}

fn read_cstr(b: &[u8], offset: u64, len: u64) -> Result<String, LoadError> {
    let start = offset as usize;
    let end = start.checked_add(len as usize).ok_or(LoadError::Overflow {
        detail: "PT_INTERP range",
    })?;
    let raw = b
        .get(start..end)
        .ok_or_else(|| LoadError::not_executable("PT_INTERP segment out of bounds"))?;
    let nul = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    core::str::from_utf8(&raw[..nul])
        .map(String::from)
        .map_err(|_| LoadError::not_executable("PT_INTERP is not valid UTF-8"))
}

/// Decode and validate an ELF64 header and program-header table.
///
/// Consults nothing but `bytes`: the whole file (or at least everything up
/// to the highest `p_offset + p_filesz` referenced by a PT_LOAD/PT_INTERP)
/// must already be in memory.
pub fn parse(bytes: &[u8]) -> Result<LoadedImage, LoadError> {
    let header = parse_header(bytes)?;
    let os_tag = validate_header(&header)?;
    let pie = ElfType::from_u16(header.e_type) == Some(ElfType::SharedObject);

    let phnum = header.phnum as usize;
    let phoff = header.phoff;
    let phentsize = header.phentsize as u64;

    let mut segments = Vec::new();
    let mut interpreter = None;
    let mut interp_seen = false;
    let mut phdr_vaddr = None;
    let mut stack_exec = true; // absence of PT_GNU_STACK => executable stack
    let mut end: u64 = 0;

    for i in 0..phnum {
        let off = phoff
            .checked_add(
                (i as u64)
                    .checked_mul(phentsize)
                    .ok_or(LoadError::Overflow {
                        detail: "program header table offset",
                    })?,
            )
            .ok_or(LoadError::Overflow {
                detail: "program header table offset",
            })?;
        let ph = parse_program_header(bytes, off as usize)?;

        match ProgramType::from_u32(ph.p_type) {
            ProgramType::Load => {
                if ph.p_filesz > ph.p_memsz {
                    return Err(LoadError::not_executable(
                        "PT_LOAD file size exceeds memory size",
                    ));
                }
                if ph.p_align > 1 && !ph.p_align.is_power_of_two() {
                    return Err(LoadError::not_executable(
                        "PT_LOAD alignment is not a power of two",
                    ));
                }
                if ph.p_align > 1 && ph.p_vaddr % ph.p_align != ph.p_offset % ph.p_align {
                    return Err(LoadError::not_executable(
                        "PT_LOAD vaddr/offset congruence violated",
                    ));
                }
                let seg_end = ph
                    .p_vaddr
                    .checked_add(ph.p_memsz)
                    .ok_or(LoadError::Overflow {
                        detail: "PT_LOAD end address",
                    })?;
                end = end.max(seg_end);
                segments.push(ProgramSegment {
                    file_offset: ph.p_offset,
                    file_size: ph.p_filesz,
                    mem_size: ph.p_memsz,
                    vaddr: ph.p_vaddr,
                    align: ph.p_align.max(1),
                    perms: perms_from_flags(ph.p_flags),
                });
            }
            ProgramType::Interp => {
                if interp_seen {
                    return Err(LoadError::not_executable("multiple PT_INTERP entries"));
                }
                interp_seen = true;
                interpreter = Some(read_cstr(bytes, ph.p_offset, ph.p_filesz)?);
            }
            ProgramType::Phdr => {
                phdr_vaddr = Some(ph.p_vaddr);
            }
            ProgramType::Tls | ProgramType::Dynamic | ProgramType::Null | ProgramType::Shlib => {}
            ProgramType::Other(t) if t == PT_GNU_STACK => {
                stack_exec = perms_from_flags(ph.p_flags).contains(Perms::EXEC);
            }
            ProgramType::Other(_) => {}
        }
    }

    if phdr_vaddr.is_none() {
        for seg in &segments {
            let seg_file_end = seg.file_offset.saturating_add(seg.file_size);
            if phoff >= seg.file_offset && phoff < seg_file_end {
                phdr_vaddr = Some(seg.vaddr + (phoff - seg.file_offset));
                break;
            }
        }
    }

    Ok(LoadedImage {
        entry: header.entry,
        end,
        phdr_vaddr,
        phent: header.phentsize,
        phnum: header.phnum,
        os_tag,
        interpreter,
        segments,
        stack_exec,
        pie,
    })
}
