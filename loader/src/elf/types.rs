//! ELF64 on-disk layout: raw structs, magic numbers, and the small enums
//! the parser validates header fields against.
//!
//! Kept separate from `mod.rs` so the wire format and the parsing logic
//! that interprets it don't compete for the same file.

/// Bytes `e_ident[0..4]` must equal for any ELF file.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// `e_ident[EI_CLASS]`. 32-bit ELF is a non-goal; only `Elf64` is accepted.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    None = 0,
    Elf32 = 1,
    Elf64 = 2,
}

impl ElfClass {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Elf32),
            2 => Some(Self::Elf64),
            _ => None,
        }
    }
}

/// `e_ident[EI_DATA]`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfData {
    None = 0,
    LittleEndian = 1,
    BigEndian = 2,
}

impl ElfData {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::LittleEndian),
            2 => Some(Self::BigEndian),
            _ => None,
        }
    }
}

/// `e_type`. Only executables and position-independent executables/shared
/// objects loaded as the primary image are accepted (ET_EXEC, ET_DYN);
/// ET_REL and ET_CORE are rejected.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfType {
    None = 0,
    Relocatable = 1,
    Executable = 2,
    SharedObject = 3,
    Core = 4,
}

impl ElfType {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Relocatable),
            2 => Some(Self::Executable),
            3 => Some(Self::SharedObject),
            4 => Some(Self::Core),
            _ => None,
        }
    }
}

/// `e_machine` values the parser is willing to accept, one per supported
/// architecture target. The build selects which one `expected()` returns;
/// a header naming any other machine is rejected.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfMachine {
    X86_64 = 62,
    AArch64 = 183,
    RiscV64 = 243,
}

impl ElfMachine {
    /// The machine this build of the loader expects to see, chosen by the
    /// target architecture it was compiled for.
    pub fn expected() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self::X86_64
        }
        #[cfg(target_arch = "aarch64")]
        {
            Self::AArch64
        }
        #[cfg(target_arch = "riscv64")]
        {
            Self::RiscV64
        }
        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "aarch64",
            target_arch = "riscv64"
        )))]
        {
            compile_error!("exec-loader: unsupported target architecture");
        }
    }
}

/// `e_ident[EI_OSABI]`, reduced to the distinction the driver needs: Linux
/// (or an ABI-compatible extension of it) versus anything else recognized
/// as SysV-compatible.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsTag {
    SysV,
    Linux,
    Other(u8),
}

impl OsTag {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::SysV,
            3 => Self::Linux,
            other => Self::Other(other),
        }
    }
}

/// `p_type` for program header entries the parser treats specially.
/// Anything else is `Other`, including PT_GNU_STACK's GNU-extension value
/// (0x6474e551), which is matched directly rather than folded into this
/// enum.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramType {
    Null = 0,
    Load = 1,
    Dynamic = 2,
    Interp = 3,
    Note = 4,
    Shlib = 5,
    Phdr = 6,
    Tls = 7,
    Other(u32),
}

impl ProgramType {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Null,
            1 => Self::Load,
            2 => Self::Dynamic,
            3 => Self::Interp,
            4 => Self::Note,
            5 => Self::Shlib,
            6 => Self::Phdr,
            7 => Self::Tls,
            other => Self::Other(other),
        }
    }
}

/// GNU extension program header type carrying executable-stack intent.
pub const PT_GNU_STACK: u32 = 0x6474_e551;

/// The fixed-layout ELF64 file header, as it appears on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Header {
    pub ident: [u8; 16],
    pub e_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl Elf64Header {
    pub const SIZE: usize = 64;
}

/// One ELF64 program header table entry, as it appears on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl Elf64ProgramHeader {
    pub const SIZE: usize = 56;
}
