//! `AT_*` auxiliary vector tags and the handful of platform constants the
//! stack builder writes alongside them.

/// End of the vector. Must terminate every auxv array.
pub const AT_NULL: u64 = 0;
pub const AT_IGNORE: u64 = 1;
/// Entry point of the program interpreter, if PT_INTERP was present.
pub const AT_BASE: u64 = 7;
pub const AT_FLAGS: u64 = 8;
/// Entry point of the primary executable (unbiased by the interpreter).
pub const AT_ENTRY: u64 = 9;
pub const AT_UID: u64 = 11;
pub const AT_EUID: u64 = 12;
pub const AT_GID: u64 = 13;
pub const AT_EGID: u64 = 14;
pub const AT_PAGESZ: u64 = 6;
pub const AT_PHDR: u64 = 3;
pub const AT_PHENT: u64 = 4;
pub const AT_PHNUM: u64 = 5;
pub const AT_CLKTCK: u64 = 17;
pub const AT_SECURE: u64 = 23;
pub const AT_RANDOM: u64 = 25;
pub const AT_HWCAP: u64 = 16;
pub const AT_EXECFN: u64 = 31;
pub const AT_SYSINFO_EHDR: u64 = 33;
pub const AT_HWCAP2: u64 = 26;

/// Clock ticks per second reported at `AT_CLKTCK`. Matches Linux's
/// historical fixed `USER_HZ` value, which userspace widely assumes.
pub const CLK_TCK: u64 = 100;
