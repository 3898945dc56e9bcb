//! Platform constants the loader is built against.
//!
//! Pulled into one place so a port targeting a different page size or
//! comm-length limit has exactly one module to touch.

/// Page size assumed for segment and stack alignment.
pub const PAGE_SIZE: u64 = 4096;

/// `TASK_COMM_LEN` on Linux: the process short-name buffer size, including
/// the NUL terminator. `ImageInfo::name` is truncated to `COMM_LEN - 1`.
pub const COMM_LEN: usize = 16;

/// Longest shebang line the script resolver will read before truncating,
/// matching Linux's `BINPRM_BUF_SIZE - 1`.
pub const SHEBANG_LIMIT: usize = 127;

/// Initial attempt plus this many interpreter-script substitutions before
/// the driver gives up with [`crate::error::LoadError::TooManyIndirections`].
pub const MAX_SCRIPT_SUBSTITUTIONS: u32 = 5;

/// Number of random bytes placed at `AT_RANDOM`.
pub const RANDOM_BYTES: usize = 16;

/// Maximum size of the `security.capability` xattr (v3 capability
/// descriptor: magic/version + 2 capability sets).
pub const CAP_XATTR_MAX: usize = 64;

/// Required alignment of the initial stack pointer.
pub const STACK_ALIGN: u64 = 16;

/// Default symlink-traversal budget, reset on every successful script
/// substitution (Linux's `MAXSYMLINKS`).
pub const DEFAULT_SYMLINK_BUDGET: u32 = 40;
