//! Error type surfaced by the loader to its caller.
//!
//! One enum covers every failure kind in the spec's error-handling design:
//! no error is caught and retried inside a single load attempt, so callers
//! see exactly one of these per failed [`crate::driver::load`].

use alloc::string::String;
use core::fmt;

/// A collaborator-reported I/O failure kind, mirrored from `std::io::ErrorKind`
/// without depending on `std`. Collaborators produce these; the loader never
/// synthesizes one itself, so propagation preserves whatever kind the VFS or
/// memory manager actually hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorKind {
    NotFound,
    PermissionDenied,
    Interrupted,
    UnexpectedEof,
    Other,
}

impl fmt::Display for IoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::Interrupted => "interrupted",
            Self::UnexpectedEof => "unexpected end of file",
            Self::Other => "I/O error",
        };
        f.write_str(s)
    }
}

/// Everything that can make a load attempt fail.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a load error must be reported, not silently discarded"]
pub enum LoadError {
    /// Bad magic, malformed ELF, unsupported class/endian/machine, empty
    /// filename, zero-byte file, or an empty shebang interpreter path.
    NotExecutable {
        file: Option<String>,
        reason: &'static str,
    },
    /// Open failure reporting "no such entry", or a script opened with
    /// close-on-exec set.
    NoSuchEntry { file: Option<String> },
    /// Not a regular file, or the VFS denied execute access.
    PermissionDenied { file: Option<String> },
    /// Script-indirection depth exceeded, or the symlink-traversal budget
    /// was exhausted.
    TooManyIndirections { file: Option<String> },
    /// `brk`, segment address arithmetic, or stack size arithmetic
    /// overflowed the address space.
    Overflow { detail: &'static str },
    /// A file read or mapping request failed in a collaborator; the
    /// original error kind is preserved.
    Io {
        file: Option<String>,
        kind: IoErrorKind,
    },
    /// An invariant the loader itself is responsible for was violated.
    /// Never expected in correct operation; terminates the load.
    Internal { detail: &'static str },
}

impl LoadError {
    pub fn not_executable(reason: &'static str) -> Self {
        Self::NotExecutable {
            file: None,
            reason,
        }
    }

    /// Attach a filename to an error that doesn't have one yet, leaving an
    /// already-named error untouched. Lets the driver name the offending
    /// file at the point where it knows it, without every leaf constructor
    /// needing to carry the filename through.
    pub fn with_file(self, file: &str) -> Self {
        match self {
            Self::NotExecutable {
                file: None,
                reason,
            } => Self::NotExecutable {
                file: Some(String::from(file)),
                reason,
            },
            Self::NoSuchEntry { file: None } => Self::NoSuchEntry {
                file: Some(String::from(file)),
            },
            Self::PermissionDenied { file: None } => Self::PermissionDenied {
                file: Some(String::from(file)),
            },
            Self::TooManyIndirections { file: None } => Self::TooManyIndirections {
                file: Some(String::from(file)),
            },
            Self::Io { file: None, kind } => Self::Io {
                file: Some(String::from(file)),
                kind,
            },
            other => other,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn name(file: &Option<String>) -> &str {
            file.as_deref().unwrap_or("<unknown>")
        }
        match self {
            Self::NotExecutable { file, reason } => {
                write!(f, "{}: not an executable: {}", name(file), reason)
            }
            Self::NoSuchEntry { file } => write!(f, "{}: no such file or directory", name(file)),
            Self::PermissionDenied { file } => write!(f, "{}: permission denied", name(file)),
            Self::TooManyIndirections { file } => {
                write!(f, "{}: too many levels of symbolic links", name(file))
            }
            Self::Overflow { detail } => write!(f, "address space overflow: {}", detail),
            Self::Io { file, kind } => write!(f, "{}: {}", name(file), kind),
            Self::Internal { detail } => write!(f, "internal loader error: {}", detail),
        }
    }
}

impl core::error::Error for LoadError {}

pub type LoadResult<T> = Result<T, LoadError>;
