//! Parses a `#!` line and rewrites argv for the interpreter it names.
//!
//! Pure string processing over an already-read buffer: no file handle, no
//! collaborator, so the whole component is unit-testable as a function
//! from bytes to result.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::LoadError;
use crate::limits::SHEBANG_LIMIT;

/// The interpreter and rewritten argv produced by resolving one `#!` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResolution {
    /// Path to the interpreter, as written after `#!`.
    pub interpreter: String,
    /// `[interpreter, optional_arg?, script_path, original_argv[1..]]`.
    pub argv: Vec<String>,
}

/// Resolve a shebang line read from `buf` (the first page or so of the
/// script file), rewriting argv for the interpreter it names.
///
/// `script_path` is the name the script itself was opened under (becomes
/// the new argv entry for the script); `orig_argv` is the argv the script
/// was originally invoked with (only `orig_argv[1..]` survives — argv[0] is
/// replaced).
pub fn resolve(
    buf: &[u8],
    script_path: &str,
    orig_argv: &[String],
) -> Result<ScriptResolution, LoadError> {
    if buf.len() < 2 || &buf[..2] != b"#!" {
        return Err(LoadError::not_executable("missing #! prefix"));
    }

    let rest = &buf[2..];
    let line_end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
    let line_end = line_end.min(SHEBANG_LIMIT);
    let line = core::str::from_utf8(&rest[..line_end])
        .map_err(|_| LoadError::not_executable("shebang line is not valid UTF-8"))?;

    let trimmed_start = line.trim_start_matches([' ', '\t']);
    let mut parts = trimmed_start.splitn(2, [' ', '\t']);
    let interpreter = parts.next().unwrap_or("").trim_end();
    let remainder = parts.next().unwrap_or("").trim();

    if interpreter.is_empty() {
        return Err(LoadError::not_executable("shebang has no interpreter path"));
    }

    let mut argv = Vec::with_capacity(3 + orig_argv.len().saturating_sub(1));
    argv.push(interpreter.to_string());
    if !remainder.is_empty() {
        argv.push(remainder.to_string());
    }
    argv.push(script_path.to_string());
    if orig_argv.len() > 1 {
        argv.extend(orig_argv[1..].iter().cloned());
    }

    Ok(ScriptResolution {
        interpreter: interpreter.to_string(),
        argv,
    })
}
