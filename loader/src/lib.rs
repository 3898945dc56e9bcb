//! `exec-loader`: an architecture-agnostic ELF/`#!` executable loader core
//! for a hosted kernel.
//!
//! This crate prepares a fresh address space so that a hosted program can
//! begin execution with the layout a Unix-style process expects: it
//! resolves interpreter-script indirection, maps ELF segments and their
//! bss, maps a VDSO, builds the initial SysV stack (argv/envp/auxv), and
//! reports the resulting image metadata. It performs no I/O, scheduling,
//! or dynamic linking of its own — every collaborator it needs (address
//! space, filesystem, credentials, randomness, register file, CPU
//! features) is a `dyn`-safe trait in [`collab`], implemented by the
//! embedding kernel.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod auxv;
pub mod collab;
pub mod driver;
pub mod elf;
pub mod error;
pub mod limits;
pub mod probe;
pub mod script;
pub mod segment;
pub mod stack;
pub mod vdso;

#[cfg(test)]
pub mod testutil;

pub use driver::{load, FileSource, ImageInfo, LoadRequest};
pub use error::{LoadError, LoadResult};
