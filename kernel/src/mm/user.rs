//! Access to user memory on behalf of a system call.
//!
//! Every range is checked against the caller's own user table before the
//! MMU is asked to touch it, so a bad pointer is rejected with
//! `InvalidArgument` instead of faulting inside the kernel.

use super::memory_layout::{align_down, user_page_of};
use super::page_table::{PageTable, Protection};
use crate::config::{MAX_ARGS, MAX_USER_STRING, PAGE_SIZE, WORD_SIZE};
use crate::hal::Machine;
use crate::{KernelError, KernelResult};
use alloc::string::String;
use alloc::vec::Vec;

/// Check that `[va, va + len)` is user memory mapped with at least `need`
pub fn check_range(table: &PageTable, va: usize, len: usize, need: Protection) -> KernelResult<()> {
    if len == 0 {
        return Ok(());
    }
    let last = va.checked_add(len - 1).ok_or(KernelError::InvalidArgument)?;
    let mut addr = va;
    loop {
        let page = user_page_of(addr).ok_or(KernelError::InvalidArgument)?;
        let pte = table.entry(page);
        if !pte.is_valid() || !pte.protection().contains(need) {
            return Err(KernelError::InvalidArgument);
        }
        let next = align_down(addr) + PAGE_SIZE;
        if next > last {
            return Ok(());
        }
        addr = next;
    }
}

/// Read one user word
pub fn read_word<M: Machine>(machine: &mut M, table: &PageTable, va: usize) -> KernelResult<usize> {
    check_range(table, va, WORD_SIZE, Protection::READ)?;
    let mut bytes = [0u8; WORD_SIZE];
    machine.read_virt(va, &mut bytes)?;
    Ok(u64::from_le_bytes(bytes) as usize)
}

/// Read a NUL-terminated UTF-8 string of at most `MAX_USER_STRING` bytes
pub fn read_cstr<M: Machine>(
    machine: &mut M,
    table: &PageTable,
    va: usize,
) -> KernelResult<String> {
    let mut bytes = Vec::new();
    for i in 0..MAX_USER_STRING {
        let addr = va.checked_add(i).ok_or(KernelError::InvalidArgument)?;
        check_range(table, addr, 1, Protection::READ)?;
        let mut byte = [0u8];
        machine.read_virt(addr, &mut byte)?;
        if byte[0] == 0 {
            return String::from_utf8(bytes).map_err(|_| KernelError::InvalidArgument);
        }
        bytes.push(byte[0]);
    }
    Err(KernelError::InvalidArgument)
}

/// Read a NULL-terminated vector of string pointers.
///
/// A null vector pointer reads as no arguments.
pub fn read_argv<M: Machine>(
    machine: &mut M,
    table: &PageTable,
    va: usize,
) -> KernelResult<Vec<String>> {
    let mut args = Vec::new();
    if va == 0 {
        return Ok(args);
    }
    for i in 0..=MAX_ARGS {
        let slot = va.checked_add(i * WORD_SIZE).ok_or(KernelError::InvalidArgument)?;
        let ptr = read_word(machine, table, slot)?;
        if ptr == 0 {
            return Ok(args);
        }
        args.push(read_cstr(machine, table, ptr)?);
    }
    Err(KernelError::InvalidArgument)
}

/// Store an `i32` into user memory
pub fn write_i32<M: Machine>(
    machine: &mut M,
    table: &PageTable,
    va: usize,
    value: i32,
) -> KernelResult<()> {
    check_range(table, va, 4, Protection::WRITE)?;
    machine.write_virt(va, &value.to_le_bytes())?;
    Ok(())
}
