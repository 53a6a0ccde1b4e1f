//! Staging window
//!
//! One region 0 page just below the kernel-stack window. The kernel points it
//! at whatever frame it needs to reach, does its work through the window's
//! virtual address and then puts the old mapping back.

use super::memory_layout::Frame;
use super::page_table::{PageTableEntry, Protection};
use crate::config::{PAGE_SIZE, STAGING_VA, STAGING_VPN};
use crate::hal::{Machine, MemoryFault, TlbFlush};

/// Run `f` with `frame` mapped read/write at the staging address
pub fn with_frame<M, R>(machine: &mut M, frame: Frame, f: impl FnOnce(&mut M, usize) -> R) -> R
where
    M: Machine,
{
    let saved = machine.region0_entry(STAGING_VPN);
    machine.set_region0_entry(STAGING_VPN, PageTableEntry::new(frame, Protection::RW));
    machine.flush_tlb(TlbFlush::Page(STAGING_VA));

    let result = f(machine, STAGING_VA);

    machine.set_region0_entry(STAGING_VPN, saved);
    machine.flush_tlb(TlbFlush::Page(STAGING_VA));
    result
}

/// Copy the page mapped at `src_va` into `dst`
pub fn copy_page_into<M: Machine>(
    machine: &mut M,
    src_va: usize,
    dst: Frame,
) -> Result<(), MemoryFault> {
    with_frame(machine, dst, |machine, window| machine.copy_virt(src_va, window, PAGE_SIZE))
}

/// Fill every byte of `dst` with `byte`
pub fn fill_frame<M: Machine>(machine: &mut M, dst: Frame, byte: u8) -> Result<(), MemoryFault> {
    let page = [byte; PAGE_SIZE];
    with_frame(machine, dst, |machine, window| machine.write_virt(window, &page))
}
