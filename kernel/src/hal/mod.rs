//! Hardware abstraction
//!
//! The core never touches registers directly. A backend implements
//! [`Machine`] for the board it runs on; [`sim::SimMachine`] implements it in
//! software.

pub mod sim;

use crate::mm::{PageTable, PageTableEntry};
use alloc::vec;

pub use crate::task::KernelContext;

/// Translation-cache invalidation scope
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TlbFlush {
    All,
    Region0,
    Region1,
    /// The single page containing this virtual address
    Page(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// No valid translation
    Unmapped,
    /// Translation exists but forbids the access
    Protection,
}

/// A kernel-mode virtual access that the MMU refused
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryFault {
    pub addr: usize,
    pub kind: FaultKind,
}

impl From<MemoryFault> for crate::KernelError {
    fn from(fault: MemoryFault) -> Self {
        crate::KernelError::BadAddress(fault.addr)
    }
}

/// Primitives the kernel core consumes from the hardware layer
pub trait Machine {
    /// Physical frames installed
    fn frame_count(&self) -> usize;

    /// Live region 0 entry for page `vpn`
    fn region0_entry(&self, vpn: usize) -> PageTableEntry;

    /// Overwrite the live region 0 entry for page `vpn`.
    ///
    /// Cached translations stay in effect until flushed.
    fn set_region0_entry(&mut self, vpn: usize, entry: PageTableEntry);

    /// Point the region 1 base register at `table`.
    ///
    /// The hardware latches the table; later edits must be loaded again.
    fn load_user_table(&mut self, table: &PageTable);

    fn flush_tlb(&mut self, scope: TlbFlush);

    /// Kernel-mode read through the current translation
    fn read_virt(&mut self, va: usize, buf: &mut [u8]) -> Result<(), MemoryFault>;

    /// Kernel-mode write through the current translation
    fn write_virt(&mut self, va: usize, data: &[u8]) -> Result<(), MemoryFault>;

    /// Virtual-to-virtual copy
    fn copy_virt(&mut self, src: usize, dst: usize, len: usize) -> Result<(), MemoryFault> {
        let mut buf = vec![0u8; len];
        self.read_virt(src, &mut buf)?;
        self.write_virt(dst, &buf)
    }

    /// Atomically move onto a new kernel stack.
    ///
    /// `switch` runs with the snapshot of the context being left and returns
    /// the snapshot to resume. It may remap the kernel-stack window.
    fn kernel_context_switch<F>(&mut self, switch: F)
    where
        F: FnOnce(&mut Self, KernelContext) -> KernelContext;

    /// Stop the machine
    fn halt(&mut self, status: i32) -> !;
}
