//! Software machine
//!
//! Physical memory is a byte array cut into frames. Region 0 is a live table
//! the kernel edits in place, region 1 is whatever table was last loaded.
//! Translations are cached until flushed, so a missing flush shows up as a
//! stale mapping just as it would on hardware.

use super::{FaultKind, KernelContext, Machine, MemoryFault, TlbFlush};
use crate::config::{
    KERNEL_STACK_BASE, KERNEL_STACK_SIZE, PAGE_SIZE, PAGE_SIZE_BITS, REGION0_PAGES, REGION1_BASE,
    REGION1_PAGES,
};
use crate::mm::{Frame, PageTable, PageTableEntry, Protection};
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

/// Return address the boot kernel context starts with
pub const BOOT_RETURN_ADDRESS: usize = 0xb007;

const REGION1_BASE_VPN: usize = REGION1_BASE >> PAGE_SIZE_BITS;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub context_switches: usize,
    pub tlb_flushes: usize,
    pub user_table_loads: usize,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

pub struct SimMachine {
    memory: Vec<u8>,
    frames: usize,
    region0: Vec<PageTableEntry>,
    region1: PageTable,
    tlb: BTreeMap<usize, PageTableEntry>,
    running: KernelContext,
    stats: SimStats,
}

impl SimMachine {
    /// Create a machine with `frames` physical frames, all zero
    pub fn new(frames: usize) -> Self {
        Self {
            memory: vec![0; frames * PAGE_SIZE],
            frames,
            region0: vec![PageTableEntry::invalid(); REGION0_PAGES],
            region1: PageTable::new(REGION1_PAGES),
            tlb: BTreeMap::new(),
            running: KernelContext {
                ra: BOOT_RETURN_ADDRESS,
                sp: KERNEL_STACK_BASE + KERNEL_STACK_SIZE,
                s: [0; 12],
            },
            stats: SimStats::default(),
        }
    }

    /// Raw contents of a physical frame
    pub fn physical(&self, frame: Frame) -> &[u8] {
        let start = frame.addr().min(self.memory.len());
        let end = (start + PAGE_SIZE).min(self.memory.len());
        &self.memory[start..end]
    }

    /// Kernel context currently executing
    pub fn running_context(&self) -> KernelContext {
        self.running
    }

    /// Region 1 table as last loaded
    pub fn user_table(&self) -> &PageTable {
        &self.region1
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    fn lookup(&mut self, vpn: usize) -> PageTableEntry {
        if let Some(pte) = self.tlb.get(&vpn) {
            return *pte;
        }
        let pte = if vpn < REGION0_PAGES {
            self.region0[vpn]
        } else if vpn >= REGION1_BASE_VPN {
            self.region1.entry(vpn - REGION1_BASE_VPN)
        } else {
            PageTableEntry::invalid()
        };
        if pte.is_valid() {
            self.tlb.insert(vpn, pte);
        }
        pte
    }

    fn translate(&mut self, va: usize, access: Access) -> Result<usize, MemoryFault> {
        let pte = self.lookup(va >> PAGE_SIZE_BITS);
        let unmapped = MemoryFault {
            addr: va,
            kind: FaultKind::Unmapped,
        };
        let frame = pte.frame().ok_or(unmapped)?;
        let needed = match access {
            Access::Read => Protection::READ,
            Access::Write => Protection::WRITE,
        };
        if !pte.protection().contains(needed) {
            return Err(MemoryFault {
                addr: va,
                kind: FaultKind::Protection,
            });
        }
        if frame.0 >= self.frames {
            return Err(unmapped);
        }
        Ok(frame.addr() + (va & (PAGE_SIZE - 1)))
    }
}

impl Machine for SimMachine {
    fn frame_count(&self) -> usize {
        self.frames
    }

    fn region0_entry(&self, vpn: usize) -> PageTableEntry {
        self.region0.get(vpn).copied().unwrap_or_default()
    }

    fn set_region0_entry(&mut self, vpn: usize, entry: PageTableEntry) {
        if let Some(slot) = self.region0.get_mut(vpn) {
            *slot = entry;
        }
    }

    fn load_user_table(&mut self, table: &PageTable) {
        self.stats.user_table_loads += 1;
        self.region1 = table.clone();
    }

    fn flush_tlb(&mut self, scope: TlbFlush) {
        self.stats.tlb_flushes += 1;
        match scope {
            TlbFlush::All => self.tlb.clear(),
            TlbFlush::Region0 => self.tlb.retain(|&vpn, _| vpn >= REGION1_BASE_VPN),
            TlbFlush::Region1 => self.tlb.retain(|&vpn, _| vpn < REGION1_BASE_VPN),
            TlbFlush::Page(va) => {
                self.tlb.remove(&(va >> PAGE_SIZE_BITS));
            }
        }
    }

    fn read_virt(&mut self, va: usize, buf: &mut [u8]) -> Result<(), MemoryFault> {
        let mut done = 0;
        while done < buf.len() {
            let addr = va + done;
            let pa = self.translate(addr, Access::Read)?;
            let chunk = (PAGE_SIZE - (addr & (PAGE_SIZE - 1))).min(buf.len() - done);
            buf[done..done + chunk].copy_from_slice(&self.memory[pa..pa + chunk]);
            done += chunk;
        }
        Ok(())
    }

    fn write_virt(&mut self, va: usize, data: &[u8]) -> Result<(), MemoryFault> {
        let mut done = 0;
        while done < data.len() {
            let addr = va + done;
            let pa = self.translate(addr, Access::Write)?;
            let chunk = (PAGE_SIZE - (addr & (PAGE_SIZE - 1))).min(data.len() - done);
            self.memory[pa..pa + chunk].copy_from_slice(&data[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    fn kernel_context_switch<F>(&mut self, switch: F)
    where
        F: FnOnce(&mut Self, KernelContext) -> KernelContext,
    {
        self.stats.context_switches += 1;
        // Callee-saved registers drift while a context runs
        let mut prev = self.running;
        prev.s[0] = self.stats.context_switches;
        self.running = switch(self, prev);
    }

    fn halt(&mut self, status: i32) -> ! {
        panic!("machine halted with status {}", status)
    }
}
