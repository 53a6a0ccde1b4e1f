//! Page Table Management
//!
//! Both hardware regions use flat, single-level tables: one entry per page,
//! indexed by page number relative to the start of the table.

use super::memory_layout::Frame;
use alloc::vec::Vec;
use core::fmt::{self, Debug, Formatter};

bitflags::bitflags! {
    /// Access rights of a mapped page
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Protection: u8 {
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const EXEC = 1 << 3;
    }
}

impl Protection {
    pub const RW: Self = Self::READ.union(Self::WRITE);
    pub const RX: Self = Self::READ.union(Self::EXEC);
}

/// Valid flag
const PTE_VALID: usize = 1 << 0;
/// Bits holding the protection
const PTE_PROT_MASK: usize = 0b1110;
/// First bit of the frame number
const PTE_FRAME_SHIFT: usize = 10;

/// Page Table Entry
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct PageTableEntry {
    bits: usize,
}

impl PageTableEntry {
    /// Create a new invalid PTE
    pub const fn invalid() -> Self {
        Self { bits: 0 }
    }

    /// Create a valid PTE for `frame`
    pub fn new(frame: Frame, prot: Protection) -> Self {
        Self {
            bits: (frame.0 << PTE_FRAME_SHIFT) | prot.bits() as usize | PTE_VALID,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.bits & PTE_VALID != 0
    }

    /// Backing frame, only for valid entries
    pub fn frame(&self) -> Option<Frame> {
        if self.is_valid() {
            Some(Frame(self.bits >> PTE_FRAME_SHIFT))
        } else {
            None
        }
    }

    pub fn protection(&self) -> Protection {
        Protection::from_bits_truncate((self.bits & PTE_PROT_MASK) as u8)
    }

    /// Same frame and validity, new protection
    pub fn with_protection(self, prot: Protection) -> Self {
        Self {
            bits: (self.bits & !PTE_PROT_MASK) | prot.bits() as usize,
        }
    }

    /// Clear the PTE
    pub fn clear(&mut self) {
        self.bits = 0;
    }
}

impl Default for PageTableEntry {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Debug for PageTableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.frame() {
            Some(frame) => f
                .debug_struct("PTE")
                .field("frame", &frame)
                .field("prot", &self.protection())
                .finish(),
            None => write!(f, "PTE(invalid)"),
        }
    }
}

/// Fixed-length page table
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    /// Create a table of `len` invalid entries
    pub fn new(len: usize) -> Self {
        Self {
            entries: alloc::vec![PageTableEntry::invalid(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`; out-of-range indices read as invalid
    pub fn entry(&self, index: usize) -> PageTableEntry {
        self.entries.get(index).copied().unwrap_or_default()
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(index)
    }

    /// Iterate over `(index, frame, protection)` of every valid entry
    pub fn valid_entries(&self) -> impl Iterator<Item = (usize, Frame, Protection)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, pte)| pte.frame().map(|frame| (index, frame, pte.protection())))
    }

    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|pte| pte.is_valid()).count()
    }
}
