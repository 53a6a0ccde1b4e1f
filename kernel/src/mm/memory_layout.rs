//! Memory Layout Definitions
//!
//! The frame newtype and the arithmetic that turns absolute virtual addresses
//! into page indices of the two region tables.

use crate::config::{
    KERNEL_STACK_BASE, PAGE_SIZE, PAGE_SIZE_BITS, REGION1_BASE, REGION1_LIMIT, REGION1_PAGES,
};
use core::fmt;

/// Align address up to page size
#[inline]
pub const fn align_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Align address down to page size
#[inline]
pub const fn align_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Physical frame number
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Frame(pub usize);

impl Frame {
    /// Physical address of the first byte of the frame
    pub fn addr(&self) -> usize {
        self.0 << PAGE_SIZE_BITS
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {:#x}", self.0)
    }
}

/// The two per-process tables
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Region {
    /// Kernel-stack window at the top of region 0
    KernelStack,
    /// Region 1, the user program
    User,
}

impl Region {
    /// Virtual address of page 0 of this region's table
    pub const fn base(self) -> usize {
        match self {
            Region::KernelStack => KERNEL_STACK_BASE,
            Region::User => REGION1_BASE,
        }
    }

    /// Virtual address of `page` in this region
    pub const fn page_va(self, page: usize) -> usize {
        self.base() + page * PAGE_SIZE
    }
}

/// Region 1 page index holding `va`, if `va` is a user address
pub fn user_page_of(va: usize) -> Option<usize> {
    if (REGION1_BASE..REGION1_LIMIT).contains(&va) {
        Some((va - REGION1_BASE) >> PAGE_SIZE_BITS)
    } else {
        None
    }
}

/// Region 1 page index of the first page boundary at or above `va`.
///
/// The region limit itself is accepted and maps to `REGION1_PAGES`.
pub fn user_page_ceil(va: usize) -> Option<usize> {
    if (REGION1_BASE..=REGION1_LIMIT).contains(&va) {
        Some((align_up(va) - REGION1_BASE) >> PAGE_SIZE_BITS)
    } else {
        None
    }
}

/// Virtual address of region 1 page `page`
pub const fn user_page_va(page: usize) -> usize {
    Region::User.page_va(page)
}

/// Whether `page` is a valid region 1 page index
pub const fn is_user_page(page: usize) -> bool {
    page < REGION1_PAGES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_page_arithmetic_is_relative_to_region1() {
        assert_eq!(user_page_of(REGION1_BASE), Some(0));
        assert_eq!(user_page_of(REGION1_BASE + PAGE_SIZE + 7), Some(1));
        assert_eq!(user_page_of(REGION1_LIMIT - 1), Some(REGION1_PAGES - 1));
        assert_eq!(user_page_of(REGION1_LIMIT), None);
        assert_eq!(user_page_of(REGION1_BASE - 1), None);

        assert_eq!(user_page_ceil(REGION1_BASE + 1), Some(1));
        assert_eq!(user_page_ceil(REGION1_BASE + PAGE_SIZE), Some(1));
        assert_eq!(user_page_ceil(REGION1_LIMIT), Some(REGION1_PAGES));
        assert_eq!(user_page_va(3), REGION1_BASE + 3 * PAGE_SIZE);
    }

    #[test]
    fn kernel_stack_region_sits_below_region1() {
        assert_eq!(Region::KernelStack.page_va(0), KERNEL_STACK_BASE);
        assert!(Region::KernelStack.page_va(crate::config::KERNEL_STACK_PAGES) <= REGION1_BASE);
        assert_eq!(align_down(REGION1_BASE + PAGE_SIZE - 1), REGION1_BASE);
        assert_eq!(align_up(REGION1_BASE + 1), REGION1_BASE + PAGE_SIZE);
    }
}
