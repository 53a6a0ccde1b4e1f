//! Address Space Management
//!
//! A process owns two tables: the kernel-stack table, which is copied into
//! the region 0 window whenever the process is dispatched, and the region 1
//! user table. Every valid entry owns its frame exclusively.

use super::frame_allocator::FrameAllocator;
use super::memory_layout::{Frame, Region};
use super::page_table::{PageTable, PageTableEntry, Protection};
use super::staging;
use crate::config::{KERNEL_STACK_BASE_VPN, KERNEL_STACK_PAGES, REGION1_PAGES};
use crate::hal::{Machine, TlbFlush};
use crate::{KernelError, KernelResult};
use alloc::vec::Vec;

pub struct AddressSpace {
    kernel_stack: PageTable,
    user: PageTable,
}

impl AddressSpace {
    /// Create an address space with no valid pages
    pub fn new() -> Self {
        Self {
            kernel_stack: PageTable::new(KERNEL_STACK_PAGES),
            user: PageTable::new(REGION1_PAGES),
        }
    }

    pub fn table(&self, region: Region) -> &PageTable {
        match region {
            Region::KernelStack => &self.kernel_stack,
            Region::User => &self.user,
        }
    }

    fn table_mut(&mut self, region: Region) -> &mut PageTable {
        match region {
            Region::KernelStack => &mut self.kernel_stack,
            Region::User => &mut self.user,
        }
    }

    pub fn user_table(&self) -> &PageTable {
        &self.user
    }

    pub fn kernel_stack_table(&self) -> &PageTable {
        &self.kernel_stack
    }

    pub fn is_mapped(&self, region: Region, page: usize) -> bool {
        self.table(region).entry(page).is_valid()
    }

    /// Backing frame of `page`, if mapped
    pub fn frame(&self, region: Region, page: usize) -> Option<Frame> {
        self.table(region).entry(page).frame()
    }

    /// Back `page` with a fresh frame.
    ///
    /// On exhaustion the entry is left untouched.
    pub fn map(
        &mut self,
        region: Region,
        page: usize,
        prot: Protection,
        frames: &mut FrameAllocator,
    ) -> KernelResult<Frame> {
        let entry = self.table_mut(region).entry_mut(page).ok_or(KernelError::InvalidArgument)?;
        if entry.is_valid() {
            return Err(KernelError::InvalidArgument);
        }
        let frame = frames.allocate()?;
        *entry = PageTableEntry::new(frame, prot);
        Ok(frame)
    }

    /// Like [`AddressSpace::map`], but the new page reads as zeros
    pub fn map_zeroed<M: Machine>(
        &mut self,
        region: Region,
        page: usize,
        prot: Protection,
        machine: &mut M,
        frames: &mut FrameAllocator,
    ) -> KernelResult<Frame> {
        let frame = self.map(region, page, prot, frames)?;
        if let Err(fault) = staging::fill_frame(machine, frame, 0) {
            self.unmap(region, page, frames)?;
            return Err(fault.into());
        }
        Ok(frame)
    }

    /// Invalidate `page` and give its frame back
    pub fn unmap(
        &mut self,
        region: Region,
        page: usize,
        frames: &mut FrameAllocator,
    ) -> KernelResult<Frame> {
        let entry = self.table_mut(region).entry_mut(page).ok_or(KernelError::InvalidArgument)?;
        let frame = entry.frame().ok_or(KernelError::InvalidArgument)?;
        entry.clear();
        frames.release(frame);
        Ok(frame)
    }

    /// Change the protection of a mapped page
    pub fn protect(&mut self, region: Region, page: usize, prot: Protection) -> KernelResult<()> {
        let entry = self.table_mut(region).entry_mut(page).ok_or(KernelError::InvalidArgument)?;
        if !entry.is_valid() {
            return Err(KernelError::InvalidArgument);
        }
        *entry = entry.with_protection(prot);
        Ok(())
    }

    /// Give `target` a private copy of every valid page.
    ///
    /// `self` must be the active address space and `target` must be empty.
    /// Every frame is allocated before anything is copied; if the allocator
    /// runs dry `target` is emptied again and nothing leaks. Kernel-stack
    /// pages are only allocated: their contents are cloned when the target
    /// is first dispatched.
    pub fn duplicate_into<M: Machine>(
        &self,
        target: &mut AddressSpace,
        machine: &mut M,
        frames: &mut FrameAllocator,
    ) -> KernelResult<()> {
        let pages: Vec<(Region, usize, Protection)> = [Region::KernelStack, Region::User]
            .into_iter()
            .flat_map(|region| {
                self.table(region)
                    .valid_entries()
                    .map(move |(page, _, prot)| (region, page, prot))
            })
            .collect();

        for &(region, page, prot) in &pages {
            if let Err(err) = target.map(region, page, prot, frames) {
                target.release_all(frames);
                return Err(err);
            }
        }

        for &(region, page, _) in pages.iter().filter(|(region, ..)| *region == Region::User) {
            let Some(dst) = target.frame(region, page) else {
                continue;
            };
            if let Err(fault) = staging::copy_page_into(machine, region.page_va(page), dst) {
                target.release_all(frames);
                return Err(fault.into());
            }
        }
        log::trace!("duplicated {} pages", pages.len());
        Ok(())
    }

    /// Move the active kernel stack onto freshly allocated frames.
    ///
    /// The current stack contents are copied across so execution continues
    /// unchanged, the window is repointed and the old frames are released.
    pub fn renew_kernel_stack<M: Machine>(
        &mut self,
        machine: &mut M,
        frames: &mut FrameAllocator,
    ) -> KernelResult<()> {
        for page in 0..KERNEL_STACK_PAGES {
            let fresh = frames.allocate()?;
            if let Err(fault) =
                staging::copy_page_into(machine, Region::KernelStack.page_va(page), fresh)
            {
                frames.release(fresh);
                return Err(fault.into());
            }
            let entry = PageTableEntry::new(fresh, Protection::RW);
            let old = self.kernel_stack.entry(page).frame();
            if let Some(slot) = self.kernel_stack.entry_mut(page) {
                *slot = entry;
            }
            machine.set_region0_entry(KERNEL_STACK_BASE_VPN + page, entry);
            machine.flush_tlb(TlbFlush::Page(Region::KernelStack.page_va(page)));
            if let Some(old) = old {
                frames.release(old);
            }
        }
        Ok(())
    }

    /// Unmap every valid page of one region
    pub fn release_region(&mut self, region: Region, frames: &mut FrameAllocator) {
        let table = self.table_mut(region);
        for page in 0..table.len() {
            if let Some(entry) = table.entry_mut(page) {
                if let Some(frame) = entry.frame() {
                    entry.clear();
                    frames.release(frame);
                }
            }
        }
    }

    /// Unmap every valid page of both regions
    pub fn release_all(&mut self, frames: &mut FrameAllocator) {
        self.release_region(Region::KernelStack, frames);
        self.release_region(Region::User, frames);
    }

    /// Record the live kernel-stack window as this space's kernel stack
    pub fn save_kernel_stack_window<M: Machine>(&mut self, machine: &M) {
        for page in 0..KERNEL_STACK_PAGES {
            if let Some(slot) = self.kernel_stack.entry_mut(page) {
                *slot = machine.region0_entry(KERNEL_STACK_BASE_VPN + page);
            }
        }
    }

    /// Point the kernel-stack window and the user table at this space.
    ///
    /// The caller flushes.
    pub fn install<M: Machine>(&self, machine: &mut M) {
        for page in 0..KERNEL_STACK_PAGES {
            machine.set_region0_entry(KERNEL_STACK_BASE_VPN + page, self.kernel_stack.entry(page));
        }
        machine.load_user_table(&self.user);
    }

    /// Load the user table into the MMU and drop stale region 1 translations
    pub fn activate_user<M: Machine>(&self, machine: &mut M) {
        machine.load_user_table(&self.user);
        machine.flush_tlb(TlbFlush::Region1);
    }

    /// Valid pages across both tables
    pub fn valid_pages(&self) -> usize {
        self.kernel_stack.valid_count() + self.user.valid_count()
    }

    /// Every frame this address space owns
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        self.kernel_stack
            .valid_entries()
            .chain(self.user.valid_entries())
            .map(|(_, frame, _)| frame)
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REGION0_PAGES;
    use crate::hal::sim::SimMachine;

    fn setup(pool: usize) -> (SimMachine, FrameAllocator) {
        (
            SimMachine::new(REGION0_PAGES + pool),
            FrameAllocator::new(REGION0_PAGES..REGION0_PAGES + pool),
        )
    }

    #[test]
    fn map_and_unmap_conserve_frames() {
        let (_, mut frames) = setup(4);
        let mut space = AddressSpace::new();
        let frame = space.map(Region::User, 3, Protection::RW, &mut frames).unwrap();
        assert_eq!(space.frame(Region::User, 3), Some(frame));
        assert_eq!(frames.free_frames() + space.valid_pages(), 4);

        assert_eq!(
            space.map(Region::User, 3, Protection::RW, &mut frames),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(space.unmap(Region::User, 3, &mut frames), Ok(frame));
        assert_eq!(space.unmap(Region::User, 3, &mut frames), Err(KernelError::InvalidArgument));
        assert_eq!(frames.free_frames(), 4);
    }

    #[test]
    fn failed_map_leaves_entry_untouched() {
        let (_, mut frames) = setup(1);
        let mut space = AddressSpace::new();
        space.map(Region::User, 0, Protection::RW, &mut frames).unwrap();
        assert_eq!(
            space.map(Region::User, 1, Protection::RW, &mut frames),
            Err(KernelError::OutOfMemory)
        );
        assert!(!space.is_mapped(Region::User, 1));
    }

    #[test]
    fn duplicate_copies_bytes_into_distinct_frames() {
        let (mut machine, mut frames) = setup(8);
        let mut parent = AddressSpace::new();
        parent.map_zeroed(Region::User, 0, Protection::RW, &mut machine, &mut frames).unwrap();
        parent.map_zeroed(Region::User, 5, Protection::RX, &mut machine, &mut frames).unwrap();
        parent.activate_user(&mut machine);
        machine.write_virt(Region::User.page_va(0), b"sentinel").unwrap();

        let mut child = AddressSpace::new();
        parent.duplicate_into(&mut child, &mut machine, &mut frames).unwrap();

        let parent_frame = parent.frame(Region::User, 0).unwrap();
        let child_frame = child.frame(Region::User, 0).unwrap();
        assert_ne!(parent_frame, child_frame);
        assert_eq!(&machine.physical(child_frame)[..8], b"sentinel");
        assert_eq!(child.table(Region::User).entry(5).protection(), Protection::RX);
        assert_eq!(frames.free_frames() + parent.valid_pages() + child.valid_pages(), 8);
    }

    #[test]
    fn duplicate_leaves_the_kernel_stack_to_the_first_dispatch() {
        let (mut machine, mut frames) = setup(8);
        let mut parent = AddressSpace::new();
        for page in 0..KERNEL_STACK_PAGES {
            let frame = parent.map(Region::KernelStack, page, Protection::RW, &mut frames).unwrap();
            machine.set_region0_entry(
                KERNEL_STACK_BASE_VPN + page,
                PageTableEntry::new(frame, Protection::RW),
            );
        }
        machine.write_virt(Region::KernelStack.page_va(0), b"frames").unwrap();
        let copies = machine.stats().tlb_flushes;

        let mut child = AddressSpace::new();
        parent.duplicate_into(&mut child, &mut machine, &mut frames).unwrap();

        let child_frame = child.frame(Region::KernelStack, 0).unwrap();
        assert_ne!(Some(child_frame), parent.frame(Region::KernelStack, 0));
        assert!(machine.physical(child_frame).iter().all(|&b| b == 0));
        assert_eq!(machine.stats().tlb_flushes, copies);
        assert_eq!(child.valid_pages(), KERNEL_STACK_PAGES);
    }

    #[test]
    fn duplicate_rolls_back_on_exhaustion() {
        let (mut machine, mut frames) = setup(5);
        let mut parent = AddressSpace::new();
        for page in 0..3 {
            parent
                .map_zeroed(Region::User, page, Protection::RW, &mut machine, &mut frames)
                .unwrap();
        }
        parent.activate_user(&mut machine);

        let mut child = AddressSpace::new();
        let err = parent.duplicate_into(&mut child, &mut machine, &mut frames);
        assert_eq!(err, Err(KernelError::OutOfMemory));
        assert_eq!(child.valid_pages(), 0);
        assert_eq!(frames.free_frames(), 2);
    }

    #[test]
    fn renewed_kernel_stack_keeps_its_contents() {
        let (mut machine, mut frames) = setup(8);
        let mut space = AddressSpace::new();
        for page in 0..KERNEL_STACK_PAGES {
            let frame = space.map(Region::KernelStack, page, Protection::RW, &mut frames).unwrap();
            machine.set_region0_entry(
                KERNEL_STACK_BASE_VPN + page,
                PageTableEntry::new(frame, Protection::RW),
            );
        }
        let top = Region::KernelStack.page_va(KERNEL_STACK_PAGES) - 8;
        machine.write_virt(top, b"retaddr!").unwrap();
        let old: Vec<Frame> = space.frames().collect();

        space.renew_kernel_stack(&mut machine, &mut frames).unwrap();

        let new: Vec<Frame> = space.frames().collect();
        assert!(new.iter().all(|f| !old.contains(f)));
        assert!(old.iter().all(|&f| frames.is_free(f)));
        let mut buf = [0u8; 8];
        machine.read_virt(top, &mut buf).unwrap();
        assert_eq!(&buf, b"retaddr!");
        assert_eq!(frames.free_frames() + space.valid_pages(), 8);
        assert_eq!(machine.region0_entry(KERNEL_STACK_BASE_VPN).frame(), Some(new[0]));
    }

    #[test]
    fn release_all_returns_everything() {
        let (mut machine, mut frames) = setup(6);
        let mut space = AddressSpace::new();
        space.map(Region::KernelStack, 0, Protection::RW, &mut frames).unwrap();
        space.map_zeroed(Region::User, 9, Protection::RW, &mut machine, &mut frames).unwrap();
        space.release_all(&mut frames);
        assert_eq!(space.valid_pages(), 0);
        assert_eq!(frames.free_frames(), 6);
    }
}
