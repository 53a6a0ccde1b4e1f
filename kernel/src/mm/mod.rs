//! Memory Management Module
//!
//! - Physical memory allocation (frame allocator)
//! - Flat page tables for the two hardware regions
//! - Per-process address spaces and the staging window used to copy frames
//! - Checked access to user memory

pub mod address_space;
pub mod frame_allocator;
pub mod memory_layout;
pub mod page_table;
pub mod staging;
pub mod user;

pub use address_space::AddressSpace;
pub use frame_allocator::FrameAllocator;
pub use memory_layout::*;
pub use page_table::{PageTable, PageTableEntry, Protection};
