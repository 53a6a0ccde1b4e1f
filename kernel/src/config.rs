//! Kernel configuration constants
//!
//! Region 0 holds the kernel image and, at its top, the kernel-stack window.
//! Region 1 holds the user program. Both are flat single-level tables.

/// Page size (4KB)
pub const PAGE_SIZE: usize = 0x1000;

/// Page size bits
pub const PAGE_SIZE_BITS: usize = 12;

/// Region 0 (kernel) base address
pub const REGION0_BASE: usize = 0;

/// Pages covered by the region 0 table
pub const REGION0_PAGES: usize = 128;

/// End of region 0 (exclusive)
pub const REGION0_LIMIT: usize = REGION0_BASE + REGION0_PAGES * PAGE_SIZE;

/// Region 1 (user) base address
pub const REGION1_BASE: usize = REGION0_LIMIT;

/// Pages covered by the region 1 table
pub const REGION1_PAGES: usize = 128;

/// End of region 1 (exclusive)
pub const REGION1_LIMIT: usize = REGION1_BASE + REGION1_PAGES * PAGE_SIZE;

/// Kernel stack pages per process
pub const KERNEL_STACK_PAGES: usize = 2;

/// Kernel stack size (8KB)
pub const KERNEL_STACK_SIZE: usize = KERNEL_STACK_PAGES * PAGE_SIZE;

/// Lowest address of the kernel-stack window
pub const KERNEL_STACK_BASE: usize = REGION0_LIMIT - KERNEL_STACK_SIZE;

/// First region 0 page of the kernel-stack window
pub const KERNEL_STACK_BASE_VPN: usize = KERNEL_STACK_BASE >> PAGE_SIZE_BITS;

/// Region 0 page the kernel repoints to reach arbitrary frames
pub const STAGING_VPN: usize = KERNEL_STACK_BASE_VPN - 1;

/// Virtual address of the staging page
pub const STAGING_VA: usize = STAGING_VPN << PAGE_SIZE_BITS;

/// Unmapped pages that must separate the heap from the stack
pub const HEAP_STACK_GAP_PAGES: usize = 1;

/// Clock ticks a process may run before round-robin preemption
pub const DEFAULT_TIME_SLICE: usize = 1;

/// Kernel text pages in the default boot layout
pub const DEFAULT_KERNEL_TEXT_PAGES: usize = 16;

/// Kernel data pages in the default boot layout
pub const DEFAULT_KERNEL_DATA_PAGES: usize = 16;

/// Longest string (including the NUL) accepted from user memory
pub const MAX_USER_STRING: usize = 256;

/// Most arguments accepted by Exec
pub const MAX_ARGS: usize = 32;

/// User word size
pub const WORD_SIZE: usize = 8;

/// Space reserved below argc on a fresh user stack
pub const INITIAL_STACK_FRAME_SIZE: usize = 16;

/// Status recorded for processes the kernel terminates
pub const ABORT_STATUS: i32 = -1;

/// Process id of the first process
pub const INIT_PID: usize = 0;

/// Number of trap vectors
pub const TRAP_VECTOR_SIZE: usize = 8;
