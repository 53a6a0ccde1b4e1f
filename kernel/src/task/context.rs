//! Kernel Context
//!
//! Saved kernel-mode execution state of a process that is not running

/// Kernel context captured and restored by the machine's context switch
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct KernelContext {
    /// Return address (ra)
    pub ra: usize,
    /// Stack pointer (sp)
    pub sp: usize,
    /// Saved registers s0-s11
    pub s: [usize; 12],
}
