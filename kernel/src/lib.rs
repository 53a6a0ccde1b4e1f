//! Kairos kernel core
//!
//! Physical frames, per-process address spaces, the process life cycle and the
//! round-robin scheduler of a small teaching kernel. Everything that touches
//! real hardware goes through [`hal::Machine`], so the same core runs on a
//! board backend or on the bundled [`hal::sim::SimMachine`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod console;

pub mod config;
pub mod hal;
pub mod kernel;
pub mod loader;
pub mod logging;
pub mod mm;
pub mod syscall;
pub mod task;
pub mod trap;

use core::fmt;

pub use kernel::{BootParams, Kernel};
pub use task::{Pid, ProcessState};
pub use trap::{TrapKind, UserContext};

/// Generic failure code returned to user programs
pub const ERROR: isize = -1;

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Frame allocator exhausted
    OutOfMemory,
    /// Out-of-range or unmapped pointer, bad length or bad value
    InvalidArgument,
    /// Wait with no eligible children
    NoSuchChild,
    /// Fault that is not a legitimate stack-growth request
    ProtectionViolation,
    /// Program loader could not find the named executable
    NotFound,
    /// Program image is malformed or does not fit the user region
    BadFormat,
    /// A kernel-side virtual memory access faulted
    BadAddress(usize),
    /// Process id is not live
    NoSuchProcess,
}

impl KernelError {
    /// Result code handed back to user code in the return register
    pub const fn code(self) -> isize {
        match self {
            KernelError::InvalidArgument => ERROR,
            KernelError::OutOfMemory => -2,
            KernelError::NoSuchChild => -3,
            KernelError::ProtectionViolation => -4,
            KernelError::NotFound => -5,
            KernelError::BadFormat => -6,
            KernelError::BadAddress(_) => -7,
            KernelError::NoSuchProcess => -8,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory => write!(f, "out of physical frames"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::NoSuchChild => write!(f, "no child to wait for"),
            KernelError::ProtectionViolation => write!(f, "protection violation"),
            KernelError::NotFound => write!(f, "program not found"),
            KernelError::BadFormat => write!(f, "bad executable format"),
            KernelError::BadAddress(addr) => write!(f, "bad address {:#x}", addr),
            KernelError::NoSuchProcess => write!(f, "no such process"),
        }
    }
}

/// Kernel result type
pub type KernelResult<T> = Result<T, KernelError>;
