//! Trap handling
//!
//! Every entry from user mode carries a vector number in the saved
//! [`UserContext`]. The kernel looks the vector up in a table of handlers
//! built at boot and runs the handler on the trap frame; whatever is in the
//! frame afterwards is what returns to user mode.

mod context;

pub use context::{UserContext, FAULT_ACCERR, FAULT_MAPERR, USER_REGS};

use crate::config::TRAP_VECTOR_SIZE;
use crate::hal::Machine;
use crate::kernel::Kernel;
use crate::KernelError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum TrapKind {
    /// System call
    Kernel = 0,
    Clock = 1,
    Illegal = 2,
    /// User access to an unmapped or protected address
    Memory = 3,
    Math = 4,
    TtyReceive = 5,
    TtyTransmit = 6,
    Disk = 7,
}

impl TrapKind {
    pub const ALL: [TrapKind; TRAP_VECTOR_SIZE] = [
        TrapKind::Kernel,
        TrapKind::Clock,
        TrapKind::Illegal,
        TrapKind::Memory,
        TrapKind::Math,
        TrapKind::TtyReceive,
        TrapKind::TtyTransmit,
        TrapKind::Disk,
    ];

    pub fn from_vector(vector: usize) -> Option<Self> {
        Self::ALL.get(vector).copied()
    }

    pub fn vector(self) -> usize {
        self as usize
    }
}

pub type TrapHandler<M> = fn(&mut Kernel<M>, &mut UserContext);

/// Handler per trap vector
pub struct TrapTable<M: Machine> {
    handlers: [TrapHandler<M>; TRAP_VECTOR_SIZE],
}

impl<M: Machine> TrapTable<M> {
    pub fn new() -> Self {
        let mut handlers = [ignored_trap::<M> as TrapHandler<M>; TRAP_VECTOR_SIZE];
        handlers[TrapKind::Kernel.vector()] = syscall_trap::<M>;
        handlers[TrapKind::Clock.vector()] = clock_trap::<M>;
        handlers[TrapKind::Illegal.vector()] = fatal_trap::<M>;
        handlers[TrapKind::Memory.vector()] = memory_trap::<M>;
        handlers[TrapKind::Math.vector()] = fatal_trap::<M>;
        Self { handlers }
    }

    pub fn handler(&self, kind: TrapKind) -> TrapHandler<M> {
        self.handlers[kind.vector()]
    }

    pub fn set(&mut self, kind: TrapKind, handler: TrapHandler<M>) {
        self.handlers[kind.vector()] = handler;
    }
}

impl<M: Machine> Default for TrapTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Machine> Kernel<M> {
    /// Entry point for every trap taken from user mode
    pub fn handle_trap(&mut self, uc: &mut UserContext) {
        match TrapKind::from_vector(uc.vector) {
            Some(kind) => {
                let handler = self.traps.handler(kind);
                handler(self, uc);
            }
            None => {
                log::warn!("unknown trap vector {} at pc {:#x}", uc.vector, uc.pc);
                self.abort_current(KernelError::InvalidArgument, uc);
            }
        }
    }

    /// Take trap `kind` with the details already in `uc`
    pub fn trap(&mut self, kind: TrapKind, uc: &mut UserContext) {
        uc.vector = kind.vector();
        self.handle_trap(uc);
    }

    /// Route `kind` to `handler`, e.g. for a terminal or disk driver
    pub fn set_trap_handler(&mut self, kind: TrapKind, handler: TrapHandler<M>) {
        self.traps.set(kind, handler);
    }
}

fn syscall_trap<M: Machine>(kernel: &mut Kernel<M>, uc: &mut UserContext) {
    kernel.dispatch_syscall(uc);
}

fn clock_trap<M: Machine>(kernel: &mut Kernel<M>, uc: &mut UserContext) {
    kernel.on_clock_tick(uc);
}

fn memory_trap<M: Machine>(kernel: &mut Kernel<M>, uc: &mut UserContext) {
    kernel.on_memory_fault(uc);
}

fn fatal_trap<M: Machine>(kernel: &mut Kernel<M>, uc: &mut UserContext) {
    log::warn!("trap {} at pc {:#x} (code {})", uc.vector, uc.pc, uc.code);
    kernel.abort_current(KernelError::ProtectionViolation, uc);
}

fn ignored_trap<M: Machine>(_kernel: &mut Kernel<M>, uc: &mut UserContext) {
    log::trace!("ignoring trap {}", uc.vector);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_round_trip() {
        for (vector, kind) in TrapKind::ALL.iter().enumerate() {
            assert_eq!(TrapKind::from_vector(vector), Some(*kind));
            assert_eq!(kind.vector(), vector);
        }
        assert_eq!(TrapKind::from_vector(TRAP_VECTOR_SIZE), None);
    }
}
