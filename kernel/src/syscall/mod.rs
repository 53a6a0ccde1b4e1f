//! System call dispatch
//!
//! The call number arrives in `UserContext::code` and the arguments in
//! `regs`. Every handler leaves its result in `regs[0]` of whichever process
//! the trap frame belongs to when it returns.

mod memory;
mod process;

use crate::hal::Machine;
use crate::kernel::Kernel;
use crate::trap::UserContext;
use crate::KernelError;

pub const SYSCALL_FORK: usize = 1;
pub const SYSCALL_EXEC: usize = 2;
pub const SYSCALL_EXIT: usize = 3;
pub const SYSCALL_WAIT: usize = 4;
pub const SYSCALL_GETPID: usize = 5;
pub const SYSCALL_BRK: usize = 6;
pub const SYSCALL_DELAY: usize = 7;

impl<M: Machine> Kernel<M> {
    pub(crate) fn dispatch_syscall(&mut self, uc: &mut UserContext) {
        match uc.code {
            SYSCALL_FORK => self.sys_fork(uc),
            SYSCALL_EXEC => self.sys_exec(uc),
            SYSCALL_EXIT => self.sys_exit(uc),
            SYSCALL_WAIT => self.sys_wait(uc),
            SYSCALL_GETPID => self.sys_getpid(uc),
            SYSCALL_BRK => self.sys_brk(uc),
            SYSCALL_DELAY => self.sys_delay(uc),
            id => {
                log::warn!("unsupported syscall {}", id);
                uc.set_return(KernelError::InvalidArgument.code());
            }
        }
    }
}
