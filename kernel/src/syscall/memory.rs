//! Heap break and stack growth

use crate::config::HEAP_STACK_GAP_PAGES;
use crate::hal::Machine;
use crate::kernel::Kernel;
use crate::mm::{user_page_ceil, user_page_of, Protection, Region};
use crate::trap::{UserContext, FAULT_MAPERR};
use crate::{KernelError, KernelResult};
use alloc::vec::Vec;

impl<M: Machine> Kernel<M> {
    /// Brk(addr): move the heap break to the page boundary at or above `addr`
    pub(crate) fn sys_brk(&mut self, uc: &mut UserContext) {
        let result = self.set_break(uc.regs[0]);
        uc.set_return(result.map_or_else(|err| err.code(), |()| 0));
    }

    fn set_break(&mut self, addr: usize) -> KernelResult<()> {
        let pid = self.sched.current().ok_or(KernelError::NoSuchProcess)?;
        let pcb = self.procs.get_mut(pid).ok_or(KernelError::NoSuchProcess)?;
        let new = user_page_ceil(addr).ok_or(KernelError::InvalidArgument)?;
        if new < pcb.heap_base || new + HEAP_STACK_GAP_PAGES > pcb.stack_floor {
            return Err(KernelError::InvalidArgument);
        }

        let old = pcb.brk;
        if new > old {
            let mut grown = Vec::new();
            for page in old..new {
                if pcb.space.is_mapped(Region::User, page) {
                    continue;
                }
                match pcb.space.map_zeroed(
                    Region::User,
                    page,
                    Protection::RW,
                    &mut self.machine,
                    &mut self.frames,
                ) {
                    Ok(_) => grown.push(page),
                    Err(err) => {
                        for page in grown {
                            pcb.space.unmap(Region::User, page, &mut self.frames)?;
                        }
                        pcb.space.activate_user(&mut self.machine);
                        return Err(err);
                    }
                }
            }
        } else {
            for page in new..old {
                if pcb.space.is_mapped(Region::User, page) {
                    pcb.space.unmap(Region::User, page, &mut self.frames)?;
                }
            }
        }

        pcb.brk = new;
        pcb.space.activate_user(&mut self.machine);
        log::debug!("process {} break {} -> {}", pid, old, new);
        Ok(())
    }

    /// Memory trap: grow the stack down to the faulting page, or kill the
    /// process
    pub(crate) fn on_memory_fault(&mut self, uc: &mut UserContext) {
        if let Err(err) = self.grow_stack(uc.code, uc.addr) {
            log::warn!("memory fault at {:#x} (code {}, pc {:#x})", uc.addr, uc.code, uc.pc);
            self.abort_current(err, uc);
        }
    }

    fn grow_stack(&mut self, code: usize, addr: usize) -> KernelResult<()> {
        if code != FAULT_MAPERR {
            return Err(KernelError::ProtectionViolation);
        }
        let pid = self.sched.current().ok_or(KernelError::NoSuchProcess)?;
        let pcb = self.procs.get_mut(pid).ok_or(KernelError::NoSuchProcess)?;
        let page = user_page_of(addr).ok_or(KernelError::ProtectionViolation)?;
        if page < pcb.brk + HEAP_STACK_GAP_PAGES || page >= pcb.stack_floor {
            return Err(KernelError::ProtectionViolation);
        }

        for p in page..pcb.stack_floor {
            pcb.space
                .map_zeroed(Region::User, p, Protection::RW, &mut self.machine, &mut self.frames)?;
        }
        log::debug!("process {} stack {} -> {}", pid, pcb.stack_floor, page);
        pcb.stack_floor = page;
        pcb.space.activate_user(&mut self.machine);
        Ok(())
    }
}
