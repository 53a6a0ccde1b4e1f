//! Process life-cycle system calls

use crate::config::INIT_PID;
use crate::hal::Machine;
use crate::kernel::Kernel;
use crate::loader::LoadTarget;
use crate::mm::{is_user_page, user, AddressSpace, FrameAllocator, Protection, Region};
use crate::task::{Block, Pid, ProcessState};
use crate::trap::UserContext;
use crate::{KernelError, KernelResult};
use alloc::string::String;

/// Why an Exec did not produce a new image
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ExecFailure {
    /// The caller's image is intact and gets the error code
    Rejected(KernelError),
    /// The caller's image was already torn down
    Fatal(KernelError),
}

impl ExecFailure {
    pub fn error(self) -> KernelError {
        match self {
            ExecFailure::Rejected(err) | ExecFailure::Fatal(err) => err,
        }
    }
}

/// Loader access to the address space of the process being exec'd
struct ExecTarget<'a, M: Machine> {
    machine: &'a mut M,
    frames: &'a mut FrameAllocator,
    space: &'a mut AddressSpace,
    committed: bool,
}

impl<M: Machine> LoadTarget for ExecTarget<'_, M> {
    fn commit(&mut self) -> KernelResult<()> {
        self.committed = true;
        self.space.release_region(Region::User, self.frames);
        self.space.activate_user(self.machine);
        self.space.renew_kernel_stack(self.machine, self.frames)
    }

    fn map(&mut self, first_page: usize, count: usize, prot: Protection) -> KernelResult<()> {
        if !self.committed {
            return Err(KernelError::InvalidArgument);
        }
        for page in first_page..first_page.saturating_add(count) {
            if !is_user_page(page) {
                return Err(KernelError::InvalidArgument);
            }
            if self.space.is_mapped(Region::User, page) {
                let current = self.space.table(Region::User).entry(page).protection();
                self.space.protect(Region::User, page, current | prot)?;
            } else {
                self.space
                    .map_zeroed(Region::User, page, prot, self.machine, self.frames)?;
            }
        }
        self.space.activate_user(self.machine);
        Ok(())
    }

    fn write(&mut self, va: usize, data: &[u8]) -> KernelResult<()> {
        if !self.committed {
            return Err(KernelError::InvalidArgument);
        }
        user::check_range(self.space.user_table(), va, data.len(), Protection::WRITE)?;
        self.machine.write_virt(va, data)?;
        Ok(())
    }

    fn protect(&mut self, first_page: usize, count: usize, prot: Protection) -> KernelResult<()> {
        if !self.committed {
            return Err(KernelError::InvalidArgument);
        }
        for page in first_page..first_page.saturating_add(count) {
            self.space.protect(Region::User, page, prot)?;
        }
        self.space.activate_user(self.machine);
        Ok(())
    }
}

impl<M: Machine> Kernel<M> {
    /// Replace the image of `pid`, which must be the running process.
    ///
    /// Shared by boot and Exec.
    pub(crate) fn load_program(
        &mut self,
        pid: Pid,
        name: &str,
        args: &[String],
    ) -> Result<(), ExecFailure> {
        let pcb = self
            .procs
            .get_mut(pid)
            .ok_or(ExecFailure::Rejected(KernelError::NoSuchProcess))?;
        let mut target = ExecTarget {
            machine: &mut self.machine,
            frames: &mut self.frames,
            space: &mut pcb.space,
            committed: false,
        };
        let result = self.loader.load(name, args, &mut target);
        let committed = target.committed;

        let image = match result {
            Ok(image) => image,
            Err(err) if committed => return Err(ExecFailure::Fatal(err.into())),
            Err(err) => return Err(ExecFailure::Rejected(err.into())),
        };
        pcb.user_cx = UserContext::app_init_context(image.entry, image.stack_pointer);
        pcb.heap_base = image.heap_start_page;
        pcb.brk = image.heap_start_page;
        pcb.stack_floor = image.stack_floor_page;
        pcb.kernel_cx = None;
        Ok(())
    }

    /// Fork(): the parent gets the child's pid, the child gets 0 and runs
    /// first
    pub(crate) fn sys_fork(&mut self, uc: &mut UserContext) {
        let Some(parent) = self.sched.current() else {
            return;
        };
        let mut space = AddressSpace::new();
        let duplicated = match self.procs.get(parent) {
            Some(pcb) => pcb.space.duplicate_into(&mut space, &mut self.machine, &mut self.frames),
            None => Err(KernelError::NoSuchProcess),
        };
        if let Err(err) = duplicated {
            log::warn!("fork of process {} failed: {}", parent, err);
            uc.set_return(err.code());
            return;
        }

        let (heap_base, brk, stack_floor) = match self.procs.get_mut(parent) {
            Some(pcb) => (pcb.heap_base, pcb.brk, pcb.stack_floor),
            None => return,
        };
        let child = self.procs.spawn(Some(parent), space);
        if let Some(pcb) = self.procs.get_mut(child) {
            pcb.user_cx = uc.clone();
            pcb.user_cx.set_return(0);
            pcb.heap_base = heap_base;
            pcb.brk = brk;
            pcb.stack_floor = stack_floor;
            pcb.state = ProcessState::Ready;
        }
        if let Some(pcb) = self.procs.get_mut(parent) {
            pcb.children.push(child);
            pcb.state = ProcessState::Ready;
        }
        log::info!("process {} forked process {}", parent, child);

        uc.set_return(child.0 as isize);
        self.sched.push_ready(parent);
        self.switch_to(Some(parent), child, uc);
    }

    /// Exec(name, argv)
    pub(crate) fn sys_exec(&mut self, uc: &mut UserContext) {
        let Some(pid) = self.sched.current() else {
            return;
        };
        let request = match self.procs.get(pid) {
            Some(pcb) => {
                let table = pcb.space.user_table();
                match user::read_cstr(&mut self.machine, table, uc.regs[0]) {
                    Ok(name) => user::read_argv(&mut self.machine, table, uc.regs[1])
                        .map(|args| (name, args)),
                    Err(err) => Err(err),
                }
            }
            None => Err(KernelError::NoSuchProcess),
        };
        let (name, args) = match request {
            Ok(request) => request,
            Err(err) => {
                uc.set_return(err.code());
                return;
            }
        };

        match self.load_program(pid, &name, &args) {
            Ok(()) => {
                if let Some(pcb) = self.procs.get(pid) {
                    *uc = pcb.user_cx.clone();
                }
                log::info!("process {} is now running '{}'", pid, name);
            }
            Err(ExecFailure::Rejected(err)) => {
                log::debug!("exec '{}' by process {} rejected: {}", name, pid, err);
                uc.set_return(err.code());
            }
            Err(ExecFailure::Fatal(err)) => self.abort_current(err, uc),
        }
    }

    /// Exit(status)
    pub(crate) fn sys_exit(&mut self, uc: &mut UserContext) {
        let status = uc.regs[0] as i32;
        self.exit_current(status, uc);
    }

    /// Wait(status_ptr): collect one exited child, blocking until there is one
    pub(crate) fn sys_wait(&mut self, uc: &mut UserContext) {
        let Some(pid) = self.sched.current() else {
            return;
        };
        let status_ptr = uc.regs[0];
        let ready = match self.procs.get(pid) {
            Some(pcb) if !pcb.has_children() => Err(KernelError::NoSuchChild),
            Some(pcb) if status_ptr != 0 => {
                user::check_range(pcb.space.user_table(), status_ptr, 4, Protection::WRITE)
                    .map(|()| !pcb.exited_children.is_empty())
            }
            Some(pcb) => Ok(!pcb.exited_children.is_empty()),
            None => Err(KernelError::NoSuchProcess),
        };
        match ready {
            Ok(true) => {
                let result = self.collect_exited_child(pid, status_ptr);
                uc.set_return(result.map_or_else(|err| err.code(), |child| child.0 as isize));
            }
            Ok(false) => self.block_on(Block::WaitChild { status_ptr }, uc),
            Err(err) => uc.set_return(err.code()),
        }
    }

    /// Reap the oldest exited child of `pid` and store its status.
    ///
    /// `pid` must be the running process so `status_ptr` resolves in its
    /// address space.
    pub(crate) fn collect_exited_child(
        &mut self,
        pid: Pid,
        status_ptr: usize,
    ) -> KernelResult<Pid> {
        let pcb = self.procs.get_mut(pid).ok_or(KernelError::NoSuchProcess)?;
        let child = pcb.exited_children.pop_front().ok_or(KernelError::NoSuchChild)?;
        let record = self.zombies.take(child).ok_or(KernelError::NoSuchChild)?;
        if status_ptr != 0 {
            user::write_i32(&mut self.machine, pcb.space.user_table(), status_ptr, record.status)?;
        }
        log::debug!("process {} collected child {} (status {})", pid, child, record.status);
        Ok(child)
    }

    /// GetPid()
    pub(crate) fn sys_getpid(&mut self, uc: &mut UserContext) {
        let pid = self.sched.current().map_or(INIT_PID, |pid| pid.0);
        uc.set_return(pid as isize);
    }

    /// Delay(ticks)
    pub(crate) fn sys_delay(&mut self, uc: &mut UserContext) {
        let ticks = uc.regs[0] as isize;
        if ticks < 0 {
            uc.set_return(KernelError::InvalidArgument.code());
            return;
        }
        uc.set_return(0);
        if ticks > 0 {
            self.block_on(Block::Delay { remaining: ticks as usize }, uc);
        }
    }
}
