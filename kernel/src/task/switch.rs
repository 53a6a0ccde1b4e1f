//! Context-switch engine
//!
//! The machine moves onto the new kernel stack and calls back into
//! [`dispatch`], which records the old snapshot, clones a stack for a
//! process that has never run, repoints the kernel-stack window and the user
//! table, and hands back the snapshot to resume.

use super::block::Block;
use super::context::KernelContext;
use super::manager::ProcessTable;
use super::pcb::{Pid, ProcessState};
use crate::config::ABORT_STATUS;
use crate::hal::{Machine, TlbFlush};
use crate::kernel::Kernel;
use crate::mm::{staging, Region};
use crate::trap::UserContext;
use alloc::vec::Vec;

impl<M: Machine> Kernel<M> {
    /// Give the CPU to `target`.
    ///
    /// `uc` is the trap frame that will be restored to user mode: the
    /// outgoing process's registers are saved from it and the target's are
    /// loaded into it. `outgoing` is `None` only on Exit, and then `target`
    /// must already have a kernel snapshot.
    pub(crate) fn switch_to(&mut self, outgoing: Option<Pid>, target: Pid, uc: &mut UserContext) {
        if let Some(pcb) = outgoing.and_then(|pid| self.procs.get_mut(pid)) {
            pcb.user_cx = uc.clone();
        }
        match self.procs.get_mut(target) {
            Some(pcb) => {
                pcb.state = ProcessState::Running;
                *uc = pcb.user_cx.clone();
            }
            None => {
                log::error!("switch to process {} which does not exist", target);
                self.machine.halt(ABORT_STATUS);
            }
        }
        self.sched.set_current(Some(target));
        log::trace!("switch {:?} -> {}", outgoing.map(|p| p.0), target);

        let procs = &mut self.procs;
        self.machine.kernel_context_switch(|machine, prev| {
            dispatch(machine, procs, outgoing, target, prev)
        });

        self.finish_woken(uc);
    }

    /// Complete the blocking call the now-running process was woken from
    fn finish_woken(&mut self, uc: &mut UserContext) {
        let Some(pid) = self.sched.current() else {
            return;
        };
        let woken = self.procs.get_mut(pid).and_then(|pcb| pcb.woken_from.take());
        if let Some(Block::WaitChild { status_ptr }) = woken {
            match self.collect_exited_child(pid, status_ptr) {
                Ok(child) => uc.set_return(child.0 as isize),
                Err(err) => {
                    log::error!("process {} woke from Wait with nothing to collect: {}", pid, err);
                    uc.set_return(err.code());
                }
            }
        }
    }
}

/// Switch callback, run on the machine's behalf
fn dispatch<M: Machine>(
    machine: &mut M,
    procs: &mut ProcessTable,
    outgoing: Option<Pid>,
    target: Pid,
    prev: KernelContext,
) -> KernelContext {
    if let Some(pcb) = outgoing.and_then(|pid| procs.get_mut(pid)) {
        pcb.kernel_cx = Some(prev);
    }
    let source = outgoing.and_then(|pid| procs.get(pid)).and_then(|pcb| pcb.kernel_cx);

    let Some(pcb) = procs.get_mut(target) else {
        machine.halt(ABORT_STATUS);
    };

    // First run: start from a copy of whoever is activating us
    if pcb.kernel_cx.is_none() {
        let Some(snapshot) = source else {
            log::error!("process {} has never run and there is no context to clone", target);
            machine.halt(ABORT_STATUS);
        };
        let stack: Vec<_> = pcb.space.kernel_stack_table().valid_entries().collect();
        for (page, frame, _) in stack {
            if let Err(fault) =
                staging::copy_page_into(machine, Region::KernelStack.page_va(page), frame)
            {
                log::error!(
                    "kernel stack clone for process {} faulted at {:#x}",
                    target,
                    fault.addr
                );
                machine.halt(ABORT_STATUS);
            }
        }
        pcb.kernel_cx = Some(snapshot);
    }

    if let Some(out) = outgoing.and_then(|pid| procs.get_mut(pid)) {
        out.space.save_kernel_stack_window(machine);
    }
    let Some(pcb) = procs.get(target) else {
        machine.halt(ABORT_STATUS);
    };
    pcb.space.install(machine);

    machine.flush_tlb(TlbFlush::Region0);
    machine.flush_tlb(TlbFlush::Region1);

    pcb.kernel_cx.unwrap_or(prev)
}
