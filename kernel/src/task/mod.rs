//! Process management
//!
//! PCBs, the process table, the ready and blocked queues, exit records and
//! the context-switch engine. The operations that move processes between
//! states are methods on [`Kernel`].

mod block;
mod context;
mod manager;
mod pcb;
mod scheduler;
mod switch;
mod zombie;

pub use block::{Block, BlockReason};
pub use context::KernelContext;
pub use manager::ProcessTable;
pub use pcb::{Pid, ProcessControlBlock, ProcessState};
pub use scheduler::Scheduler;
pub use zombie::{ExitRecord, ZombieTable};

use crate::config::{ABORT_STATUS, INIT_PID};
use crate::hal::{Machine, TlbFlush};
use crate::kernel::Kernel;
use crate::trap::UserContext;
use crate::KernelError;
use alloc::vec::Vec;

impl<M: Machine> Kernel<M> {
    /// Hand the CPU to the head of the ready queue.
    ///
    /// With `requeue` the current process goes to the back of the queue
    /// first, so it keeps running when nobody else is ready. Halts the
    /// machine when nothing at all can run.
    pub fn yield_to_next(&mut self, requeue: bool, uc: &mut UserContext) {
        let current = self.sched.current();
        if requeue {
            if let Some(pid) = current {
                if let Some(pcb) = self.procs.get_mut(pid) {
                    pcb.state = ProcessState::Ready;
                }
                self.sched.push_ready(pid);
            }
        }

        let Some(next) = self.sched.pop_ready() else {
            log::error!("no process is ready to run");
            self.machine.halt(ABORT_STATUS);
        };
        if Some(next) == current {
            if let Some(pcb) = self.procs.get_mut(next) {
                pcb.state = ProcessState::Running;
            }
            self.sched.reset_time_slice();
            return;
        }
        self.switch_to(current, next, uc);
    }

    /// Park the current process on a synchronization or I/O resource until
    /// [`Kernel::wake`] releases it
    pub fn block_current(&mut self, reason: BlockReason, uc: &mut UserContext) {
        self.block_on(Block::External(reason), uc);
    }

    pub(crate) fn block_on(&mut self, block: Block, uc: &mut UserContext) {
        let Some(pid) = self.sched.current() else {
            return;
        };
        if let Some(pcb) = self.procs.get_mut(pid) {
            pcb.block = Some(block);
            pcb.state = ProcessState::Blocked;
        }
        self.sched.block(pid);
        log::debug!("process {} blocked on {:?}", pid, block);
        self.yield_to_next(false, uc);
    }

    /// Move a blocked process to the ready queue; `false` if it was not blocked
    pub fn wake(&mut self, pid: Pid) -> bool {
        if !self.sched.unblock(pid) {
            return false;
        }
        if let Some(pcb) = self.procs.get_mut(pid) {
            pcb.woken_from = pcb.block.take();
            pcb.state = ProcessState::Ready;
        }
        self.sched.push_ready(pid);
        log::debug!("process {} woken", pid);
        true
    }

    /// Clock trap: age blocked processes, then preempt when the slice is up
    pub(crate) fn on_clock_tick(&mut self, uc: &mut UserContext) {
        let blocked: Vec<Pid> = self.sched.blocked().to_vec();
        for pid in blocked {
            let satisfied = match self.procs.get_mut(pid) {
                Some(pcb) => {
                    let child_exited = !pcb.exited_children.is_empty();
                    pcb.block.as_mut().map_or(false, |block| block.tick(child_exited))
                }
                None => false,
            };
            if satisfied {
                self.wake(pid);
            }
        }

        if self.sched.tick() && self.sched.has_ready() {
            self.yield_to_next(true, uc);
        }
    }

    /// Tear down the current process and switch to the next resumable one
    pub(crate) fn exit_current(&mut self, status: i32, uc: &mut UserContext) {
        let Some(pid) = self.sched.current() else {
            log::error!("exit with no current process");
            self.machine.halt(ABORT_STATUS);
        };
        // Last schedulable process: an orderly shutdown with its status
        if !self.sched.has_ready() && (pid.0 == INIT_PID || self.sched.blocked().is_empty()) {
            log::info!("process {} exited with status {}, nothing left to run", pid, status);
            self.machine.halt(status);
        }

        let Some(mut pcb) = self.procs.remove(pid) else {
            self.machine.halt(ABORT_STATUS);
        };
        pcb.state = ProcessState::Zombie;
        self.sched.forget(pid);
        log::info!("process {} exited with status {}", pid, status);

        for child in &pcb.children {
            if let Some(orphan) = self.procs.get_mut(*child) {
                orphan.parent = None;
            }
        }
        // Nobody can collect these any more
        for zombie in pcb.exited_children.drain(..) {
            self.zombies.take(zombie);
        }

        if let Some(parent) = pcb.parent {
            let waiting = match self.procs.get_mut(parent) {
                Some(parent_pcb) => {
                    parent_pcb.children.retain(|&c| c != pid);
                    parent_pcb.exited_children.push_back(pid);
                    self.zombies.insert(ExitRecord { pid, status });
                    matches!(parent_pcb.block, Some(Block::WaitChild { .. }))
                }
                None => false,
            };
            if waiting {
                self.wake(parent);
            }
        }

        pcb.space.release_all(&mut self.frames);
        drop(pcb);
        self.machine.flush_tlb(TlbFlush::All);

        let procs = &self.procs;
        let next = self
            .sched
            .pop_ready_where(|p| procs.get(p).map_or(false, |pcb| pcb.has_kernel_context()));
        match next {
            Some(next) => self.switch_to(None, next, uc),
            None => {
                log::error!("process {} exited and nothing can be resumed", pid);
                self.machine.halt(ABORT_STATUS);
            }
        }
    }

    /// Terminate the current process as if it had called Exit with
    /// [`ABORT_STATUS`]
    pub(crate) fn abort_current(&mut self, reason: KernelError, uc: &mut UserContext) {
        if let Some(pid) = self.sched.current() {
            log::warn!("process {} killed: {}", pid, reason);
        }
        self.exit_current(ABORT_STATUS, uc);
    }
}
