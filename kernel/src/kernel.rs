//! Kernel state and boot
//!
//! All mutable kernel state lives in one [`Kernel`] value built by
//! [`Kernel::boot`]. Trap handlers and the synchronization layer reach it by
//! reference; there are no hidden globals.

use crate::config::{
    DEFAULT_KERNEL_DATA_PAGES, DEFAULT_KERNEL_TEXT_PAGES, DEFAULT_TIME_SLICE, KERNEL_STACK_BASE_VPN,
    REGION0_PAGES, REGION1_PAGES, STAGING_VPN,
};
use crate::hal::{Machine, TlbFlush};
use crate::loader::ProgramLoader;
use crate::logging;
use crate::mm::{AddressSpace, Frame, FrameAllocator, PageTable, PageTableEntry, Protection};
use crate::task::{Pid, ProcessControlBlock, ProcessState, ProcessTable, Scheduler, ZombieTable};
use crate::trap::{TrapTable, UserContext};
use crate::{KernelError, KernelResult};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use log::LevelFilter;

/// Boot-time parameters
#[derive(Clone, Debug)]
pub struct BootParams {
    /// Program run as the first process
    pub init: String,
    /// Its argument vector
    pub args: Vec<String>,
    /// Region 0 pages identity-mapped read/execute
    pub kernel_text_pages: usize,
    /// Region 0 pages identity-mapped read/write after the text
    pub kernel_data_pages: usize,
    /// Clock ticks per round-robin slice
    pub time_slice: usize,
    /// Install the console logger at this level
    pub log_level: Option<LevelFilter>,
}

impl Default for BootParams {
    fn default() -> Self {
        Self {
            init: String::from("init"),
            args: alloc::vec![String::from("init")],
            kernel_text_pages: DEFAULT_KERNEL_TEXT_PAGES,
            kernel_data_pages: DEFAULT_KERNEL_DATA_PAGES,
            time_slice: DEFAULT_TIME_SLICE,
            log_level: None,
        }
    }
}

pub struct Kernel<M: Machine> {
    pub(crate) machine: M,
    pub(crate) frames: FrameAllocator,
    pub(crate) procs: ProcessTable,
    pub(crate) sched: Scheduler,
    pub(crate) zombies: ZombieTable,
    pub(crate) loader: Box<dyn ProgramLoader>,
    pub(crate) traps: TrapTable<M>,
}

impl<M: Machine> Kernel<M> {
    /// Bring the kernel up on `machine` and load the init program.
    ///
    /// On success `uc` holds init's entry context, ready to be restored to
    /// user mode.
    pub fn boot(
        mut machine: M,
        loader: impl ProgramLoader + 'static,
        params: BootParams,
        uc: &mut UserContext,
    ) -> KernelResult<Self> {
        if let Some(level) = params.log_level {
            logging::init(level);
        }
        let total = machine.frame_count();
        if total <= REGION0_PAGES {
            log::error!("{} frames is not enough to boot", total);
            return Err(KernelError::OutOfMemory);
        }
        if params.kernel_text_pages + params.kernel_data_pages > STAGING_VPN {
            return Err(KernelError::InvalidArgument);
        }

        build_region0(&mut machine, &params);
        machine.load_user_table(&PageTable::new(REGION1_PAGES));
        machine.flush_tlb(TlbFlush::All);

        let mut kernel = Self {
            machine,
            frames: FrameAllocator::new(REGION0_PAGES..total),
            procs: ProcessTable::new(),
            sched: Scheduler::new(params.time_slice),
            zombies: ZombieTable::new(),
            loader: Box::new(loader),
            traps: TrapTable::new(),
        };
        log::info!(
            "boot: {} frames, {} free for processes",
            total,
            kernel.frames.free_frames()
        );

        let init = kernel.procs.spawn(None, AddressSpace::new());
        if let Some(pcb) = kernel.procs.get_mut(init) {
            pcb.state = ProcessState::Running;
        }
        kernel.sched.set_current(Some(init));

        if let Err(failure) = kernel.load_program(init, &params.init, &params.args) {
            log::error!("cannot start '{}': {}", params.init, failure.error());
            return Err(failure.error());
        }
        if let Some(pcb) = kernel.procs.get(init) {
            *uc = pcb.user_cx.clone();
        }
        log::info!("init '{}' running as process {}", params.init, init);
        Ok(kernel)
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    /// Process owning the CPU
    pub fn current_pid(&self) -> Option<Pid> {
        self.sched.current()
    }

    pub fn process(&self, pid: Pid) -> Option<&ProcessControlBlock> {
        self.procs.get(pid)
    }

    /// State of `pid`, including exited processes
    pub fn process_state(&self, pid: Pid) -> Option<ProcessState> {
        if let Some(pcb) = self.procs.get(pid) {
            Some(pcb.state)
        } else if self.zombies.contains(pid) {
            Some(ProcessState::Zombie)
        } else if self.procs.was_assigned(pid) {
            Some(ProcessState::Reaped)
        } else {
            None
        }
    }

    /// Live processes
    pub fn processes(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.procs.iter()
    }

    pub fn ready_queue(&self) -> Vec<Pid> {
        self.sched.ready().collect()
    }

    pub fn blocked(&self) -> &[Pid] {
        self.sched.blocked()
    }

    pub fn free_frames(&self) -> usize {
        self.frames.free_frames()
    }

    pub fn total_frames(&self) -> usize {
        self.frames.total_frames()
    }

    /// Every frame backing a valid entry in a live address space
    pub fn owned_frames(&self) -> Vec<Frame> {
        self.procs.iter().flat_map(|pcb| pcb.space.frames()).collect()
    }

    pub fn zombie_count(&self) -> usize {
        self.zombies.len()
    }
}

/// Identity-map the kernel image and the boot stack; everything else in
/// region 0 starts invalid.
fn build_region0<M: Machine>(machine: &mut M, params: &BootParams) {
    let text_end = params.kernel_text_pages;
    let data_end = text_end + params.kernel_data_pages;
    for vpn in 0..REGION0_PAGES {
        let entry = if vpn < text_end {
            PageTableEntry::new(Frame(vpn), Protection::RX)
        } else if vpn < data_end || vpn >= KERNEL_STACK_BASE_VPN {
            PageTableEntry::new(Frame(vpn), Protection::RW)
        } else {
            PageTableEntry::invalid()
        };
        machine.set_region0_entry(vpn, entry);
    }
}
