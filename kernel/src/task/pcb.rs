//! Process Control Block

use super::block::Block;
use super::context::KernelContext;
use crate::mm::AddressSpace;
use crate::trap::UserContext;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

/// Process identifier, assigned in increasing order and never reused
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub usize);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessState {
    New,
    Ready,
    Running,
    Blocked,
    /// Exited, status not yet collected
    Zombie,
    /// Exited and forgotten
    Reaped,
}

pub struct ProcessControlBlock {
    pub pid: Pid,
    pub state: ProcessState,
    /// User registers as of the last time this process left user mode
    pub user_cx: UserContext,
    /// `None` until the process has been switched away from at least once
    pub kernel_cx: Option<KernelContext>,
    pub space: AddressSpace,
    /// Non-owning link, cleared when the parent exits
    pub parent: Option<Pid>,
    pub children: Vec<Pid>,
    /// Children that exited and whose status is still in the zombie table
    pub exited_children: VecDeque<Pid>,
    /// First user page of the heap
    pub heap_base: usize,
    /// First user page above the heap
    pub brk: usize,
    /// Lowest mapped user page of the stack
    pub stack_floor: usize,
    pub block: Option<Block>,
    /// Block this process was woken from, finished on its next dispatch
    pub(crate) woken_from: Option<Block>,
}

impl ProcessControlBlock {
    pub fn new(pid: Pid, parent: Option<Pid>, space: AddressSpace) -> Self {
        Self {
            pid,
            state: ProcessState::New,
            user_cx: UserContext::default(),
            kernel_cx: None,
            space,
            parent,
            children: Vec::new(),
            exited_children: VecDeque::new(),
            heap_base: 0,
            brk: 0,
            stack_floor: 0,
            block: None,
            woken_from: None,
        }
    }

    pub fn has_kernel_context(&self) -> bool {
        self.kernel_cx.is_some()
    }

    /// Whether Wait could ever succeed for this process
    pub fn has_children(&self) -> bool {
        !self.children.is_empty() || !self.exited_children.is_empty()
    }
}

impl fmt::Debug for ProcessControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("exited_children", &self.exited_children)
            .field("pages", &self.space.valid_pages())
            .finish()
    }
}
