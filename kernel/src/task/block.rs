//! Why a process is blocked, and when it may run again

/// Resource a process is parked on by the synchronization or I/O layer.
///
/// Only an explicit wake releases these.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockReason {
    Lock(usize),
    CondVar(usize),
    Pipe(usize),
    TtyRead(usize),
    TtyWrite(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Block {
    /// Ticks left before the process becomes ready
    Delay { remaining: usize },
    /// Waiting for any child to exit; the status goes to `status_ptr`
    WaitChild { status_ptr: usize },
    External(BlockReason),
}

impl Block {
    /// Evaluate the block on a clock tick; `true` once it is satisfied.
    ///
    /// `child_exited` tells whether the process has uncollected exited
    /// children.
    pub fn tick(&mut self, child_exited: bool) -> bool {
        match self {
            Block::Delay { remaining } => {
                if *remaining > 1 {
                    *remaining -= 1;
                    false
                } else {
                    true
                }
            }
            Block::WaitChild { .. } => child_exited,
            Block::External(_) => false,
        }
    }
}
