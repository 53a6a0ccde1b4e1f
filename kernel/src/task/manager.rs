//! Process Table
//!
//! Owns every live PCB, keyed by pid

use super::pcb::{Pid, ProcessControlBlock};
use crate::mm::AddressSpace;
use alloc::collections::BTreeMap;

pub struct ProcessTable {
    processes: BTreeMap<Pid, ProcessControlBlock>,
    next_pid: usize,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            next_pid: 0,
        }
    }

    /// Construct a NEW process around `space` and assign it the next pid
    pub fn spawn(&mut self, parent: Option<Pid>, space: AddressSpace) -> Pid {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        self.processes.insert(pid, ProcessControlBlock::new(pid, parent, space));
        pid
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessControlBlock> {
        self.processes.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut ProcessControlBlock> {
        self.processes.get_mut(&pid)
    }

    pub fn remove(&mut self, pid: Pid) -> Option<ProcessControlBlock> {
        self.processes.remove(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    /// Whether `pid` was ever handed out
    pub fn was_assigned(&self, pid: Pid) -> bool {
        pid.0 < self.next_pid
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.processes.values()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
