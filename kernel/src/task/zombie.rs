//! Exit statuses waiting to be collected by a parent

use super::pcb::Pid;
use alloc::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExitRecord {
    pub pid: Pid,
    pub status: i32,
}

#[derive(Default)]
pub struct ZombieTable {
    records: BTreeMap<Pid, ExitRecord>,
}

impl ZombieTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ExitRecord) {
        self.records.insert(record.pid, record);
    }

    /// Remove and return the record for `pid`
    pub fn take(&mut self, pid: Pid) -> Option<ExitRecord> {
        self.records.remove(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.records.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
