//! Scheduler
//!
//! Round-robin over a FIFO ready queue. Blocked processes sit in a separate
//! set until their block is satisfied or they are woken explicitly.

use super::pcb::Pid;
use crate::config::DEFAULT_TIME_SLICE;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

pub struct Scheduler {
    ready: VecDeque<Pid>,
    blocked: Vec<Pid>,
    current: Option<Pid>,
    time_slice: usize,
    current_time_slice: usize,
}

impl Scheduler {
    pub fn new(time_slice: usize) -> Self {
        Self {
            ready: VecDeque::new(),
            blocked: Vec::new(),
            current: None,
            time_slice: time_slice.max(1),
            current_time_slice: 0,
        }
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn set_current(&mut self, pid: Option<Pid>) {
        self.current = pid;
        self.reset_time_slice();
    }

    pub fn push_ready(&mut self, pid: Pid) {
        self.ready.push_back(pid);
    }

    pub fn pop_ready(&mut self) -> Option<Pid> {
        self.ready.pop_front()
    }

    /// Pop the first ready process that satisfies `eligible`.
    ///
    /// Skipped processes keep their relative order.
    pub fn pop_ready_where(&mut self, mut eligible: impl FnMut(Pid) -> bool) -> Option<Pid> {
        let position = self.ready.iter().position(|&pid| eligible(pid))?;
        self.ready.remove(position)
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn ready(&self) -> impl Iterator<Item = Pid> + '_ {
        self.ready.iter().copied()
    }

    pub fn block(&mut self, pid: Pid) {
        if !self.blocked.contains(&pid) {
            self.blocked.push(pid);
        }
    }

    /// Take `pid` out of the blocked set; `false` if it was not there
    pub fn unblock(&mut self, pid: Pid) -> bool {
        match self.blocked.iter().position(|&p| p == pid) {
            Some(index) => {
                self.blocked.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn blocked(&self) -> &[Pid] {
        &self.blocked
    }

    /// Drop every trace of `pid`
    pub fn forget(&mut self, pid: Pid) {
        self.ready.retain(|&p| p != pid);
        self.blocked.retain(|&p| p != pid);
        if self.current == Some(pid) {
            self.current = None;
        }
    }

    /// Count a clock tick; `true` when the running process used up its slice
    pub fn tick(&mut self) -> bool {
        self.current_time_slice += 1;
        if self.current_time_slice >= self.time_slice {
            self.current_time_slice = 0;
            true
        } else {
            false
        }
    }

    pub fn reset_time_slice(&mut self) {
        self.current_time_slice = 0;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_SLICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_queue_is_fifo() {
        let mut sched = Scheduler::default();
        for pid in [3, 1, 2] {
            sched.push_ready(Pid(pid));
        }
        assert_eq!(sched.pop_ready(), Some(Pid(3)));
        assert_eq!(sched.pop_ready(), Some(Pid(1)));
        assert_eq!(sched.pop_ready(), Some(Pid(2)));
        assert_eq!(sched.pop_ready(), None);
    }

    #[test]
    fn filtered_pop_skips_without_reordering() {
        let mut sched = Scheduler::default();
        for pid in 0..4 {
            sched.push_ready(Pid(pid));
        }
        assert_eq!(sched.pop_ready_where(|pid| pid.0 >= 2), Some(Pid(2)));
        assert_eq!(sched.ready().collect::<Vec<_>>(), [Pid(0), Pid(1), Pid(3)]);
        assert_eq!(sched.pop_ready_where(|pid| pid.0 > 10), None);
        assert_eq!(sched.ready().count(), 3);
    }

    #[test]
    fn time_slice_counts_ticks() {
        let mut sched = Scheduler::new(3);
        assert!(!sched.tick());
        assert!(!sched.tick());
        assert!(sched.tick());
        assert!(!sched.tick());
        sched.reset_time_slice();
        assert!(!sched.tick());
    }

    #[test]
    fn forget_clears_every_queue() {
        let mut sched = Scheduler::default();
        sched.push_ready(Pid(1));
        sched.block(Pid(2));
        sched.set_current(Some(Pid(3)));
        for pid in 1..=3 {
            sched.forget(Pid(pid));
        }
        assert!(!sched.has_ready());
        assert!(sched.blocked().is_empty());
        assert_eq!(sched.current(), None);
        assert!(!sched.unblock(Pid(2)));
    }
}
