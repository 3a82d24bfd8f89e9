use std::collections::VecDeque;

use crate::page_table::PageTable;

/// One simulated process: an id and the address space behind it. No
/// registers, no scheduler state; translation is the only concern here.
pub struct Process<const DIRS: usize, const SPAN: usize> {
    pub pid: u32,
    pub page_table: PageTable<DIRS, SPAN>,
}

impl<const DIRS: usize, const SPAN: usize> Process<DIRS, SPAN> {
    pub fn new(pid: u32) -> Self {
        Process {
            pid,
            page_table: PageTable::new(),
        }
    }
}

/// Processes parked while another one runs. Insertion order is kept, but
/// the queue is searched by pid: a switch names its target instead of
/// taking whatever is at the front.
pub struct ReadyQueue<const DIRS: usize, const SPAN: usize> {
    queue: VecDeque<Process<DIRS, SPAN>>,
}

impl<const DIRS: usize, const SPAN: usize> ReadyQueue<DIRS, SPAN> {
    pub fn new() -> Self {
        ReadyQueue {
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, process: Process<DIRS, SPAN>) {
        self.queue.push_back(process);
    }

    /// Unlinks and returns the process with `pid`, if queued.
    pub fn take(&mut self, pid: u32) -> Option<Process<DIRS, SPAN>> {
        let at = self.queue.iter().position(|process| process.pid == pid)?;
        self.queue.remove(at)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.queue.iter().any(|process| process.pid == pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process<DIRS, SPAN>> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
