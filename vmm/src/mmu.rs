//! The translation core: one [`Mmu`] value owns the frame pool, the TLB,
//! the running process, and the ready queue, and every operation goes
//! through it.
//!
//! The driving loop lives outside. Its per-access contract is: probe the
//! TLB ([`Mmu::probe_tlb`]); on a miss walk the page table
//! ([`Mmu::translate`]) and cache the result ([`Mmu::record_tlb`]); on a
//! fault run [`Mmu::resolve_fault`] and retry. [`Mmu::switch_or_fork`]
//! re-points the walk at another address space, cloning the current one
//! copy-on-write when the pid is unknown.

use log::{debug, trace};

use crate::error::MmuError;
use crate::frame::FrameAllocator;
use crate::memory::PhysicalMemory;
use crate::page_table::Pte;
use crate::process::{Process, ReadyQueue};
use crate::tlb::Tlb;
use crate::AccessMode;

/// Why a page-table walk could not produce a frame. This is control flow,
/// not an error: the driver reacts by invoking the fault handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// No directory or no valid entry for the page.
    NotMapped,
    /// The entry is valid but does not permit writes.
    NotWritable,
}

pub struct Mmu<
    const FRAMES: usize,
    const DIRS: usize,
    const SPAN: usize,
    const TLB_SLOTS: usize,
    M: PhysicalMemory,
> {
    frames: FrameAllocator<FRAMES>,
    tlb: Tlb<TLB_SLOTS>,
    current: Process<DIRS, SPAN>,
    ready: ReadyQueue<DIRS, SPAN>,
    memory: M,
}

impl<const FRAMES: usize, const DIRS: usize, const SPAN: usize, const TLB_SLOTS: usize, M>
    Mmu<FRAMES, DIRS, SPAN, TLB_SLOTS, M>
where
    M: PhysicalMemory,
{
    /// Starts with an empty frame pool and a single mapping-less process,
    /// pid 0.
    pub fn new(memory: M) -> Self {
        assert!(
            TLB_SLOTS >= DIRS * SPAN,
            "tlb must be able to hold every resident translation"
        );
        Mmu {
            frames: FrameAllocator::new(),
            tlb: Tlb::new(),
            current: Process::new(0),
            ready: ReadyQueue::new(),
            memory,
        }
    }

    /// TLB probe. `None` means the walk (and possibly the fault handler)
    /// has to run.
    pub fn probe_tlb(&self, vpn: usize, mode: AccessMode) -> Option<usize> {
        let hit = self.tlb.lookup(vpn, mode);
        trace!("tlb probe vpn={vpn:#x} mode={mode:?}: {hit:?}");
        hit
    }

    /// Caches a successful walk. The driver calls this after
    /// [`Mmu::translate`]; fault resolutions record themselves.
    pub fn record_tlb(&mut self, vpn: usize, mode: AccessMode, pfn: usize) {
        trace!("tlb record vpn={vpn:#x} mode={mode:?} pfn={pfn:#x}");
        self.tlb.insert(vpn, mode, pfn);
    }

    /// Walks the current page table without touching any state.
    pub fn translate(&self, vpn: usize, mode: AccessMode) -> Result<usize, Fault> {
        let Some(pte) = self.current.page_table.entry(vpn) else {
            return Err(Fault::NotMapped);
        };
        if mode == AccessMode::Write && !pte.writable {
            return Err(Fault::NotWritable);
        }
        Ok(pte.pfn)
    }

    /// First-touch population: claims the smallest free frame for `vpn` and
    /// installs a private mapping, writable iff the touch is a write. The
    /// frame is zero-filled before it is exposed. The TLB is left alone.
    pub fn allocate_frame(&mut self, vpn: usize, mode: AccessMode) -> Result<usize, MmuError> {
        assert!(vpn < DIRS * SPAN, "vpn {vpn:#x} out of range");
        assert!(
            self.current.page_table.entry(vpn).is_none(),
            "populate of already-mapped vpn {vpn:#x}"
        );
        let pfn = self.frames.allocate()?;
        self.memory.clear_frame(pfn);
        self.current.page_table.set(
            vpn,
            Pte {
                pfn,
                writable: mode == AccessMode::Write,
                shared: false,
            },
        );
        debug!(
            "pid {}: vpn {vpn:#x} -> new frame {pfn:#x} ({mode:?})",
            self.current.pid
        );
        Ok(pfn)
    }

    /// Unmaps `vpn`: clears the entry, drops the frame reference, and
    /// invalidates any cached translation. The frame itself survives as
    /// long as other processes still map it.
    pub fn release_page(&mut self, vpn: usize) -> Result<(), MmuError> {
        let Some(pte) = self.current.page_table.clear(vpn) else {
            return Err(MmuError::NotMapped { vpn });
        };
        self.frames.release(pte.pfn);
        self.tlb.invalidate(vpn);
        debug!(
            "pid {}: released vpn {vpn:#x} (frame {:#x})",
            self.current.pid, pte.pfn
        );
        Ok(())
    }

    /// Resolves a translation fault, terminally: afterwards the access
    /// either works or has failed for good.
    ///
    /// First touch populates a fresh zero frame. A write to a copy-on-write
    /// page gets its own frame, or keeps the shared one when it is the last
    /// owner. A write to a plain read-only page is illegal. Successful
    /// resolutions leave the repaired translation in the TLB.
    pub fn resolve_fault(&mut self, vpn: usize, mode: AccessMode) -> Result<(), MmuError> {
        match self.current.page_table.entry_mut(vpn) {
            None => {
                let pfn = self.allocate_frame(vpn, mode)?;
                self.tlb.insert(vpn, mode, pfn);
                Ok(())
            }
            Some(entry) if mode == AccessMode::Write && !entry.writable => {
                if !entry.shared {
                    debug!("pid {}: illegal write to vpn {vpn:#x}", self.current.pid);
                    return Err(MmuError::IllegalAccess { vpn });
                }
                let old = entry.pfn;
                let pfn = if self.frames.refcount(old) == 1 {
                    // Last owner: the frame turns private again, no copy.
                    debug!(
                        "pid {}: cow upgrade in place, vpn {vpn:#x} keeps frame {old:#x}",
                        self.current.pid
                    );
                    old
                } else {
                    let new = self.frames.allocate()?;
                    self.memory.copy_frame(old, new);
                    self.frames.release(old);
                    debug!(
                        "pid {}: cow copy vpn {vpn:#x}, frame {old:#x} -> {new:#x}",
                        self.current.pid
                    );
                    new
                };
                entry.pfn = pfn;
                entry.writable = true;
                entry.shared = false;
                self.tlb.insert(vpn, AccessMode::Write, pfn);
                Ok(())
            }
            Some(entry) => {
                // Already serviceable; just refresh the cache.
                trace!("fault call on valid vpn {vpn:#x}; refreshing tlb");
                self.tlb.insert(vpn, mode, entry.pfn);
                Ok(())
            }
        }
    }

    /// Makes `pid` the current process. A queued pid is swapped in; an
    /// unknown pid forks the current address space copy-on-write. Either
    /// way the TLB is flushed: entries carry no process tag, so nothing
    /// cached may survive the switch. Switching to the running pid is a
    /// no-op.
    pub fn switch_or_fork(&mut self, pid: u32) {
        if pid == self.current.pid {
            return;
        }
        let next = match self.ready.take(pid) {
            Some(process) => {
                debug!("switch pid {} -> pid {pid}", self.current.pid);
                process
            }
            None => {
                debug!("fork pid {} -> pid {pid}", self.current.pid);
                self.fork(pid)
            }
        };
        let previous = std::mem::replace(&mut self.current, next);
        self.ready.push(previous);
        self.tlb.flush();
    }

    /// Clones the current address space for a new process. Writable pages
    /// are demoted to read-only in *both* tables and marked shared; the
    /// data copy waits for the first write fault. No frame is allocated or
    /// copied here, so forking cannot fail.
    fn fork(&mut self, pid: u32) -> Process<DIRS, SPAN> {
        let mut child = Process::new(pid);
        for (vpn, entry) in self.current.page_table.iter_mut() {
            if entry.writable {
                entry.writable = false;
                entry.shared = true;
            }
            self.frames.retain(entry.pfn);
            child.page_table.set(vpn, *entry);
        }
        child
    }

    /// The running process; its table is what translation walks.
    pub fn current(&self) -> &Process<DIRS, SPAN> {
        &self.current
    }

    /// Processes parked on the ready queue.
    pub fn ready(&self) -> &ReadyQueue<DIRS, SPAN> {
        &self.ready
    }

    /// Frame bookkeeping, for reporting and invariant checks.
    pub fn frames(&self) -> &FrameAllocator<FRAMES> {
        &self.frames
    }

    /// Valid TLB entries right now.
    pub fn tlb_resident(&self) -> usize {
        self.tlb.resident()
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }
}
