//! Software model of a paging MMU.
//!
//! The crate simulates the hardware half of virtual memory: per-process
//! two-level page tables, a fully-associative TLB, refcounted physical
//! frames, a fault handler doing first-touch allocation and copy-on-write
//! resolution, and process switching with lazy forking. Everything hangs
//! off one [`mmu::Mmu`] context; the loop that decodes accesses and feeds
//! them in lives outside (the `vmm-demo` crate ships one).

pub mod error;
pub mod frame;
pub mod memory;
pub mod mmu;
pub mod page_table;
pub mod process;
pub mod tlb;

#[cfg(test)]
mod tests_prop;

/// How a page is being touched. Page permissions and cached translations
/// are both keyed on this.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}
