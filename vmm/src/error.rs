use thiserror::Error;

/// Terminal outcomes the driving loop has to report or act on.
///
/// A translation fault is deliberately *not* in here; faults are ordinary
/// control flow handled by [`crate::mmu::Mmu::resolve_fault`] (see
/// [`crate::mmu::Fault`]). These are the cases that end an access.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MmuError {
    /// Every physical frame already has at least one mapping.
    #[error("physical frames exhausted")]
    OutOfFrames,

    /// Write to a page that is neither writable nor copy-on-write eligible.
    #[error("illegal write access to vpn {vpn:#x}")]
    IllegalAccess { vpn: usize },

    /// The virtual page has no mapping in the current process.
    #[error("vpn {vpn:#x} is not mapped")]
    NotMapped { vpn: usize },
}
