use crate::AccessMode;

/// One cached translation. Validity is the enclosing `Option` in the slot
/// array, so an entry that exists is always usable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlbEntry {
    pub vpn: usize,
    pub mode: AccessMode,
    pub pfn: usize,
}

/// Fully-associative translation cache with a fixed slot count.
///
/// The cache is sized to hold every resident translation of one address
/// space ([`crate::mmu::Mmu`] asserts so on construction), which means a
/// valid entry never has to be evicted. `insert` finding no free slot is
/// therefore a bug, not a capacity event.
pub struct Tlb<const SLOTS: usize> {
    slots: [Option<TlbEntry>; SLOTS],
    cursor: usize,
}

impl<const SLOTS: usize> Tlb<SLOTS> {
    pub fn new() -> Self {
        Tlb {
            slots: [None; SLOTS],
            cursor: 0,
        }
    }

    /// Returns the cached frame for `vpn`, but only on an exact mode match:
    /// a read entry does not satisfy a write probe, nor the reverse.
    pub fn lookup(&self, vpn: usize, mode: AccessMode) -> Option<usize> {
        self.slots
            .iter()
            .flatten()
            .find(|entry| entry.vpn == vpn && entry.mode == mode)
            .map(|entry| entry.pfn)
    }

    /// Caches a translation. An existing entry for `vpn` is updated in place
    /// (mode and frame both); otherwise the next free slot is taken, cycling
    /// through the capacity.
    pub fn insert(&mut self, vpn: usize, mode: AccessMode, pfn: usize) {
        if let Some(entry) = self.slots.iter_mut().flatten().find(|entry| entry.vpn == vpn) {
            entry.mode = mode;
            entry.pfn = pfn;
            return;
        }
        for offset in 0..SLOTS {
            let slot = (self.cursor + offset) % SLOTS;
            if self.slots[slot].is_none() {
                self.slots[slot] = Some(TlbEntry { vpn, mode, pfn });
                self.cursor = (slot + 1) % SLOTS;
                return;
            }
        }
        panic!("no free tlb slot; capacity must cover the virtual page count");
    }

    /// Drops the entry for `vpn`, if cached. Must accompany every unmap and
    /// every permission change, or a stale translation would bypass the
    /// fault handler.
    pub fn invalidate(&mut self, vpn: usize) -> bool {
        for slot in self.slots.iter_mut() {
            if let Some(entry) = slot {
                if entry.vpn == vpn {
                    *slot = None;
                    return true;
                }
            }
        }
        false
    }

    /// Invalidates everything. Entries carry no process tag, so this runs on
    /// every context switch.
    pub fn flush(&mut self) {
        self.slots = [None; SLOTS];
    }

    /// Number of valid entries.
    pub fn resident(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessMode::{Read, Write};

    #[test]
    fn lookup_requires_exact_mode() {
        let mut tlb = Tlb::<4>::new();
        tlb.insert(3, Read, 7);
        assert_eq!(tlb.lookup(3, Read), Some(7));
        assert_eq!(tlb.lookup(3, Write), None, "read entry must not satisfy a write probe");
        tlb.insert(3, Write, 7);
        assert_eq!(tlb.lookup(3, Write), Some(7));
        assert_eq!(tlb.lookup(3, Read), None);
    }

    #[test]
    fn insert_updates_in_place() {
        let mut tlb = Tlb::<2>::new();
        tlb.insert(1, Read, 0);
        tlb.insert(1, Write, 5);
        assert_eq!(tlb.lookup(1, Write), Some(5));
        // vpn 1 consumed a single slot, so there is still room for vpn 2.
        tlb.insert(2, Read, 1);
        assert_eq!(tlb.lookup(2, Read), Some(1));
        assert_eq!(tlb.resident(), 2);
    }

    #[test]
    fn invalidate_drops_single_vpn() {
        let mut tlb = Tlb::<4>::new();
        tlb.insert(1, Read, 0);
        tlb.insert(2, Read, 1);
        assert!(tlb.invalidate(1));
        assert!(!tlb.invalidate(1));
        assert_eq!(tlb.lookup(1, Read), None);
        assert_eq!(tlb.lookup(2, Read), Some(1));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tlb = Tlb::<2>::new();
        tlb.insert(1, Read, 0);
        tlb.insert(2, Read, 1);
        tlb.invalidate(1);
        tlb.insert(3, Write, 2);
        assert_eq!(tlb.lookup(3, Write), Some(2));
        assert_eq!(tlb.resident(), 2);
    }

    #[test]
    fn flush_empties_the_cache() {
        let mut tlb = Tlb::<4>::new();
        tlb.insert(1, Read, 0);
        tlb.insert(2, Write, 1);
        tlb.flush();
        assert_eq!(tlb.resident(), 0);
        assert_eq!(tlb.lookup(1, Read), None);
        assert_eq!(tlb.lookup(2, Write), None);
    }
}
