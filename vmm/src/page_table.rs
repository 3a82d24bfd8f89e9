//! Per-process two-level page table.
//!
//! The outer level is a fixed array of `DIRS` directory slots; each slot
//! lazily owns an inner [`PageDirectory`] of `SPAN` entries. A virtual page
//! number splits as `dir = vpn / SPAN`, `idx = vpn % SPAN`. Directories are
//! created by the first mapping that lands in them and pruned as soon as
//! their last entry is cleared, so a slot is populated exactly when at least
//! one of its pages is in use.

/// A valid page-table entry. Absent mappings are `None` in the directory,
/// so there is no separate valid bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pte {
    pub pfn: usize,
    pub writable: bool,
    /// Copy-on-write marker: set while the frame is (or once was) shared
    /// through a fork. A non-writable entry without it write-faults fatally.
    pub shared: bool,
}

/// Inner level: a fixed run of entries, heap-allocated on first use.
pub struct PageDirectory<const SPAN: usize> {
    entries: [Option<Pte>; SPAN],
}

impl<const SPAN: usize> PageDirectory<SPAN> {
    fn new() -> Self {
        PageDirectory {
            entries: [None; SPAN],
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }
}

pub struct PageTable<const DIRS: usize, const SPAN: usize> {
    directories: [Option<Box<PageDirectory<SPAN>>>; DIRS],
}

impl<const DIRS: usize, const SPAN: usize> PageTable<DIRS, SPAN> {
    pub fn new() -> Self {
        PageTable {
            directories: std::array::from_fn(|_| None),
        }
    }

    fn split(vpn: usize) -> Option<(usize, usize)> {
        let dir = vpn / SPAN;
        (dir < DIRS).then(|| (dir, vpn % SPAN))
    }

    /// Entry for `vpn`, by value. Out-of-range pages read as absent.
    pub fn entry(&self, vpn: usize) -> Option<Pte> {
        let (dir, idx) = Self::split(vpn)?;
        self.directories[dir].as_ref()?.entries[idx]
    }

    pub fn entry_mut(&mut self, vpn: usize) -> Option<&mut Pte> {
        let (dir, idx) = Self::split(vpn)?;
        self.directories[dir].as_mut()?.entries[idx].as_mut()
    }

    /// Installs `pte` for `vpn`, materializing the directory if needed.
    /// Overwrites any previous entry.
    pub fn set(&mut self, vpn: usize, pte: Pte) {
        let Some((dir, idx)) = Self::split(vpn) else {
            panic!("vpn {vpn:#x} out of range");
        };
        let directory = self.directories[dir].get_or_insert_with(|| Box::new(PageDirectory::new()));
        directory.entries[idx] = Some(pte);
    }

    /// Removes the mapping for `vpn` and returns it. The directory is freed
    /// when this was its last live entry.
    pub fn clear(&mut self, vpn: usize) -> Option<Pte> {
        let (dir, idx) = Self::split(vpn)?;
        let directory = self.directories[dir].as_mut()?;
        let pte = directory.entries[idx].take()?;
        if directory.is_empty() {
            self.directories[dir] = None;
        }
        Some(pte)
    }

    /// Valid mappings in ascending vpn order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Pte)> + '_ {
        self.directories.iter().enumerate().flat_map(|(dir, slot)| {
            slot.iter().flat_map(move |directory| {
                directory
                    .entries
                    .iter()
                    .enumerate()
                    .filter_map(move |(idx, entry)| entry.map(|pte| (dir * SPAN + idx, pte)))
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Pte)> + '_ {
        self.directories.iter_mut().enumerate().flat_map(|(dir, slot)| {
            slot.iter_mut().flat_map(move |directory| {
                directory
                    .entries
                    .iter_mut()
                    .enumerate()
                    .filter_map(move |(idx, entry)| entry.as_mut().map(|pte| (dir * SPAN + idx, pte)))
            })
        })
    }

    /// Directory slots currently materialized.
    pub fn live_directories(&self) -> usize {
        self.directories.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pte(pfn: usize) -> Pte {
        Pte {
            pfn,
            writable: true,
            shared: false,
        }
    }

    #[test]
    fn set_and_entry_roundtrip() {
        let mut table = PageTable::<4, 4>::new();
        table.set(5, pte(2));
        assert_eq!(table.entry(5), Some(pte(2)));
        assert_eq!(table.entry(4), None, "neighbour in the same directory is absent");
        assert_eq!(table.entry(99), None, "out-of-range reads are absent");
    }

    #[test]
    fn empty_directories_are_pruned() {
        let mut table = PageTable::<2, 4>::new();
        table.set(4, pte(0));
        table.set(5, pte(1));
        assert_eq!(table.live_directories(), 1);
        assert_eq!(table.clear(4), Some(pte(0)));
        assert_eq!(table.live_directories(), 1, "sibling keeps the directory alive");
        assert_eq!(table.entry(5), Some(pte(1)));
        table.clear(5);
        assert_eq!(table.live_directories(), 0);
        assert_eq!(table.clear(5), None, "clearing an absent mapping is a no-op");
    }

    #[test]
    fn iteration_is_ascending_by_vpn() {
        let mut table = PageTable::<4, 4>::new();
        table.set(9, pte(1));
        table.set(2, pte(0));
        table.set(14, pte(2));
        let vpns: Vec<usize> = table.iter().map(|(vpn, _)| vpn).collect();
        assert_eq!(vpns, vec![2, 9, 14]);
    }

    #[test]
    fn entry_mut_edits_in_place() {
        let mut table = PageTable::<2, 4>::new();
        table.set(3, pte(0));
        let entry = table.entry_mut(3).unwrap();
        entry.writable = false;
        entry.shared = true;
        assert_eq!(
            table.entry(3),
            Some(Pte {
                pfn: 0,
                writable: false,
                shared: true
            })
        );
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn set_out_of_range_panics() {
        let mut table = PageTable::<2, 2>::new();
        table.set(4, pte(0));
    }
}
