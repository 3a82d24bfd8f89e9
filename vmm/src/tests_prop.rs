//! Property tests driving randomized access traces through the whole
//! context and checking the global invariants after every step.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use crate::error::MmuError;
use crate::frame::FrameAllocator;
use crate::memory::FrameBuffer;
use crate::mmu::Mmu;
use crate::AccessMode;

type TraceMmu = Mmu<8, 4, 4, 16, FrameBuffer>;

#[derive(Debug, Clone, Copy)]
enum AllocOp {
    Allocate,
    Release(usize),
}

fn arb_alloc_op() -> impl Strategy<Value = AllocOp> {
    prop_oneof![
        Just(AllocOp::Allocate),
        (0usize..8).prop_map(AllocOp::Release),
    ]
}

#[derive(Debug, Clone, Copy)]
enum TraceOp {
    Read(usize),
    Write(usize),
    Release(usize),
    Switch(u32),
}

fn arb_trace_op() -> impl Strategy<Value = TraceOp> {
    prop_oneof![
        (0usize..16).prop_map(TraceOp::Read),
        (0usize..16).prop_map(TraceOp::Write),
        // Deliberately wider than the address space; releasing an unmapped
        // or out-of-range page must stay benign.
        (0usize..24).prop_map(TraceOp::Release),
        (0u32..4).prop_map(TraceOp::Switch),
    ]
}

/// The driver loop in miniature: probe, walk, fault. Exhaustion and
/// illegal writes are legal trace outcomes, not test failures.
fn drive_access(mmu: &mut TraceMmu, vpn: usize, mode: AccessMode) {
    if mmu.probe_tlb(vpn, mode).is_some() {
        return;
    }
    match mmu.translate(vpn, mode) {
        Ok(pfn) => mmu.record_tlb(vpn, mode, pfn),
        Err(_) => {
            let _ = mmu.resolve_fault(vpn, mode);
        }
    }
}

/// Frame refcounts must equal the number of page-table entries pointing at
/// each frame, summed over the current process and everything queued.
fn check_refcounts(mmu: &TraceMmu) -> Result<(), TestCaseError> {
    let mut counts = [0u32; 8];
    for process in std::iter::once(mmu.current()).chain(mmu.ready().iter()) {
        for (_, pte) in process.page_table.iter() {
            counts[pte.pfn] += 1;
        }
    }
    for (pfn, &expected) in counts.iter().enumerate() {
        prop_assert_eq!(mmu.frames().refcount(pfn), expected, "frame {}", pfn);
    }
    Ok(())
}

/// Every TLB hit must agree with what a fresh page-table walk says right
/// now. A violation means a stale translation survived an unmap, a
/// demotion, or a context switch.
fn check_tlb_coherent(mmu: &TraceMmu) -> Result<(), TestCaseError> {
    for vpn in 0..16 {
        for mode in [AccessMode::Read, AccessMode::Write] {
            if let Some(pfn) = mmu.probe_tlb(vpn, mode) {
                prop_assert_eq!(
                    mmu.translate(vpn, mode),
                    Ok(pfn),
                    "stale tlb entry for vpn {} {:?}",
                    vpn,
                    mode
                );
            }
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn allocation_returns_smallest_free_pfn(ops in proptest::collection::vec(arb_alloc_op(), 0..64)) {
        let mut frames = FrameAllocator::<8>::new();
        // Shadow model: one reference per live frame.
        let mut live = [false; 8];
        for op in ops {
            match op {
                AllocOp::Allocate => {
                    let expected = live.iter().position(|&used| !used);
                    match frames.allocate() {
                        Ok(pfn) => {
                            prop_assert_eq!(Some(pfn), expected);
                            live[pfn] = true;
                        }
                        Err(err) => {
                            prop_assert_eq!(err, MmuError::OutOfFrames);
                            prop_assert_eq!(expected, None);
                        }
                    }
                }
                AllocOp::Release(pfn) => {
                    if live[pfn] {
                        prop_assert!(frames.release(pfn));
                        live[pfn] = false;
                    }
                }
            }
        }
    }

    #[test]
    fn invariants_hold_across_arbitrary_traces(ops in proptest::collection::vec(arb_trace_op(), 0..48)) {
        let mut mmu: TraceMmu = Mmu::new(FrameBuffer::new(8, 4));
        for op in ops {
            match op {
                TraceOp::Read(vpn) => drive_access(&mut mmu, vpn, AccessMode::Read),
                TraceOp::Write(vpn) => drive_access(&mut mmu, vpn, AccessMode::Write),
                TraceOp::Release(vpn) => {
                    let _ = mmu.release_page(vpn);
                }
                TraceOp::Switch(pid) => mmu.switch_or_fork(pid),
            }
            check_refcounts(&mmu)?;
            check_tlb_coherent(&mmu)?;
        }
    }
}
