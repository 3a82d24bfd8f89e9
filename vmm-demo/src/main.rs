//! Interactive driver around [`vmm::mmu::Mmu`].
//!
//! Reads a trace from the file named on the command line (or stdin), feeds
//! each command through the probe / walk / fault cycle, and prints what the
//! translation machinery did. `RUST_LOG=debug` shows the fault handler's
//! internals on stderr. The command grammar lives in [`trace`].

mod trace;

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use anyhow::{Context, Result};
use log::{debug, warn};

use vmm::error::MmuError;
use vmm::memory::FrameBuffer;
use vmm::mmu::Mmu;
use vmm::AccessMode;

use trace::Command;

// Default geometry: 16 directories of 16 entries (256 virtual pages), 128
// physical frames, and a TLB big enough to hold every resident translation.
const FRAMES: usize = 128;
const DIRS: usize = 16;
const SPAN: usize = 16;
const TLB_SLOTS: usize = 256;
const FRAME_SIZE: usize = 32;

type DemoMmu = Mmu<FRAMES, DIRS, SPAN, TLB_SLOTS, FrameBuffer>;

#[derive(Default)]
struct Stats {
    accesses: usize,
    tlb_hits: usize,
    walk_hits: usize,
    faults_resolved: usize,
    errors: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let mut mmu: DemoMmu = Mmu::new(FrameBuffer::new(FRAMES, FRAME_SIZE));
    let mut stats = Stats::default();

    let reader: Box<dyn BufRead> = match std::env::args().nth(1) {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("opening trace {path:?}"))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    for (number, line) in reader.lines().enumerate() {
        let line = line.context("reading trace")?;
        match trace::parse(&line) {
            Ok(Some(command)) => run(&mut mmu, command, &mut stats),
            Ok(None) => {}
            Err(err) => warn!("line {}: {err}", number + 1),
        }
    }

    println!(
        "accesses={} tlb_hits={} walk_hits={} faults_resolved={} errors={}",
        stats.accesses, stats.tlb_hits, stats.walk_hits, stats.faults_resolved, stats.errors
    );
    Ok(())
}

fn run(mmu: &mut DemoMmu, command: Command, stats: &mut Stats) {
    match command {
        Command::Access { vpn, mode } => {
            if vpn >= DIRS * SPAN {
                warn!("vpn {vpn:#04x} outside the address space");
                stats.errors += 1;
                return;
            }
            stats.accesses += 1;
            match access(mmu, vpn, mode, stats) {
                Ok(pfn) => {
                    if mode == AccessMode::Write {
                        // Leave a visible mark so copy-on-write divergence
                        // shows up in dumps.
                        let pid = mmu.current().pid;
                        mmu.memory_mut().set_byte(pfn, 0, pid as u8);
                    }
                    println!("{:<5} {vpn:#04x} -> frame {pfn:#04x}", word(mode));
                }
                Err(err) => {
                    stats.errors += 1;
                    println!("{:<5} {vpn:#04x} -> {err}", word(mode));
                }
            }
        }
        Command::Allocate { vpn, mode } => {
            if vpn >= DIRS * SPAN {
                warn!("vpn {vpn:#04x} outside the address space");
                stats.errors += 1;
                return;
            }
            if mmu.translate(vpn, AccessMode::Read).is_ok() {
                println!("alloc {vpn:#04x} -> already mapped");
                stats.errors += 1;
                return;
            }
            match mmu.allocate_frame(vpn, mode) {
                Ok(pfn) => println!("alloc {vpn:#04x} -> frame {pfn:#04x}"),
                Err(err) => {
                    stats.errors += 1;
                    println!("alloc {vpn:#04x} -> {err}");
                }
            }
        }
        Command::Release { vpn } => match mmu.release_page(vpn) {
            Ok(()) => println!("free  {vpn:#04x}"),
            Err(err) => {
                stats.errors += 1;
                println!("free  {vpn:#04x} -> {err}");
            }
        },
        Command::Switch { pid } => {
            let known = pid == mmu.current().pid || mmu.ready().contains(pid);
            mmu.switch_or_fork(pid);
            if known {
                println!("switched to pid {pid}");
            } else {
                println!("forked pid {pid}");
            }
        }
        Command::Show => show(mmu),
        Command::Dump { vpn } => dump(mmu, vpn),
    }
}

/// One full access: probe, walk, and fall into the fault handler if the
/// walk refuses. A resolved fault leaves the translation cached, so the
/// retry is a TLB probe.
fn access(mmu: &mut DemoMmu, vpn: usize, mode: AccessMode, stats: &mut Stats) -> Result<usize, MmuError> {
    if let Some(pfn) = mmu.probe_tlb(vpn, mode) {
        stats.tlb_hits += 1;
        return Ok(pfn);
    }
    match mmu.translate(vpn, mode) {
        Ok(pfn) => {
            stats.walk_hits += 1;
            mmu.record_tlb(vpn, mode, pfn);
            Ok(pfn)
        }
        Err(fault) => {
            debug!("fault on vpn {vpn:#04x} ({fault:?})");
            mmu.resolve_fault(vpn, mode)?;
            stats.faults_resolved += 1;
            let pfn = mmu
                .probe_tlb(vpn, mode)
                .expect("resolved faults leave the translation cached");
            Ok(pfn)
        }
    }
}

fn show(mmu: &DemoMmu) {
    let current = mmu.current();
    println!(
        "pid {} ({} queued, {} free frames, {} live directories, {} tlb entries)",
        current.pid,
        mmu.ready().len(),
        mmu.frames().free_frames(),
        current.page_table.live_directories(),
        mmu.tlb_resident(),
    );
    for (vpn, pte) in current.page_table.iter() {
        println!(
            "  vpn {vpn:#04x} -> frame {:#04x} {}{} (refs {})",
            pte.pfn,
            if pte.writable { "rw" } else { "ro" },
            if pte.shared { " shared" } else { "" },
            mmu.frames().refcount(pte.pfn),
        );
    }
}

fn dump(mmu: &DemoMmu, vpn: usize) {
    match mmu.translate(vpn, AccessMode::Read) {
        Ok(pfn) => println!("frame {pfn:#04x}: {}", hex::encode(mmu.memory().frame(pfn))),
        Err(_) => println!("vpn {vpn:#04x} is not mapped"),
    }
}

fn word(mode: AccessMode) -> &'static str {
    match mode {
        AccessMode::Read => "read",
        AccessMode::Write => "write",
    }
}
