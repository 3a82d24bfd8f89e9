//! Trace decoding: one command per line, `#` starts a comment.
//!
//! | line      | meaning                                        |
//! |-----------|------------------------------------------------|
//! | `r <vpn>` | read access                                    |
//! | `w <vpn>` | write access                                   |
//! | `a <vpn> <r\|w>` | populate the page ahead of any access   |
//! | `f <vpn>` | release the page                               |
//! | `s <pid>` | switch to `pid`, forking it if it is new       |
//! | `p`       | print the current address space                |
//! | `d <vpn>` | hex-dump the frame behind `vpn`                |

use std::str::{FromStr, SplitWhitespace};

use anyhow::{anyhow, bail, Result};
use vmm::AccessMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Access { vpn: usize, mode: AccessMode },
    Allocate { vpn: usize, mode: AccessMode },
    Release { vpn: usize },
    Switch { pid: u32 },
    Show,
    Dump { vpn: usize },
}

/// Decodes one line. `Ok(None)` is a blank or comment line.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = match line.split_once('#') {
        Some((head, _)) => head,
        None => line,
    };
    let mut words = line.split_whitespace();
    let Some(op) = words.next() else {
        return Ok(None);
    };
    let command = match op {
        "r" => Command::Access {
            vpn: arg(&mut words, "vpn")?,
            mode: AccessMode::Read,
        },
        "w" => Command::Access {
            vpn: arg(&mut words, "vpn")?,
            mode: AccessMode::Write,
        },
        "a" => {
            let vpn = arg(&mut words, "vpn")?;
            let mode = match words.next() {
                Some("r") => AccessMode::Read,
                Some("w") => AccessMode::Write,
                other => bail!("allocate mode must be r or w, got {other:?}"),
            };
            Command::Allocate { vpn, mode }
        }
        "f" => Command::Release {
            vpn: arg(&mut words, "vpn")?,
        },
        "s" => Command::Switch {
            pid: arg(&mut words, "pid")?,
        },
        "p" => Command::Show,
        "d" => Command::Dump {
            vpn: arg(&mut words, "vpn")?,
        },
        other => bail!("unknown command {other:?}"),
    };
    if let Some(extra) = words.next() {
        bail!("trailing token {extra:?} after {op:?}");
    }
    Ok(Some(command))
}

fn arg<T: FromStr>(words: &mut SplitWhitespace<'_>, what: &str) -> Result<T> {
    let word = words.next().ok_or_else(|| anyhow!("missing {what}"))?;
    word.parse()
        .map_err(|_| anyhow!("bad {what} {word:?}"))
}
