//! Lock owner identity and liveness
//!
//! A sentinel records who holds it. The identity is the host name, the
//! process id, the process start time (Linux only) and a random nonce
//! minted once per process, so a recycled pid never impersonates the
//! original holder.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// Identity of the process holding a sentinel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerId {
    /// Host the process runs on
    pub host: String,
    /// Process id on that host
    pub pid: u32,
    /// Process start time in clock ticks since boot, where available
    #[serde(default)]
    pub started: Option<u64>,
    /// Random per-process token
    pub nonce: Uuid,
}

/// Whether the owner recorded in a sentinel is still running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    /// Owner lives on another host; same-host checks do not apply
    Unknown,
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => write!(f, "alive"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

static CURRENT: OnceLock<OwnerId> = OnceLock::new();

impl OwnerId {
    /// Identity of the calling process
    pub fn current() -> OwnerId {
        let pid = std::process::id();
        let cached = CURRENT.get_or_init(|| Self::fresh(pid));
        // A forked child inherits the cache but is a different owner.
        if cached.pid == pid {
            cached.clone()
        } else {
            Self::fresh(pid)
        }
    }

    fn fresh(pid: u32) -> OwnerId {
        OwnerId {
            host: hostname(),
            pid,
            started: proc_stat(pid).map(|stat| stat.start_ticks),
            nonce: Uuid::new_v4(),
        }
    }

    /// Check whether this owner is still running
    pub fn liveness(&self) -> Liveness {
        let me = Self::current();
        if self.nonce == me.nonce && self.pid == me.pid {
            return Liveness::Alive;
        }
        if self.host != me.host {
            return Liveness::Unknown;
        }
        if !pid_exists(self.pid) {
            return Liveness::Dead;
        }
        match (self.started, proc_stat(self.pid)) {
            (_, Some(stat)) if stat.zombie => Liveness::Dead,
            (Some(recorded), Some(stat)) if recorded != stat.start_ticks => Liveness::Dead,
            _ => Liveness::Alive,
        }
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid {} on {} ({})", self.pid, self.host, self.nonce)
    }
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes and gethostname writes at
    // most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(unix)]
fn pid_exists(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs permission and existence checks only.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to someone else
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_exists(_pid: u32) -> bool {
    true
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
struct ProcStat {
    zombie: bool,
    start_ticks: u64,
}

/// Parse `/proc/<pid>/stat`
#[cfg(target_os = "linux")]
fn proc_stat(pid: u32) -> Option<ProcStat> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // comm may contain spaces and parens; fields resume after the last ')'
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    Some(ProcStat {
        zombie: fields.first() == Some(&"Z"),
        start_ticks: fields.get(19)?.parse().ok()?,
    })
}

#[cfg(not(target_os = "linux"))]
fn proc_stat(_pid: u32) -> Option<ProcStat> {
    None
}
