// src/exec/memory.rs

//! Resident-set sampling for child processes.
//!
//! Commands run through `sh -c`, so the interesting memory usually lives in
//! a grandchild. [`process_tree_rss_bytes`] sums `VmRSS` over the child and
//! all of its descendants as listed in `/proc`.
//!
//! On platforms without `/proc` every probe returns `None` and the memory
//! ceiling is not enforced.

/// Share of the ceiling above which a warning is emitted.
pub const WARN_RATIO: f64 = 0.9;

const MIB: u64 = 1024 * 1024;

/// Outcome of comparing one sample against a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryVerdict {
    WithinLimit,
    NearLimit,
    Exceeded,
}

/// Classify a sample against a ceiling given in MiB.
pub fn evaluate(rss_bytes: u64, limit_mb: u64) -> MemoryVerdict {
    let limit = limit_mb.saturating_mul(MIB);
    if rss_bytes > limit {
        MemoryVerdict::Exceeded
    } else if rss_bytes as f64 > limit as f64 * WARN_RATIO {
        MemoryVerdict::NearLimit
    } else {
        MemoryVerdict::WithinLimit
    }
}

pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / MIB
}

/// Resident set of a single process.
pub fn process_rss_bytes(pid: u32) -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        linux::rss_bytes(pid)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        None
    }
}

/// Resident set of a process and all of its descendants.
pub fn process_tree_rss_bytes(root: u32) -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let children = linux::children_by_parent();
        let mut total = linux::rss_bytes(root)?;
        let mut stack: Vec<u32> = children.get(&root).cloned().unwrap_or_default();

        while let Some(pid) = stack.pop() {
            // Processes may exit between the scan and the read.
            total += linux::rss_bytes(pid).unwrap_or(0);
            if let Some(grandchildren) = children.get(&pid) {
                stack.extend(grandchildren.iter().copied());
            }
        }
        Some(total)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = root;
        None
    }
}

/// Parse the parent pid out of a `/proc/<pid>/stat` line.
///
/// The command name is wrapped in parentheses and may itself contain spaces
/// or parentheses, so parsing starts after the *last* `)`.
pub fn parse_stat_ppid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

/// Parse `VmRSS:   1234 kB` out of `/proc/<pid>/status`.
pub fn parse_status_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kb * 1024)
}

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;
    use std::fs;

    use super::{parse_stat_ppid, parse_status_rss};

    pub fn rss_bytes(pid: u32) -> Option<u64> {
        let status = fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
        parse_status_rss(&status)
    }

    pub fn children_by_parent() -> HashMap<u32, Vec<u32>> {
        let Ok(dir) = fs::read_dir("/proc") else {
            return HashMap::new();
        };

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in dir.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Some(ppid) = fs::read_to_string(entry.path().join("stat"))
                .ok()
                .and_then(|stat| parse_stat_ppid(&stat))
            else {
                continue;
            };
            children.entry(ppid).or_default().push(pid);
        }
        children
    }
}
