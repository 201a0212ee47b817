// src/pipeline/version.rs

//! Lenient runtime version parsing (`v18.17.0`, `18.17`, `20`,
//! `Python 3.11.4`).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl RuntimeVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string. A leading `v` is accepted, missing components
    /// default to zero and anything after the numeric part (`-rc.1`,
    /// `+build`) is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix(['v', 'V']).unwrap_or(s);
        let end = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        Self::from_numeric(&s[..end])
    }

    /// First version-looking token in free-form command output, e.g. the
    /// output of `node --version` or `go version`.
    pub fn find_in(output: &str) -> Option<Self> {
        let bytes = output.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let starts_number = bytes[i].is_ascii_digit()
                && (i == 0 || !(bytes[i - 1].is_ascii_digit() || bytes[i - 1] == b'.'));
            if starts_number {
                let run = output[i..]
                    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                    .map_or(output.len(), |n| i + n);
                if let Some(version) = Self::from_numeric(&output[i..run]) {
                    return Some(version);
                }
                i = run;
            } else {
                i += 1;
            }
        }
        None
    }

    fn from_numeric(s: &str) -> Option<Self> {
        let mut parts = s.trim_end_matches('.').split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for RuntimeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid version '{s}'"))
    }
}

/// Minimum runtime version, probed by running `version_command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRequirement {
    pub version_command: String,
    pub min_version: Option<RuntimeVersion>,
}
