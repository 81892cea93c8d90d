//! Linux memory probe backed by `/proc` and cgroup files.
//!
//! - `used`: `VmRSS` from `/proc/self/status`
//! - `total`: `MemTotal` from `/proc/meminfo`
//! - `limit`: the first cgroup limit found (v2 `memory.max`, then v1
//!   `memory.limit_in_bytes`) when it is below `total`, otherwise `total`.
//!   An explicit override wins over both.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::probe::{MemoryCounters, MemoryProbe};

const PROC_STATUS: &str = "/proc/self/status";
const PROC_MEMINFO: &str = "/proc/meminfo";
const CGROUP_V2_MAX: &str = "/sys/fs/cgroup/memory.max";
const CGROUP_V1_LIMIT: &str = "/sys/fs/cgroup/memory/memory.limit_in_bytes";

/// cgroup v1 reports "unlimited" as a huge page-aligned number.
const CGROUP_UNLIMITED_FLOOR: u64 = 1 << 60;

#[derive(Debug, Clone)]
pub struct ProcProbe {
    status_path: PathBuf,
    meminfo_path: PathBuf,
    cgroup_limit_paths: Vec<PathBuf>,
    limit_override: Option<u64>,
}

impl ProcProbe {
    /// Probe reading the standard Linux locations.
    pub fn new() -> Self {
        Self {
            status_path: PathBuf::from(PROC_STATUS),
            meminfo_path: PathBuf::from(PROC_MEMINFO),
            cgroup_limit_paths: vec![PathBuf::from(CGROUP_V2_MAX), PathBuf::from(CGROUP_V1_LIMIT)],
            limit_override: None,
        }
    }

    /// A standard probe, if this system can actually be read.
    pub fn detect() -> Option<Self> {
        let probe = Self::new();
        match probe.read_counters() {
            Ok(_) => Some(probe),
            Err(e) => {
                debug!("procfs memory probe unavailable: {e}");
                None
            }
        }
    }

    /// Probe reading custom status and meminfo files, with no cgroup lookup.
    pub fn with_paths(status: impl Into<PathBuf>, meminfo: impl Into<PathBuf>) -> Self {
        Self {
            status_path: status.into(),
            meminfo_path: meminfo.into(),
            cgroup_limit_paths: Vec::new(),
            limit_override: None,
        }
    }

    /// Add a cgroup limit file to consult, after any already configured.
    pub fn with_cgroup_limit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cgroup_limit_paths.push(path.into());
        self
    }

    /// Use a fixed limit instead of cgroup or total memory.
    pub fn with_limit(mut self, bytes: u64) -> Self {
        self.limit_override = Some(bytes);
        self
    }

    fn read_counters(&self) -> Result<MemoryCounters, String> {
        let status = read_file(&self.status_path)?;
        let used = parse_kb_field(&status, "VmRSS")
            .ok_or_else(|| format!("no VmRSS in {}", self.status_path.display()))?;

        let meminfo = read_file(&self.meminfo_path)?;
        let total = parse_kb_field(&meminfo, "MemTotal")
            .ok_or_else(|| format!("no MemTotal in {}", self.meminfo_path.display()))?;

        let limit = match self.limit_override {
            Some(limit) => limit,
            None => self
                .cgroup_limit()
                .filter(|&limit| limit < total)
                .unwrap_or(total),
        };

        Ok(MemoryCounters::new(used, total, limit))
    }

    fn cgroup_limit(&self) -> Option<u64> {
        self.cgroup_limit_paths
            .iter()
            .find_map(|path| fs::read_to_string(path).ok().and_then(|s| parse_cgroup_limit(&s)))
    }
}

impl Default for ProcProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcProbe {
    fn read(&self) -> Option<MemoryCounters> {
        match self.read_counters() {
            Ok(counters) => Some(counters),
            Err(e) => {
                debug!("procfs read failed: {e}");
                None
            }
        }
    }

    fn name(&self) -> &str {
        "procfs"
    }
}

fn read_file(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))
}

/// Parse a `Name:   1234 kB` line into bytes.
pub(crate) fn parse_kb_field(text: &str, field: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != field {
            return None;
        }
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        match parts.next() {
            Some(unit) if unit.eq_ignore_ascii_case("kb") => value.checked_mul(1024),
            Some(_) => None,
            None => Some(value),
        }
    })
}

/// Parse a cgroup limit file. `max` and the v1 "unlimited" sentinel yield
/// `None`.
pub(crate) fn parse_cgroup_limit(text: &str) -> Option<u64> {
    let text = text.trim();
    if text == "max" {
        return None;
    }
    let value: u64 = text.parse().ok()?;
    (value < CGROUP_UNLIMITED_FLOOR).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STATUS: &str = "Name:\treclaim\nVmPeak:\t  20000 kB\nVmRSS:\t   4096 kB\nThreads:\t4\n";
    const MEMINFO: &str = "MemTotal:       16384 kB\nMemFree:         1024 kB\n";

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_kb_fields() {
        assert_eq!(parse_kb_field(STATUS, "VmRSS"), Some(4096 * 1024));
        assert_eq!(parse_kb_field(MEMINFO, "MemTotal"), Some(16384 * 1024));
        assert_eq!(parse_kb_field(STATUS, "Threads"), Some(4));
        assert_eq!(parse_kb_field(STATUS, "VmSwap"), None);
    }

    #[test]
    fn oversized_kb_field_is_rejected() {
        assert_eq!(parse_kb_field("VmRSS: 18446744073709551615 kB\n", "VmRSS"), None);
        assert_eq!(
            parse_kb_field("VmRSS: 18446744073709551615\n", "VmRSS"),
            Some(u64::MAX)
        );
    }

    #[test]
    fn does_not_match_field_prefixes() {
        assert_eq!(parse_kb_field("VmRSSx: 1 kB\n", "VmRSS"), None);
    }

    #[test]
    fn parses_cgroup_limits() {
        assert_eq!(parse_cgroup_limit("max\n"), None);
        assert_eq!(parse_cgroup_limit("1048576\n"), Some(1048576));
        assert_eq!(parse_cgroup_limit("9223372036854771712"), None);
        assert_eq!(parse_cgroup_limit("garbage"), None);
    }

    #[test]
    fn reads_counters_from_files() {
        let status = write_temp(STATUS);
        let meminfo = write_temp(MEMINFO);
        let probe = ProcProbe::with_paths(status.path(), meminfo.path());

        let counters = probe.read().unwrap();
        assert_eq!(counters.used, 4096 * 1024);
        assert_eq!(counters.total, 16384 * 1024);
        assert_eq!(counters.limit, 16384 * 1024);
    }

    #[test]
    fn cgroup_limit_below_total_wins() {
        let status = write_temp(STATUS);
        let meminfo = write_temp(MEMINFO);
        let cgroup = write_temp("8388608\n");
        let probe = ProcProbe::with_paths(status.path(), meminfo.path())
            .with_cgroup_limit_file(cgroup.path());

        assert_eq!(probe.read().unwrap().limit, 8 * 1024 * 1024);
    }

    #[test]
    fn limit_override_wins() {
        let status = write_temp(STATUS);
        let meminfo = write_temp(MEMINFO);
        let probe = ProcProbe::with_paths(status.path(), meminfo.path()).with_limit(5000);
        assert_eq!(probe.read().unwrap().limit, 5000);
    }

    #[test]
    fn missing_files_are_unavailable() {
        let probe = ProcProbe::with_paths("/nonexistent/status", "/nonexistent/meminfo");
        assert!(probe.read().is_none());
    }
}
