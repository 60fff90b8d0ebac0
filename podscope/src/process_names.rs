//! PID → process name resolution with a run-scoped cache.
//!
//! Two lookup orders share one resolver: the capture thread prefers
//! `cmdline`, while the report falls back through every procfs source for
//! PIDs that reached it without a name. Each order keeps its own cache.
//! Names are never invalidated, so a recycled PID keeps the name of its
//! first owner for the rest of the run.

use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::domain::Pid;

/// Cached, multi-strategy name lookup shared by the capture thread and the
/// report.
#[derive(Debug)]
pub struct ProcessNameResolver {
    proc_root: PathBuf,
    cache: Mutex<HashMap<Pid, String>>,
    report_cache: Mutex<HashMap<Pid, String>>,
}

impl Default for ProcessNameResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessNameResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Resolve against a different procfs mount (used by tests)
    #[must_use]
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
            cache: Mutex::new(HashMap::new()),
            report_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cached name for `pid`, resolving it on first use.
    ///
    /// Tries `cmdline` (basename of argv0), then `stat` (parenthesised comm),
    /// then `comm`. Returns an empty string if all three fail; the empty
    /// result is cached too.
    pub fn resolve(&self, pid: Pid) -> String {
        cached_lookup(&self.cache, pid, || {
            let dir = self.dir(pid);
            name_from_cmdline(&dir)
                .or_else(|| name_from_stat(&dir))
                .or_else(|| name_from_comm(&dir))
        })
    }

    /// Name for a PID the capture side could not label.
    ///
    /// Tries `stat`, `comm`, `cmdline`, the `exe` link target and finally the
    /// `Name:` line of `status`. Cached separately from [`Self::resolve`], so
    /// an empty capture-time result does not hide a later answer.
    pub fn resolve_for_report(&self, pid: Pid) -> String {
        cached_lookup(&self.report_cache, pid, || {
            let dir = self.dir(pid);
            name_from_stat(&dir)
                .or_else(|| name_from_comm(&dir))
                .or_else(|| name_from_cmdline(&dir))
                .or_else(|| name_from_exe(&dir))
                .or_else(|| name_from_status(&dir))
        })
    }

    fn dir(&self, pid: Pid) -> PathBuf {
        self.proc_root.join(pid.0.to_string())
    }

    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.lock().map_or(0, |cache| cache.len())
    }
}

fn cached_lookup(
    cache: &Mutex<HashMap<Pid, String>>,
    pid: Pid,
    lookup: impl FnOnce() -> Option<String>,
) -> String {
    let mut cache = match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(name) = cache.get(&pid) {
        return name.clone();
    }

    let name = lookup().unwrap_or_default();
    if name.is_empty() {
        debug!("could not resolve name for {pid}");
    }
    cache.insert(pid, name.clone());
    name
}

fn name_from_cmdline(dir: &Path) -> Option<String> {
    let cmdline = fs::read(dir.join("cmdline")).ok()?;
    let argv0 = cmdline.split(|&b| b == 0).next()?;
    if argv0.is_empty() {
        return None;
    }
    let argv0 = String::from_utf8_lossy(argv0);
    let base = argv0.rsplit('/').next().unwrap_or(&argv0);
    (!base.is_empty()).then(|| base.to_string())
}

fn name_from_stat(dir: &Path) -> Option<String> {
    let stat = fs::read_to_string(dir.join("stat")).ok()?;
    extract_comm(&stat)
}

/// Extract command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Option<String> {
    let open = stat_line.find('(')?;
    let close = stat_line.rfind(')')?;
    if open >= close {
        return None;
    }
    let comm = &stat_line[open + 1..close];
    (!comm.is_empty()).then(|| comm.to_string())
}

fn name_from_comm(dir: &Path) -> Option<String> {
    let comm = fs::read_to_string(dir.join("comm")).ok()?;
    let comm = comm.trim();
    (!comm.is_empty()).then(|| comm.to_string())
}

fn name_from_exe(dir: &Path) -> Option<String> {
    let target = fs::read_link(dir.join("exe")).ok()?;
    let name = target.file_name()?.to_string_lossy().into_owned();
    (!name.is_empty()).then_some(name)
}

fn name_from_status(dir: &Path) -> Option<String> {
    let status = fs::read_to_string(dir.join("status")).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Name:"))
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_proc(entries: &[(u32, &str, &[u8])]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for (pid, file, content) in entries {
            let dir = root.path().join(pid.to_string());
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(file), content).unwrap();
        }
        root
    }

    #[test]
    fn test_extract_comm() {
        let stat = "1234 (my-app) S 1 1234 1234 0 -1 4194304";
        assert_eq!(extract_comm(stat).unwrap(), "my-app");
    }

    #[test]
    fn test_extract_comm_with_parens() {
        // Command names can contain parentheses
        let stat = "1234 (app (v2)) S 1 1234";
        assert_eq!(extract_comm(stat).unwrap(), "app (v2)");
    }

    #[test]
    fn test_cmdline_basename_wins() {
        let root = fake_proc(&[
            (10, "cmdline", b"/usr/local/bin/nginx\0-g\0daemon off;\0"),
            (10, "comm", b"worker\n"),
        ]);
        let resolver = ProcessNameResolver::with_proc_root(root.path());
        assert_eq!(resolver.resolve(Pid(10)), "nginx");
    }

    #[test]
    fn test_falls_back_to_stat_then_comm() {
        let root = fake_proc(&[
            (20, "cmdline", b""),
            (20, "stat", b"20 (kworker/0:1) I 2"),
            (30, "comm", b"postgres\n"),
        ]);
        let resolver = ProcessNameResolver::with_proc_root(root.path());
        assert_eq!(resolver.resolve(Pid(20)), "kworker/0:1");
        assert_eq!(resolver.resolve(Pid(30)), "postgres");
    }

    #[test]
    fn test_unresolvable_is_empty_and_cached() {
        let root = tempfile::tempdir().unwrap();
        let resolver = ProcessNameResolver::with_proc_root(root.path());
        assert_eq!(resolver.resolve(Pid(99)), "");
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_report_lookup_reads_status_name() {
        let root = fake_proc(&[(50, "status", b"Umask:\t0022\nName:\tredis-server\nState:\tS\n")]);
        let resolver = ProcessNameResolver::with_proc_root(root.path());
        assert_eq!(resolver.resolve(Pid(50)), "");
        assert_eq!(resolver.resolve_for_report(Pid(50)), "redis-server");
    }

    #[test]
    fn test_report_lookup_prefers_stat_over_cmdline() {
        let root = fake_proc(&[
            (60, "cmdline", b"/usr/bin/python3\0app.py\0"),
            (60, "stat", b"60 (gunicorn) S 1"),
        ]);
        let resolver = ProcessNameResolver::with_proc_root(root.path());
        assert_eq!(resolver.resolve(Pid(60)), "python3");
        assert_eq!(resolver.resolve_for_report(Pid(60)), "gunicorn");
    }

    #[test]
    fn test_report_lookup_follows_exe_link() {
        let root = fake_proc(&[(70, "status", b"Name:\tshadowed\n")]);
        std::os::unix::fs::symlink("/opt/envoy/bin/envoy", root.path().join("70").join("exe")).unwrap();
        let resolver = ProcessNameResolver::with_proc_root(root.path());
        assert_eq!(resolver.resolve_for_report(Pid(70)), "envoy");
    }

    #[test]
    fn test_cache_is_never_invalidated() {
        let root = fake_proc(&[(40, "comm", b"first\n")]);
        let resolver = ProcessNameResolver::with_proc_root(root.path());
        assert_eq!(resolver.resolve(Pid(40)), "first");

        fs::write(root.path().join("40").join("comm"), b"second\n").unwrap();
        assert_eq!(resolver.resolve(Pid(40)), "first");
    }
}
