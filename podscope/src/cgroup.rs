//! Cgroup membership checks
//!
//! A PID is in scope when its cgroup (from `/proc/<pid>/cgroup`) equals the
//! target scope or either one is an ancestor of the other, which tolerates
//! containers that run their processes in nested sub-scopes.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::domain::Pid;

/// Mount point stripped from both sides before comparison
const CGROUP_MOUNT: &str = "/sys/fs/cgroup";

/// Decides whether a PID belongs to the target container.
///
/// With no scope configured every PID passes. Clones share the scope, so a
/// filter handed to the capture thread follows later [`CgroupFilter::set_scope`]
/// calls.
#[derive(Debug, Clone)]
pub struct CgroupFilter {
    proc_root: PathBuf,
    scope: Arc<RwLock<Option<String>>>,
}

impl Default for CgroupFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl CgroupFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    #[must_use]
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self { proc_root: root.into(), scope: Arc::new(RwLock::new(None)) }
    }

    /// Set the target scope. Only affects events checked afterwards.
    pub fn set_scope(&self, path: Option<&str>) {
        let scope = path.filter(|p| !p.is_empty()).map(normalize);
        match self.scope.write() {
            Ok(mut guard) => *guard = scope,
            Err(poisoned) => *poisoned.into_inner() = scope,
        }
    }

    fn current_scope(&self) -> Option<String> {
        match self.scope.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Unreadable or unparseable cgroup files fail closed.
    #[must_use]
    pub fn contains(&self, pid: Pid) -> bool {
        let Some(scope) = self.current_scope() else {
            return true;
        };

        let path = self.proc_root.join(pid.0.to_string()).join("cgroup");
        let Ok(content) = fs::read_to_string(path) else {
            return false;
        };
        let Some(candidate) = extract_cgroup_path(content.trim()) else {
            return false;
        };

        paths_related(&scope, &normalize(candidate))
    }
}

/// Pull the canonical path out of `/proc/<pid>/cgroup` content.
///
/// Unified hierarchy (`0::/path`) yields the path directly; otherwise the
/// third field of the last non-empty line is used.
#[must_use]
pub fn extract_cgroup_path(content: &str) -> Option<&str> {
    if let Some(path) = content.strip_prefix("0::") {
        return Some(path.lines().next().unwrap_or(path));
    }

    let line = content.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    line.splitn(3, ':').nth(2)
}

/// Strip the cgroupfs mount prefix and any trailing slash; ensure a leading one.
#[must_use]
pub fn normalize(path: &str) -> String {
    let path = path.strip_prefix(CGROUP_MOUNT).unwrap_or(path);
    let path = path.trim_end_matches('/');
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Equal, or one is a path-component ancestor of the other.
#[must_use]
pub fn paths_related(a: &str, b: &str) -> bool {
    a == b || is_ancestor(a, b) || is_ancestor(b, a)
}

fn is_ancestor(ancestor: &str, path: &str) -> bool {
    ancestor == "/" || path.strip_prefix(ancestor).is_some_and(|rest| rest.starts_with('/'))
}
