//! Workload → container resolution
//!
//! The capture core only needs a cgroup path. [`WorkloadResolver`] is the
//! seam for anything that can produce one; [`CgroupTreeResolver`] treats the
//! target as a container ID and finds its cgroup on the local host.

use log::debug;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::domain::ResolveError;

/// Slices searched, in order, below the cgroup mount
pub const CGROUP_SLICES: [&str; 3] = ["kubepods.slice", "system.slice", "user.slice"];

/// Length of the abbreviated container ID runtimes print
const SHORT_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadInfo {
    pub name: String,
    pub namespace: String,
    pub container_id: String,
    pub cgroup_path: PathBuf,
    pub container_name: String,
}

pub trait WorkloadResolver {
    /// Resolve `name` in `namespace` to its first container.
    ///
    /// # Errors
    /// Fails when the workload has no container, the container ID is
    /// malformed, or no cgroup for it exists.
    fn resolve(&self, name: &str, namespace: &str) -> Result<WorkloadInfo, ResolveError>;
}

/// Strip a `<runtime>://` prefix and validate the bare ID.
///
/// # Errors
/// Rejects empty IDs, repeated or dangling scheme separators and anything
/// that is not alphanumeric (IDs end up in path matching).
pub fn normalize_container_id(raw: &str) -> Result<String, ResolveError> {
    let malformed = || ResolveError::MalformedContainerId(raw.to_string());

    let id = match raw.split_once("://") {
        Some((runtime, id)) if !runtime.is_empty() && !id.contains("://") => id,
        Some(_) => return Err(malformed()),
        None => raw,
    };

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed());
    }
    Ok(id.to_string())
}

/// Finds container cgroups by walking the local cgroup hierarchy.
#[derive(Debug, Clone)]
pub struct CgroupTreeResolver {
    root: PathBuf,
}

impl Default for CgroupTreeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CgroupTreeResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/sys/fs/cgroup")
    }

    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// First directory, pre-order, whose name contains the ID or its short form.
    fn find_cgroup(&self, container_id: &str) -> Option<PathBuf> {
        let short = container_id.get(..SHORT_ID_LEN);

        CGROUP_SLICES
            .iter()
            .map(|slice| self.root.join(slice))
            .filter(|base| base.is_dir())
            .find_map(|base| {
                WalkDir::new(&base)
                    .min_depth(1)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|entry| entry.file_type().is_dir())
                    .find(|entry| {
                        let name = entry.file_name().to_string_lossy();
                        name.contains(container_id) || short.is_some_and(|s| name.contains(s))
                    })
                    .map(walkdir::DirEntry::into_path)
            })
    }
}

impl WorkloadResolver for CgroupTreeResolver {
    fn resolve(&self, name: &str, namespace: &str) -> Result<WorkloadInfo, ResolveError> {
        if name.trim().is_empty() {
            return Err(ResolveError::NoContainers {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        let container_id = normalize_container_id(name)?;
        let cgroup_path = self
            .find_cgroup(&container_id)
            .ok_or_else(|| ResolveError::CgroupNotFound(container_id.clone()))?;
        debug!("container {container_id} → {}", cgroup_path.display());

        let container_name = cgroup_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(WorkloadInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            container_id,
            cgroup_path,
            container_name,
        })
    }
}
