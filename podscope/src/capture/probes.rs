//! # eBPF Artifact Loading and Probe Attachment
//!
//! ## Functions
//!
//! - [`locate_artifact()`] - Find the pre-built object on the search path
//! - [`load_collection()`] - Instantiate maps and programs from the object
//! - [`attach_all()`] - Attach the fixed probe table transactionally
//!
//! ## Attachment Points
//!
//! Entry + return kprobes on `tcp_v4_connect`, `tcp_sendmsg`, `tcp_recvmsg`,
//! `vfs_write` and `vfs_fsync` (see [`podscope_common::PROBES`]). Programs
//! missing from the object are skipped.

use aya::programs::kprobe::KProbeLinkId;
use aya::programs::KProbe;
use aya::Ebpf;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::domain::TracerError;

/// Relative locations tried, in order, when no explicit path is given
pub const ARTIFACT_SEARCH_PATHS: [&str; 2] = ["bpf/podtrace.bpf.o", "../bpf/podtrace.bpf.o"];

/// Read the instrumentation object from the first candidate that resolves.
///
/// # Errors
/// Returns [`TracerError::ArtifactNotFound`] listing every candidate tried.
pub fn locate_artifact(explicit: Option<&Path>) -> Result<(PathBuf, Vec<u8>), TracerError> {
    let candidates: Vec<PathBuf> = explicit
        .map(Path::to_path_buf)
        .into_iter()
        .chain(ARTIFACT_SEARCH_PATHS.iter().map(PathBuf::from))
        .collect();

    for path in &candidates {
        match std::fs::read(path) {
            Ok(bytes) => {
                info!("Using eBPF object: {}", path.display());
                return Ok((path.clone(), bytes));
            }
            Err(e) => debug!("eBPF object not at {}: {e}", path.display()),
        }
    }

    Err(TracerError::ArtifactNotFound { searched: candidates })
}

/// Create the kernel collection (maps, relocations, program definitions).
///
/// # Errors
/// Returns [`TracerError::CollectionFailed`] if the object is rejected.
pub fn load_collection(bytes: &[u8]) -> Result<Ebpf, TracerError> {
    Ok(Ebpf::load(bytes)?)
}

/// Seam over the kernel attach/detach calls.
pub trait ProbeTarget {
    type Link;

    /// Attach `program` to `symbol`. `Ok(None)` means the program is not
    /// present and was skipped.
    ///
    /// # Errors
    /// Returns an error if the program exists but cannot be loaded or attached.
    fn attach(&mut self, program: &str, symbol: &str) -> Result<Option<Self::Link>, TracerError>;

    /// Release a link created by [`ProbeTarget::attach`].
    ///
    /// # Errors
    /// Returns an error if the kernel refuses the detach.
    fn detach(&mut self, program: &str, link: Self::Link) -> Result<(), TracerError>;
}

/// Live attach handles, in attachment order
#[derive(Debug)]
pub struct ProbeAttachments<L> {
    links: Vec<(String, L)>,
}

impl<L> ProbeAttachments<L> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Detach every probe, newest first. Failures are logged; the remaining
    /// probes are still released.
    pub fn release<T: ProbeTarget<Link = L>>(self, target: &mut T) {
        for (program, link) in self.links.into_iter().rev() {
            if let Err(e) = target.detach(&program, link) {
                warn!("failed to detach {program}: {e}");
            }
        }
    }
}

/// Accumulates attach handles; on failure everything acquired so far is
/// released (reverse order) before the error is returned.
pub struct AttachmentBuilder<L> {
    links: Vec<(String, L)>,
}

impl<L> Default for AttachmentBuilder<L> {
    fn default() -> Self {
        Self { links: Vec::new() }
    }
}

impl<L> AttachmentBuilder<L> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach one probe.
    ///
    /// # Errors
    /// On failure the builder has already rolled back every earlier
    /// attachment; it is consumed and nothing stays attached.
    pub fn attach<T: ProbeTarget<Link = L>>(
        mut self,
        target: &mut T,
        program: &str,
        symbol: &str,
    ) -> Result<Self, TracerError> {
        match target.attach(program, symbol) {
            Ok(Some(link)) => {
                debug!("attached {program} -> {symbol}");
                self.links.push((program.to_string(), link));
                Ok(self)
            }
            Ok(None) => {
                warn!("{program} not present in eBPF object, skipping");
                Ok(self)
            }
            Err(e) => {
                ProbeAttachments { links: self.links }.release(target);
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn finish(self) -> ProbeAttachments<L> {
        ProbeAttachments { links: self.links }
    }
}

/// Attach every probe in `table`, all-or-nothing.
///
/// # Errors
/// Returns the first attach failure after rolling back.
pub fn attach_all<T: ProbeTarget>(
    target: &mut T,
    table: &[(&str, &str)],
) -> Result<ProbeAttachments<T::Link>, TracerError> {
    let mut builder = AttachmentBuilder::new();
    for (program, symbol) in table {
        builder = builder.attach(target, program, symbol)?;
    }
    let attachments = builder.finish();
    info!("Attached {} of {} probes", attachments.len(), table.len());
    Ok(attachments)
}

impl ProbeTarget for Ebpf {
    type Link = KProbeLinkId;

    fn attach(&mut self, program: &str, symbol: &str) -> Result<Option<KProbeLinkId>, TracerError> {
        let attach_failed = |reason: String| TracerError::ProbeAttachFailed {
            program: program.to_string(),
            symbol: symbol.to_string(),
            reason,
        };

        let Some(prog) = self.program_mut(program) else {
            return Ok(None);
        };
        let probe: &mut KProbe = prog.try_into().map_err(|e| attach_failed(format!("{e}")))?;
        probe.load().map_err(|e| attach_failed(format!("{e}")))?;
        let link = probe.attach(symbol, 0).map_err(|e| attach_failed(format!("{e}")))?;
        Ok(Some(link))
    }

    fn detach(&mut self, program: &str, link: KProbeLinkId) -> Result<(), TracerError> {
        let detach_failed = |reason: String| TracerError::ProbeAttachFailed {
            program: program.to_string(),
            symbol: "<detach>".to_string(),
            reason,
        };
        let probe: &mut KProbe = self
            .program_mut(program)
            .ok_or_else(|| detach_failed("program vanished".to_string()))?
            .try_into()
            .map_err(|e| detach_failed(format!("{e}")))?;
        probe.detach(link).map_err(|e| detach_failed(format!("{e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails the `fail_at`-th attach call (1-based) and tracks live links.
    #[derive(Default)]
    struct FakeKernel {
        fail_at: Option<usize>,
        missing: Vec<&'static str>,
        attach_calls: usize,
        live: Vec<u32>,
        detach_order: Vec<u32>,
        next_id: u32,
    }

    impl ProbeTarget for FakeKernel {
        type Link = u32;

        fn attach(&mut self, program: &str, symbol: &str) -> Result<Option<u32>, TracerError> {
            if self.missing.contains(&program) {
                return Ok(None);
            }
            self.attach_calls += 1;
            if self.fail_at == Some(self.attach_calls) {
                return Err(TracerError::ProbeAttachFailed {
                    program: program.to_string(),
                    symbol: symbol.to_string(),
                    reason: "EINVAL".to_string(),
                });
            }
            self.next_id += 1;
            self.live.push(self.next_id);
            Ok(Some(self.next_id))
        }

        fn detach(&mut self, _program: &str, link: u32) -> Result<(), TracerError> {
            self.live.retain(|&l| l != link);
            self.detach_order.push(link);
            Ok(())
        }
    }

    #[test]
    fn test_all_probes_attach() {
        let mut kernel = FakeKernel::default();
        let attachments = attach_all(&mut kernel, &podscope_common::PROBES).unwrap();
        assert_eq!(attachments.len(), 10);
        assert_eq!(kernel.live.len(), 10);

        attachments.release(&mut kernel);
        assert!(kernel.live.is_empty());
        assert_eq!(kernel.detach_order, (1..=10).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_attach_rolls_back_in_reverse() {
        for n in 1..=10 {
            let mut kernel = FakeKernel { fail_at: Some(n), ..FakeKernel::default() };
            let result = attach_all(&mut kernel, &podscope_common::PROBES);

            assert!(result.is_err());
            // N-1 probes were acquired before the failure, all of them released
            assert_eq!(kernel.next_id as usize, n - 1);
            assert!(kernel.live.is_empty(), "attempt {n} leaked {:?}", kernel.live);
            let expected: Vec<u32> = (1..u32::try_from(n).unwrap()).rev().collect();
            assert_eq!(kernel.detach_order, expected);
        }
    }

    #[test]
    fn test_missing_programs_are_skipped() {
        let mut kernel = FakeKernel {
            missing: vec!["kprobe_vfs_fsync", "kretprobe_vfs_fsync"],
            ..FakeKernel::default()
        };
        let attachments = attach_all(&mut kernel, &podscope_common::PROBES).unwrap();
        assert_eq!(attachments.len(), 8);
    }

    #[test]
    fn test_explicit_artifact_path_is_tried_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.bpf.o");
        std::fs::write(&path, b"\x7fELF").unwrap();

        let (found, bytes) = locate_artifact(Some(&path)).unwrap();
        assert_eq!(found, path);
        assert_eq!(bytes, b"\x7fELF");
    }

    #[test]
    fn test_missing_artifact_lists_search_paths() {
        let err = locate_artifact(Some(Path::new("/nonexistent/podtrace.bpf.o"))).unwrap_err();
        match err {
            TracerError::ArtifactNotFound { searched } => {
                assert_eq!(searched.len(), 3);
                assert_eq!(searched[1], PathBuf::from(ARTIFACT_SEARCH_PATHS[0]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
