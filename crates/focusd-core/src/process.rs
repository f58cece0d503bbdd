//! Process liveness probing.

use std::path::PathBuf;

use crate::focus::Pid;

/// Answers whether a client process is still running.
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: Pid) -> bool;
}

/// Probe backed by `/proc/<pid>`.
///
/// A pid whose proc entry cannot be stat'ed counts as dead.
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    root: PathBuf,
}

impl ProcfsProbe {
    #[must_use]
    pub fn new() -> Self {
        Self { root: PathBuf::from("/proc") }
    }

    /// Probe against a different proc root (for testing).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for ProcfsProbe {
    fn is_alive(&self, pid: Pid) -> bool {
        pid > 0 && std::fs::metadata(self.root.join(pid.to_string())).is_ok()
    }
}
