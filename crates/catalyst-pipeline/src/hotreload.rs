//! Hot-reload: hash watched source files, and replace the running
//! process image when they change (spec 4.2.5).
//!
//! This pipeline is a long-running loop rather than a one-shot
//! invocation, so it needs its own restart-on-change mechanism; the
//! `execv` step is POSIX-only, which is why it lives behind `cfg(unix)`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// SHA-256 hashes of a set of watched files at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSnapshot {
    hashes: BTreeMap<PathBuf, String>,
}

impl HashSnapshot {
    pub fn capture(paths: &[&Path]) -> Result<Self> {
        let mut hashes = BTreeMap::new();
        for path in paths {
            if let Ok(bytes) = std::fs::read(path) {
                let digest = Sha256::digest(&bytes);
                hashes.insert(path.to_path_buf(), hex::encode(digest));
            }
        }
        Ok(Self { hashes })
    }

    /// True if any watched file's hash differs from this snapshot, or a
    /// watched file appeared/disappeared.
    pub fn has_changed(&self, paths: &[&Path]) -> bool {
        match Self::capture(paths) {
            Ok(current) => current.hashes != self.hashes,
            Err(_) => false,
        }
    }
}

/// Shared "restart pending" flag the main loop polls between work
/// items (spec 4.2.5: "between work items the main loop checks the
/// flag").
#[derive(Clone)]
pub struct RestartFlag(Arc<AtomicBool>);

impl RestartFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for RestartFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that samples `watched` every
/// `interval_secs` seconds and sets `flag` on the first detected
/// change. Never applies the change itself -- a TOCTOU race between
/// the flag being set and the main loop reacting to it is fine, the
/// worst case is one extra work item processed on stale code.
pub fn spawn_monitor(
    watched: Vec<PathBuf>,
    interval_secs: u64,
    flag: RestartFlag,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let refs: Vec<&Path> = watched.iter().map(|p| p.as_path()).collect();
        let baseline = match HashSnapshot::capture(&refs) {
            Ok(s) => s,
            Err(_) => return,
        };
        loop {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            if flag.is_set() {
                continue;
            }
            if baseline.has_changed(&refs) {
                flag.set();
            }
        }
    })
}

/// Replace the current process image with the same argv (POSIX
/// `execv`). Never returns on success.
#[cfg(unix)]
pub fn exec_self(executable: &Path) -> Result<std::convert::Infallible> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let args: Vec<CString> = std::env::args_os()
        .map(|a| CString::new(a.as_bytes()).expect("argv has no interior NUL"))
        .collect();
    let exe = CString::new(executable.as_os_str().as_bytes())
        .context("executable path has an interior NUL")?;
    let argv: Vec<*const libc::c_char> = args
        .iter()
        .map(|a| a.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect();

    // SAFETY: `exe` and every element of `argv` are valid, NUL-terminated
    // C strings kept alive for the duration of this call; `argv`'s final
    // element is a null pointer as `execv` requires.
    unsafe {
        libc::execv(exe.as_ptr(), argv.as_ptr());
    }
    anyhow::bail!("execv returned: {}", std::io::Error::last_os_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn snapshot_detects_content_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "fn main() {}").unwrap();
        let snapshot = HashSnapshot::capture(&[&path]).unwrap();
        assert!(!snapshot.has_changed(&[&path]));
        std::fs::write(&path, "fn main() { println!(\"hi\"); }").unwrap();
        assert!(snapshot.has_changed(&[&path]));
    }

    #[test]
    fn snapshot_stable_across_identical_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "unchanged").unwrap();
        let snapshot = HashSnapshot::capture(&[&path]).unwrap();
        assert!(!snapshot.has_changed(&[&path]));
    }

    #[test]
    fn restart_flag_starts_clear() {
        let flag = RestartFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }
}
