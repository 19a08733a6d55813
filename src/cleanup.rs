//! Removal of the staged upload once every page job is done with it.
//!
//! Two paths can delete the file: the [`CompletionBarrier`] when the last job
//! turns terminal, and the [`CleanupGuard`] when the orchestrator leaves its
//! page loop by any route. Both go through [`StagedFile::remove_once`], whose
//! flag makes sure the unlink happens a single time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A local file that is deleted at most once.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    removed: AtomicBool,
}

impl StagedFile {
    pub fn new(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            removed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Delete the file unless someone already did. Returns true for the caller that won.
    pub fn remove_once(&self) -> bool {
        if self.removed.swap(true, Ordering::SeqCst) {
            return false;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staged file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
        true
    }
}

/// Counts terminal transitions and removes the file after the last one.
#[derive(Debug)]
pub struct CompletionBarrier {
    remaining: AtomicUsize,
    file: Arc<StagedFile>,
}

impl CompletionBarrier {
    pub fn new(jobs: usize, file: Arc<StagedFile>) -> Self {
        Self {
            remaining: AtomicUsize::new(jobs),
            file,
        }
    }

    /// Record one job reaching a terminal state.
    ///
    /// Returns true when this was the last job.
    pub fn arrive(&self) -> bool {
        let prev = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match prev {
            Ok(1) => {
                self.file.remove_once();
                true
            }
            Ok(_) => false,
            Err(_) => {
                warn!("Completion barrier arrived past zero");
                false
            }
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }
}

/// Removes the file when dropped, whatever path led out of the scope.
pub struct CleanupGuard {
    file: Arc<StagedFile>,
}

impl CleanupGuard {
    pub fn new(file: Arc<StagedFile>) -> Self {
        Self { file }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.file.remove_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn staged() -> (tempfile::TempDir, Arc<StagedFile>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.pdf");
        std::fs::File::create(&path).unwrap().write_all(b"%PDF").unwrap();
        (dir, StagedFile::new(path))
    }

    #[test]
    fn file_survives_until_last_arrival() {
        let (_dir, file) = staged();
        let barrier = CompletionBarrier::new(3, Arc::clone(&file));

        assert!(!barrier.arrive());
        assert!(!barrier.arrive());
        assert!(file.path().exists());
        assert!(barrier.arrive());
        assert!(!file.path().exists());
        assert_eq!(barrier.remaining(), 0);
    }

    #[test]
    fn extra_arrivals_are_ignored() {
        let (_dir, file) = staged();
        let barrier = CompletionBarrier::new(1, file);
        assert!(barrier.arrive());
        assert!(!barrier.arrive());
    }

    #[test]
    fn only_one_remover_wins() {
        let (_dir, file) = staged();
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| file.remove_once())).collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });
        assert_eq!(winners, 1);
        assert!(file.is_removed());
    }

    #[test]
    fn guard_removes_on_drop() {
        let (_dir, file) = staged();
        {
            let _guard = CleanupGuard::new(Arc::clone(&file));
        }
        assert!(!file.path().exists());
    }
}
