//! Lock tiers over a dataset (spec §5): shared `ReadLock`, exclusive
//! `AppendLock`, exclusive `CheckLock`, all backed by one advisory file
//! lock on the dataset's `lock` file, plus a subordinate per-segment
//! append lock. An in-process tracking structure makes same-thread
//! re-acquisition of a held lock a no-op rather than a self-deadlock.

use crate::error::Error;
use crate::file::LOCK_FILE;
use fs4::fs_std::FileExt;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

thread_local! {
    /// Dataset roots for which this thread already holds a lock, so that a
    /// reentrant acquisition (e.g. a query that legitimately opens the same
    /// dataset twice within one call chain) does not block on itself.
    static HELD: RefCell<HashSet<PathBuf>> = RefCell::new(HashSet::new());
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tier {
    Read,
    Append,
    Check,
}

/// A held lock on a dataset's `lock` file. Dropping it releases the
/// underlying advisory lock and clears this thread's reentrancy marker.
pub struct DatasetLock {
    root: PathBuf,
    tier: Tier,
    file: Option<File>,
    reentrant: bool,
}

impl DatasetLock {
    /// Acquires `tier` on the dataset rooted at `root`. If this thread
    /// already holds a lock on the same dataset, returns a reentrant guard
    /// that performs no further locking and releases nothing on drop —
    /// matching spec §5's "inner-process tracking structure to enforce
    /// reentrant use and to prevent a thread from deadlocking itself".
    pub fn acquire(root: &Path, tier: Tier) -> crate::Result<Self> {
        let already_held = HELD.with(|held| held.borrow().contains(root));
        if already_held {
            return Ok(DatasetLock {
                root: root.to_path_buf(),
                tier,
                file: None,
                reentrant: true,
            });
        }

        std::fs::create_dir_all(root)?;
        let lock_path = root.join(LOCK_FILE);
        let file = OpenOptions::new().create(true).write(true).open(&lock_path)?;

        match tier {
            Tier::Read => FileExt::lock_shared(&file)?,
            Tier::Append | Tier::Check => FileExt::lock_exclusive(&file)?,
        }

        HELD.with(|held| held.borrow_mut().insert(root.to_path_buf()));

        Ok(DatasetLock {
            root: root.to_path_buf(),
            tier,
            file: Some(file),
            reentrant: false,
        })
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        if self.reentrant {
            return;
        }
        if let Some(file) = &self.file {
            let _ = FileExt::unlock(file);
        }
        HELD.with(|held| {
            held.borrow_mut().remove(&self.root);
        });
    }
}

/// A segment's exclusive append lock, subordinate to the dataset-level
/// lock: callers are expected to already hold at least an `AppendLock` on
/// the owning dataset before acquiring this.
pub struct SegmentLock {
    file: File,
}

impl SegmentLock {
    pub fn acquire(segment_path: &Path) -> crate::Result<Self> {
        let lock_path = segment_lock_path(segment_path);
        let file = OpenOptions::new().create(true).write(true).open(&lock_path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(SegmentLock { file })
    }
}

impl Drop for SegmentLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn segment_lock_path(segment_path: &Path) -> PathBuf {
    crate::file::sibling_path(segment_path, "lock")
}

/// Fails loudly on detected callback re-entry into the dataset that
/// produced the callback (spec §5's "the core detects re-entry as a bug
/// and fails loudly"), rather than deadlocking.
pub fn reject_reentrant_callback(root: &Path) -> crate::Result<()> {
    let held = HELD.with(|held| held.borrow().contains(root));
    if held {
        return Err(Error::Reentrancy(format!(
            "callback attempted to re-enter dataset {}",
            root.display()
        )));
    }
    Ok(())
}

/// Shared handle for callers that need to hold a lock across an `Arc`
/// boundary (e.g. a query result iterator that outlives the call that
/// acquired the lock).
pub type SharedDatasetLock = Arc<DatasetLock>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reentrant_acquisition_does_not_block() {
        let dir = tempdir().unwrap();
        let first = DatasetLock::acquire(dir.path(), Tier::Append).unwrap();
        let second = DatasetLock::acquire(dir.path(), Tier::Append).unwrap();
        drop(second);
        drop(first);
    }

    #[test]
    fn reject_reentrant_callback_detects_held_lock() {
        let dir = tempdir().unwrap();
        let _lock = DatasetLock::acquire(dir.path(), Tier::Read).unwrap();
        assert!(reject_reentrant_callback(dir.path()).is_err());
    }

    #[test]
    fn segment_lock_round_trips_acquire_and_drop() {
        let dir = tempdir().unwrap();
        let seg = dir.path().join("2007/07-08.grib");
        std::fs::create_dir_all(seg.parent().unwrap()).unwrap();
        let lock = SegmentLock::acquire(&seg).unwrap();
        drop(lock);
    }
}
