//! A small per-process cache in front of [`Segment::detect`] and reads
//! (spec §4.4's "avoid rewinding on in-order reads", §7's fd-reuse
//! intent): one cached `(shape, mtime)` per segment path, invalidated the
//! moment the file's mtime moves, so a maintenance run truncating or
//! replacing a segment out from under a long-lived reader is observed
//! rather than silently served stale data.

use crate::segment::{Segment, Shape};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use quick_cache::sync::Cache;

#[derive(Clone, Copy, Debug)]
struct CachedShape {
    shape: Shape,
    mtime: Option<SystemTime>,
}

/// A dataset-scoped cache of segment shapes, shared across queries against
/// the same dataset. Cheap to construct; holds no file descriptors itself
/// — `SegmentReader` opens fresh handles per read, matching the teacher's
/// choice of a stateless block loader behind its own cache.
pub struct ReaderCache {
    dataset_root: PathBuf,
    shapes: Cache<PathBuf, CachedShape>,
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

impl ReaderCache {
    #[must_use]
    pub fn new(dataset_root: impl Into<PathBuf>, capacity: usize) -> Self {
        ReaderCache {
            dataset_root: dataset_root.into(),
            shapes: Cache::new(capacity),
        }
    }

    /// Resolves `relpath` to a [`Segment`], reusing the cached shape if the
    /// segment's on-disk mtime has not moved since it was last detected.
    pub fn segment(&self, relpath: impl Into<PathBuf>) -> crate::Result<Segment> {
        let relpath = relpath.into();
        let full_path = self.dataset_root.join(&relpath);
        let current_mtime = mtime_of(&full_path);

        if let Some(cached) = self.shapes.get(&relpath) {
            if cached.mtime == current_mtime {
                return Ok(Segment::new(relpath, cached.shape));
            }
        }

        let segment = Segment::detect(&self.dataset_root, relpath.clone())?;
        self.shapes.insert(
            relpath,
            CachedShape {
                shape: segment.shape(),
                mtime: current_mtime,
            },
        );
        Ok(segment)
    }

    /// Drops a segment's cached shape, forcing the next `segment()` call to
    /// re-detect it from disk (used after a repack replaces a segment's
    /// on-disk form).
    pub fn invalidate(&self, relpath: &Path) {
        self.shapes.remove(relpath);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reuses_cached_shape_when_mtime_is_unchanged() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("seg.grib"), b"data").unwrap();
        let cache = ReaderCache::new(dir.path(), 16);

        let first = cache.segment("seg.grib").unwrap();
        let second = cache.segment("seg.grib").unwrap();
        assert_eq!(first.shape(), second.shape());
        assert_eq!(first.shape(), Shape::Concatenated);
    }

    #[test]
    fn invalidate_forces_redetection() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("seg.grib"), b"data").unwrap();
        let cache = ReaderCache::new(dir.path(), 16);
        cache.segment("seg.grib").unwrap();

        std::fs::remove_file(dir.path().join("seg.grib")).unwrap();
        std::fs::create_dir(dir.path().join("seg.grib")).unwrap();
        cache.invalidate(Path::new("seg.grib"));

        let segment = cache.segment("seg.grib").unwrap();
        assert_eq!(segment.shape(), Shape::Directory);
    }
}
