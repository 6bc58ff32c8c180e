//! A segment: the unit of storage addressed by a single relative path
//! under a dataset root (spec §3, §4.5). Three shapes share this module's
//! surface the way the teacher's `Segment` wraps one on-disk representation
//! behind a single handle type, generalised here to three concrete shapes
//! instead of one.

pub mod compressed;
pub mod concatenated;
pub mod directory;
pub mod reader;
pub mod validators;
pub mod writer;

use crate::error::Error;
use std::path::{Path, PathBuf};

pub use reader::SegmentReader;
pub use writer::{Pending, SegmentWriter};

/// Which on-disk shape a segment's data takes (spec §3's "Segment" model).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Shape {
    /// A single file holding back-to-back format-native messages.
    Concatenated,
    /// A directory of numerically-named files, one message per file.
    Directory,
    /// The concatenated form, gzip-compressed, with a `.gz.idx` seek index.
    Compressed,
}

/// A segment handle: a relative path plus the shape its data takes. Does
/// not itself hold an open file handle — that lives in [`SegmentReader`]'s
/// cache or a live [`Pending`] append.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    /// Path to the segment's data, relative to the dataset root.
    relpath: PathBuf,
    shape: Shape,
}

impl Segment {
    #[must_use]
    pub fn new(relpath: impl Into<PathBuf>, shape: Shape) -> Self {
        Segment {
            relpath: relpath.into(),
            shape,
        }
    }

    /// Inspects `dataset_root` to determine which shape the segment
    /// already has on disk, preferring the compressed form when both a
    /// raw file and its `.gz` sibling exist (a mid-compaction leftover).
    pub fn detect(dataset_root: &Path, relpath: impl Into<PathBuf>) -> crate::Result<Self> {
        let relpath = relpath.into();
        let full_path = dataset_root.join(&relpath);

        if full_path.is_dir() {
            return Ok(Segment::new(relpath, Shape::Directory));
        }

        let gz_path = crate::file::sibling_path(&full_path, crate::file::GZ_EXT);
        if gz_path.exists() {
            return Ok(Segment::new(relpath, Shape::Compressed));
        }

        if full_path.is_file() {
            return Ok(Segment::new(relpath, Shape::Concatenated));
        }

        Err(Error::DataUnavailable {
            path: full_path.display().to_string(),
            reason: "no segment data found for this relative path".to_string(),
        })
    }

    #[must_use]
    pub fn relpath(&self) -> &Path {
        &self.relpath
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[must_use]
    pub fn metadata_sibling(&self, dataset_root: &Path) -> PathBuf {
        crate::file::sibling_path(&dataset_root.join(&self.relpath), crate::file::METADATA_SIBLING_EXT)
    }

    #[must_use]
    pub fn summary_sibling(&self, dataset_root: &Path) -> PathBuf {
        crate::file::sibling_path(&dataset_root.join(&self.relpath), crate::file::SUMMARY_SIBLING_EXT)
    }

    #[must_use]
    pub fn index_sibling(&self, dataset_root: &Path) -> PathBuf {
        crate::file::sibling_path(&dataset_root.join(&self.relpath), crate::file::INDEX_SIBLING_EXT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detect_prefers_directory_shape() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2007/07-08")).unwrap();
        let segment = Segment::detect(dir.path(), "2007/07-08").unwrap();
        assert_eq!(segment.shape(), Shape::Directory);
    }

    #[test]
    fn detect_prefers_compressed_over_concatenated() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2007")).unwrap();
        std::fs::write(dir.path().join("2007/07-08.grib"), b"data").unwrap();
        std::fs::write(dir.path().join("2007/07-08.grib.gz"), b"gzdata").unwrap();
        let segment = Segment::detect(dir.path(), "2007/07-08.grib").unwrap();
        assert_eq!(segment.shape(), Shape::Compressed);
    }

    #[test]
    fn detect_fails_when_nothing_exists() {
        let dir = tempdir().unwrap();
        assert!(Segment::detect(dir.path(), "nope.grib").is_err());
    }
}
