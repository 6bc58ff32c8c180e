//! The append protocol shared by all three segment shapes (spec §4.5):
//! `begin_append` reserves the next offset under an exclusive lock,
//! `append` writes bytes and produces a `BLOB` source, `commit` finalises,
//! and `rollback` — or simply dropping a [`Pending`] without committing —
//! truncates back to the pre-append size.

use super::Shape;
use crate::error::Error;
use crate::lock::SegmentLock;
use crate::types::source::Source;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A segment open for appending. Holds the segment's exclusive lock for
/// its whole lifetime; one `SegmentWriter` per in-flight append.
pub struct SegmentWriter {
    dataset_root: PathBuf,
    relpath: PathBuf,
    shape: Shape,
    _lock: SegmentLock,
}

impl SegmentWriter {
    /// Opens (creating if absent) the segment at `relpath` under
    /// `dataset_root` for appending, acquiring its exclusive lock. Callers
    /// must already hold at least an `AppendLock` on the dataset.
    pub fn open(dataset_root: &Path, relpath: impl Into<PathBuf>, shape: Shape) -> crate::Result<Self> {
        let relpath = relpath.into();
        let full_path = dataset_root.join(&relpath);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if shape == Shape::Directory {
            std::fs::create_dir_all(&full_path)?;
        }
        let lock = SegmentLock::acquire(&full_path)?;
        Ok(SegmentWriter {
            dataset_root: dataset_root.to_path_buf(),
            relpath,
            shape,
            _lock: lock,
        })
    }

    /// Reserves the next offset and returns a [`Pending`] append. For a
    /// concatenated or compressed segment this is the file's current
    /// length; for a directory segment it is the next free numeric
    /// filename.
    pub fn begin_append(&self, format: &str) -> crate::Result<Pending<'_>> {
        match self.shape {
            Shape::Concatenated => {
                let full_path = self.dataset_root.join(&self.relpath);
                let file = OpenOptions::new().create(true).append(true).read(true).open(&full_path)?;
                let offset = file.metadata()?.len();
                Ok(Pending {
                    writer: self,
                    format: format.to_string(),
                    kind: PendingKind::Concatenated { file, pre_size: offset, offset },
                    finished: std::cell::Cell::new(false),
                })
            }
            Shape::Compressed => Err(Error::Config(
                "compressed segments are appended to only via repack, not begin_append".to_string(),
            )),
            Shape::Directory => {
                let dir_path = self.dataset_root.join(&self.relpath);
                let next_offset = next_directory_slot(&dir_path, format)?;
                Ok(Pending {
                    writer: self,
                    format: format.to_string(),
                    kind: PendingKind::Directory { offset: next_offset },
                    finished: std::cell::Cell::new(false),
                })
            }
        }
    }
}

enum PendingKind {
    Concatenated { file: File, pre_size: u64, offset: u64 },
    Directory { offset: u64 },
}

/// An append in progress. Must be finished with [`Pending::commit`] or
/// [`Pending::rollback`]; dropping it uncommitted rolls back (spec §4.5:
/// "A Pending that is dropped without commit or rollback must rollback").
pub struct Pending<'a> {
    writer: &'a SegmentWriter,
    format: String,
    kind: PendingKind,
    finished: std::cell::Cell<bool>,
}

impl<'a> Pending<'a> {
    /// Writes `bytes` and returns the `Source::Blob` the caller should
    /// stamp onto the metadata record. Rollback after this point truncates
    /// the file back to the pre-append size (concatenated/compressed) or
    /// unlinks the new file (directory).
    pub fn append(&mut self, bytes: &[u8]) -> crate::Result<Source> {
        match &mut self.kind {
            PendingKind::Concatenated { file, offset, .. } => {
                file.write_all(bytes)?;
                file.flush()?;
                let source = Source::Blob {
                    format: self.format.clone(),
                    relpath: self.writer.relpath.display().to_string(),
                    offset: *offset,
                    size: bytes.len() as u64,
                };
                *offset += bytes.len() as u64;
                Ok(source)
            }
            PendingKind::Directory { offset } => {
                let filename = format!("{:06}.{}", offset, self.format);
                let full_path = self.writer.dataset_root.join(&self.writer.relpath).join(&filename);
                let mut file = OpenOptions::new().create_new(true).write(true).open(&full_path)?;
                file.write_all(bytes)?;
                file.flush()?;
                // `relpath` names the segment (the directory), matching the
                // concatenated/compressed case where it names the segment
                // file; `offset` is the member's numeric slot, not a byte
                // offset, and the member filename is rebuilt from it on read.
                Ok(Source::Blob {
                    format: self.format.clone(),
                    relpath: self.writer.relpath.display().to_string(),
                    offset: *offset,
                    size: bytes.len() as u64,
                })
            }
        }
    }

    /// Finalises the append; the caller is responsible for committing any
    /// surrounding index transaction first (spec §4.5 step 4: "hand the
    /// new offset to the index writer inside the same surrounding
    /// transaction"). No fsync per record (spec §7); bytes were already
    /// flushed in `append`.
    pub fn commit(self) -> crate::Result<()> {
        self.finished.set(true);
        Ok(())
    }

    pub fn rollback(self) -> crate::Result<()> {
        let result = self.do_rollback();
        self.finished.set(true);
        result
    }

    fn do_rollback(&self) -> crate::Result<()> {
        match &self.kind {
            PendingKind::Concatenated { file, pre_size, .. } => {
                file.set_len(*pre_size)?;
                Ok(())
            }
            PendingKind::Directory { offset } => {
                let filename = format!("{:06}.{}", offset, self.format);
                let full_path = self.writer.dataset_root.join(&self.writer.relpath).join(&filename);
                if full_path.exists() {
                    std::fs::remove_file(&full_path)?;
                }
                Ok(())
            }
        }
    }
}

impl<'a> Drop for Pending<'a> {
    fn drop(&mut self) {
        // Best-effort: a Pending not explicitly committed or rolled back
        // must roll back (spec §4.5), but Drop cannot propagate errors.
        if !self.finished.get() {
            let _ = self.do_rollback();
        }
    }
}

fn next_directory_slot(dir_path: &Path, format: &str) -> crate::Result<u64> {
    let mut max_seen: Option<u64> = None;
    if dir_path.is_dir() {
        for entry in std::fs::read_dir(dir_path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(&format!(".{format}")) {
                    if let Ok(n) = stem.parse::<u64>() {
                        max_seen = Some(max_seen.map_or(n, |m| m.max(n)));
                    }
                }
            }
        }
    }
    Ok(max_seen.map_or(0, |n| n + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_commit_grows_concatenated_segment() {
        let dir = tempdir().unwrap();
        let writer = SegmentWriter::open(dir.path(), "2007/07-08.grib", Shape::Concatenated).unwrap();
        let mut pending = writer.begin_append("grib").unwrap();
        let source = pending.append(b"GRIBhello7777").unwrap();
        pending.commit().unwrap();

        assert!(matches!(source, Source::Blob { offset: 0, size: 13, .. }));
        let on_disk = std::fs::read(dir.path().join("2007/07-08.grib")).unwrap();
        assert_eq!(on_disk, b"GRIBhello7777");
    }

    #[test]
    fn dropping_pending_uncommitted_rolls_back() {
        let dir = tempdir().unwrap();
        let writer = SegmentWriter::open(dir.path(), "2007/07-08.grib", Shape::Concatenated).unwrap();
        {
            let mut pending = writer.begin_append("grib").unwrap();
            pending.append(b"junk").unwrap();
        }
        let on_disk = std::fs::read(dir.path().join("2007/07-08.grib")).unwrap();
        assert!(on_disk.is_empty());
    }

    #[test]
    fn explicit_rollback_truncates_back_to_pre_append_size() {
        let dir = tempdir().unwrap();
        let writer = SegmentWriter::open(dir.path(), "2007/07-08.grib", Shape::Concatenated).unwrap();
        {
            let mut pending = writer.begin_append("grib").unwrap();
            pending.append(b"first").unwrap();
            pending.commit().unwrap();
        }
        let pending = writer.begin_append("grib").unwrap();
        pending.rollback().unwrap();
        let on_disk = std::fs::read(dir.path().join("2007/07-08.grib")).unwrap();
        assert_eq!(on_disk, b"first");
    }

    #[test]
    fn directory_segment_appends_are_numbered_files() {
        let dir = tempdir().unwrap();
        let writer = SegmentWriter::open(dir.path(), "2007/07-08", Shape::Directory).unwrap();
        let mut first = writer.begin_append("grib").unwrap();
        first.append(b"GRIBa7777").unwrap();
        first.commit().unwrap();

        let mut second = writer.begin_append("grib").unwrap();
        let source = second.append(b"GRIBb7777").unwrap();
        second.commit().unwrap();

        assert!(matches!(source, Source::Blob { offset: 1, .. }));
    }

    #[test]
    fn directory_append_rollback_unlinks_the_file() {
        let dir = tempdir().unwrap();
        let writer = SegmentWriter::open(dir.path(), "2007/07-08", Shape::Directory).unwrap();
        let mut pending = writer.begin_append("grib").unwrap();
        pending.append(b"GRIBa7777").unwrap();
        pending.rollback().unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("2007/07-08")).unwrap().collect();
        assert!(entries.is_empty());
    }
}
