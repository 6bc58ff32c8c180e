//! The maintenance engine (spec §4.11): walks a dataset's segments and the
//! manifest side by side, classifies every disagreement, and hands the
//! classification off to a [`repacker::Repacker`] or [`fixer::Fixer`] to
//! act on. Grounded on the teacher's `compaction::{Choice, CompactionStrategy}`
//! split — a pure classify/choose step kept separate from the agent that
//! carries a choice out — generalised here from "which segments should
//! merge" to "which segments disagree with their index and how".

pub mod fixer;
pub mod repacker;

use crate::dataset::Dataset;
use crate::index::manifest::ManifestEntry;
use crate::index::SegmentIndex;
use crate::segment::Segment;
use crate::types::time::Time;
use std::path::{Path, PathBuf};

/// One segment's state relative to its index and the manifest (spec
/// §4.11's classification table).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Classification {
    /// Data, metadata, summary and index all agree.
    Ok,
    /// The data file has gaps (deleted records); its remaining contents
    /// are still correct.
    ToPack,
    /// The data file exists but has no index at all.
    ToIndex,
    /// The data file and its index disagree (mtime or per-offset
    /// contents).
    ToRescan,
    /// The index references a file that no longer exists.
    ToDeindex,
    /// Every reftime in the segment is older than `archive age`.
    ToArchive,
    /// Every reftime in the segment is older than `delete age`.
    ToDelete,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SegmentStatus {
    pub relpath: PathBuf,
    pub classification: Classification,
}

/// Walks `dataset`'s segments and manifest, merging the two relpath-sorted
/// sequences the way spec §4.11 describes, then folds in the archive/delete
/// age overrides on whatever came out `Ok`/`ToPack`.
pub fn classify(dataset: &Dataset) -> crate::Result<Vec<SegmentStatus>> {
    let manifest = dataset.load_manifest()?;
    let mut on_disk = discover_segments(dataset.root())?;
    on_disk.sort();

    let mut manifest_relpaths: Vec<String> = manifest.iter().map(|(relpath, _)| relpath.to_string()).collect();
    manifest_relpaths.sort();

    let mut statuses = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < on_disk.len() || j < manifest_relpaths.len() {
        let disk_relpath = on_disk.get(i).map(|p| p.to_string_lossy().to_string());
        let manifest_relpath = manifest_relpaths.get(j).cloned();

        match (disk_relpath, manifest_relpath) {
            (Some(_), None) => {
                statuses.push(SegmentStatus {
                    relpath: on_disk[i].clone(),
                    classification: Classification::ToIndex,
                });
                i += 1;
            }
            (None, Some(m)) => {
                statuses.push(SegmentStatus {
                    relpath: PathBuf::from(m),
                    classification: Classification::ToDeindex,
                });
                j += 1;
            }
            (Some(d), Some(m)) => match d.cmp(&m) {
                std::cmp::Ordering::Less => {
                    statuses.push(SegmentStatus {
                        relpath: on_disk[i].clone(),
                        classification: Classification::ToIndex,
                    });
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    statuses.push(SegmentStatus {
                        relpath: PathBuf::from(m),
                        classification: Classification::ToDeindex,
                    });
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    let entry = manifest.get(&m).expect("just matched by relpath").clone();
                    let classification = inspect(dataset, &on_disk[i], &entry)?;
                    statuses.push(SegmentStatus {
                        relpath: on_disk[i].clone(),
                        classification,
                    });
                    i += 1;
                    j += 1;
                }
            },
            (None, None) => unreachable!(),
        }
    }

    apply_age_overrides(dataset, &manifest, &mut statuses);
    Ok(statuses)
}

fn apply_age_overrides(dataset: &Dataset, manifest: &crate::index::Manifest, statuses: &mut [SegmentStatus]) {
    let now = Time::now_wallclock().days_since_epoch();
    for status in statuses.iter_mut() {
        if !matches!(status.classification, Classification::Ok | Classification::ToPack) {
            continue;
        }
        let Some(entry) = manifest.get(&status.relpath.to_string_lossy()) else {
            continue;
        };
        let age_days = now - entry.max_reftime.days_since_epoch();
        if let Some(delete_age) = dataset.config().delete_age {
            if age_days >= i64::from(delete_age) {
                status.classification = Classification::ToDelete;
                continue;
            }
        }
        if let Some(archive_age) = dataset.config().archive_age {
            if age_days >= i64::from(archive_age) {
                status.classification = Classification::ToArchive;
            }
        }
    }
}

/// Removes a segment's index artifacts: its manifest entry and `.index`/
/// `.metadata` siblings. Shared by `RealRepacker`'s and `RealFixer`'s
/// TO_DEINDEX handling (spec §4.11 lists the same action under both
/// agents' tables).
pub(crate) fn deindex_segment(dataset: &Dataset, relpath: &Path) -> crate::Result<()> {
    let mut manifest = dataset.load_manifest()?;
    manifest.remove(&relpath.to_string_lossy());
    dataset.save_manifest(&manifest)?;

    let full_path = dataset.root().join(relpath);
    let _ = std::fs::remove_file(crate::file::sibling_path(&full_path, crate::file::INDEX_SIBLING_EXT));
    let _ = std::fs::remove_file(crate::file::sibling_path(&full_path, crate::file::METADATA_SIBLING_EXT));
    Ok(())
}

/// Compares one segment already present both on disk and in the manifest:
/// an mtime mismatch means the data moved under the index's feet
/// (`ToRescan`); otherwise a hole between the index's cumulative offset
/// and the next row's offset means deleted records still occupy space
/// (`ToPack`); anything else is `Ok`.
fn inspect(dataset: &Dataset, relpath: &Path, entry: &ManifestEntry) -> crate::Result<Classification> {
    let full_path = dataset.root().join(relpath);
    let fs_mtime = mtime_secs(&full_path)?;
    if fs_mtime != entry.mtime {
        return Ok(Classification::ToRescan);
    }

    let segment = Segment::detect(dataset.root(), relpath)?;
    let index_path = segment.index_sibling(dataset.root());
    if !index_path.exists() {
        return Ok(Classification::ToIndex);
    }

    let index = SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique)?;
    let mut rows = index.scan_all()?;
    rows.sort_by_key(|r| r.offset);

    let mut cursor = 0u64;
    let mut has_gap = false;
    for row in &rows {
        if row.offset > cursor {
            has_gap = true;
        }
        cursor = cursor.max(row.offset + row.size);
    }

    if segment.shape() == crate::segment::Shape::Concatenated {
        let data_len = std::fs::metadata(&full_path)?.len();
        if cursor > data_len {
            // The index claims bytes the data file doesn't have; more
            // than a gap, the two have drifted apart entirely.
            return Ok(Classification::ToRescan);
        }
        if cursor < data_len {
            has_gap = true;
        }
    }

    if has_gap {
        Ok(Classification::ToPack)
    } else {
        Ok(Classification::Ok)
    }
}

fn mtime_secs(path: &Path) -> crate::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0))
}

/// Recursively finds every segment relpath under `root`: a regular file is
/// a concatenated (or, with a `.gz` sibling, compressed) segment; a
/// directory whose immediate children are all `NNNNNN.format` message
/// files is a directory-shaped segment leaf; any other directory is an
/// intermediate grouping level (`step`'s year/month folders) to recurse
/// into. Reserved dataset-root files and sibling-extension files are
/// skipped.
fn discover_segments(root: &Path) -> crate::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, Path::new(""), &mut out)?;
    Ok(out)
}

fn walk(dir: &Path, relpath: &Path, out: &mut Vec<PathBuf>) -> crate::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if relpath == Path::new("") && is_reserved_root_entry(&name_str) {
            continue;
        }
        if has_sibling_extension(&name_str) {
            continue;
        }

        let path = entry.path();
        let child_relpath = relpath.join(&name);

        if path.is_dir() {
            if is_segment_directory(&path)? {
                out.push(child_relpath);
            } else {
                walk(&path, &child_relpath, out)?;
            }
        } else {
            out.push(child_relpath);
        }
    }
    Ok(())
}

fn is_reserved_root_entry(name: &str) -> bool {
    matches!(
        name,
        crate::file::CONFIG_FILE
            | crate::file::LOCK_FILE
            | crate::file::MANIFEST_FILE
            | crate::file::MANIFEST_SQLITE_FILE
            | crate::file::DATASET_SUMMARY_FILE
            | crate::file::MONTHLY_SUMMARY_DIR
            | crate::file::ARCHIVE_DIR
            | crate::file::DONTPACK_FILE
            | crate::file::SINGLEFILE_COUNTER_FILE
    )
}

fn has_sibling_extension(name: &str) -> bool {
    name.ends_with(&format!(".{}", crate::file::METADATA_SIBLING_EXT))
        || name.ends_with(&format!(".{}", crate::file::SUMMARY_SIBLING_EXT))
        || name.ends_with(&format!(".{}", crate::file::INDEX_SIBLING_EXT))
        || name.ends_with(&format!(".{}", crate::file::GZ_EXT))
        || name.ends_with(&format!(".{}", crate::file::GZ_IDX_EXT))
}

fn is_segment_directory(path: &Path) -> crate::Result<bool> {
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if !entry.path().is_file() {
            return Ok(false);
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let stem = name.split('.').next().unwrap_or("");
        if stem.len() != 6 || !stem.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }
    }
    Ok(true)
}
