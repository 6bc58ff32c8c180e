//! Repacking (spec §4.11): turns TO_PACK / TO_DEINDEX / TO_ARCHIVE
//! classifications into action. `MockRepacker` only reports what it would
//! do, the `arki-check` default; `RealRepacker` is the `--fix`-free side
//! that actually carries a choice out. Grounded on the teacher's
//! `compaction::{fifo, tiered, levelled}::Strategy` split between choosing
//! (here, `classify`) and a separate agent that executes the choice.

use super::{classify, deindex_segment, mtime_secs, Classification, SegmentStatus};
use crate::dataset::Dataset;
use crate::error::Error;
use crate::index::SegmentIndex;
use crate::lock::{DatasetLock, SegmentLock, Tier};
use crate::query::data_query::reconstruct;
use crate::segment::reader::SegmentReader;
use crate::segment::{Segment, Shape};
use crate::types::source::Source;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub struct RepackReport {
    pub relpath: PathBuf,
    pub classification: Classification,
    pub acted: bool,
    pub detail: String,
}

pub trait Repacker {
    fn run(&self, dataset: &Dataset) -> crate::Result<Vec<RepackReport>>;
}

/// Reports what a repack run would do, without mutating anything.
pub struct MockRepacker;

impl Repacker for MockRepacker {
    fn run(&self, dataset: &Dataset) -> crate::Result<Vec<RepackReport>> {
        Ok(classify(dataset)?
            .into_iter()
            .filter(|s| matches!(s.classification, Classification::ToPack | Classification::ToDeindex | Classification::ToArchive))
            .map(|s| RepackReport {
                detail: describe(&s),
                relpath: s.relpath,
                classification: s.classification,
                acted: false,
            })
            .collect())
    }
}

fn describe(status: &SegmentStatus) -> String {
    match status.classification {
        Classification::ToPack => format!("{} would be repacked", status.relpath.display()),
        Classification::ToDeindex => format!("{} would be removed from the index", status.relpath.display()),
        Classification::ToArchive => format!("{} would be moved to .archive/last/", status.relpath.display()),
        other => format!("{} ({other:?}, not RealRepacker's concern)", status.relpath.display()),
    }
}

/// Carries out TO_PACK/TO_DEINDEX/TO_ARCHIVE under the dataset's check
/// lock, one segment at a time under that segment's own lock, committing
/// after each so one segment's failure doesn't block the others.
pub struct RealRepacker;

impl Repacker for RealRepacker {
    fn run(&self, dataset: &Dataset) -> crate::Result<Vec<RepackReport>> {
        let _lock = DatasetLock::acquire(dataset.root(), Tier::Check)?;
        let dontpack = dataset.root().join(crate::file::DONTPACK_FILE).exists();

        let mut reports = Vec::new();
        for status in classify(dataset)? {
            let report = match status.classification {
                Classification::ToPack if dontpack => RepackReport {
                    detail: format!("{}: skipped, .dontpack is set; run a fixer pass first", status.relpath.display()),
                    acted: false,
                    relpath: status.relpath,
                    classification: Classification::ToPack,
                },
                Classification::ToPack => act(&status, repack_segment(dataset, &status.relpath), "repacked"),
                Classification::ToDeindex => act(&status, deindex_segment(dataset, &status.relpath), "removed from the index"),
                Classification::ToArchive => act(&status, archive_segment(dataset, &status.relpath), "archived"),
                other => RepackReport {
                    detail: format!("{other:?}: not RealRepacker's concern"),
                    acted: false,
                    relpath: status.relpath,
                    classification: other,
                },
            };
            reports.push(report);
        }
        Ok(reports)
    }
}

fn act(status: &SegmentStatus, result: crate::Result<()>, verb: &str) -> RepackReport {
    match result {
        Ok(()) => RepackReport {
            detail: format!("{}: {verb}", status.relpath.display()),
            acted: true,
            relpath: status.relpath.clone(),
            classification: status.classification,
        },
        Err(e) => RepackReport {
            detail: format!("{}: failed to be {verb}: {e}", status.relpath.display()),
            acted: false,
            relpath: status.relpath.clone(),
            classification: status.classification,
        },
    }
}

/// Rewrites a concatenated segment's data file keeping only the records
/// its index still carries, dropping every gap a prior tombstoned insert
/// (spec §8 S2) or deleted record left behind, then rebuilds the index and
/// `.metadata` sibling against the new, contiguous offsets.
fn repack_segment(dataset: &Dataset, relpath: &Path) -> crate::Result<()> {
    let full_path = dataset.root().join(relpath);
    let _seg_lock = SegmentLock::acquire(&full_path)?;

    let segment = Segment::detect(dataset.root(), relpath)?;
    if segment.shape() != Shape::Concatenated {
        return Err(Error::Config(format!("repacking a {:?}-shaped segment is not supported", segment.shape())));
    }

    let format = crate::query::data_query::format_from_relpath(relpath)?;
    let relpath_str = relpath.to_string_lossy().to_string();

    let index_path = segment.index_sibling(dataset.root());
    let old_index = SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique)?;
    let mut rows = old_index.scan_all()?;
    rows.sort_by_key(|r| r.offset);

    let reader = SegmentReader::new(dataset.root(), segment.clone());
    let mut entries = Vec::new();
    for row in &rows {
        let md = reconstruct(row, &relpath_str, &format)?;
        let data = reader.read(md.source()?)?;
        entries.push((md, data));
    }

    let mut new_bytes = Vec::new();
    let mut offsets = Vec::new();
    for (_, data) in &entries {
        offsets.push((new_bytes.len() as u64, data.len() as u64));
        new_bytes.extend_from_slice(data);
    }
    crate::file::rewrite_atomic(&full_path, &new_bytes)?;

    std::fs::remove_file(&index_path).ok();
    let new_index = SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique)?;

    let mut metadata_bytes = Vec::new();
    for ((mut md, _), (offset, size)) in entries.into_iter().zip(offsets) {
        new_index.insert(&md, offset, size)?;
        md.set_source(Source::Blob {
            format: format.clone(),
            relpath: relpath_str.clone(),
            offset,
            size,
        });
        metadata_bytes.extend_from_slice(&md.encode()?);
    }
    crate::file::rewrite_atomic(&segment.metadata_sibling(dataset.root()), &metadata_bytes)?;
    let _ = std::fs::remove_file(segment.summary_sibling(dataset.root()));

    if let Some(entry) = dataset.load_manifest()?.get(&relpath_str).cloned() {
        let mtime = mtime_secs(&full_path)?;
        let mut manifest = dataset.load_manifest()?;
        manifest.upsert(relpath_str, mtime, entry.min_reftime, entry.max_reftime);
        dataset.save_manifest(&manifest)?;
    }

    Ok(())
}

/// Moves a segment and its siblings under `.archive/last/`, keeping the
/// same relative path, and drops it from the active manifest.
fn archive_segment(dataset: &Dataset, relpath: &Path) -> crate::Result<()> {
    let full_path = dataset.root().join(relpath);
    let _seg_lock = SegmentLock::acquire(&full_path)?;

    let archive_root = dataset.root().join(crate::file::ARCHIVE_DIR).join(crate::file::ARCHIVE_LAST_DIR);
    let dest = archive_root.join(relpath);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&full_path, &dest)?;

    for ext in [crate::file::INDEX_SIBLING_EXT, crate::file::METADATA_SIBLING_EXT, crate::file::SUMMARY_SIBLING_EXT] {
        let src = crate::file::sibling_path(&full_path, ext);
        if src.exists() {
            std::fs::rename(&src, crate::file::sibling_path(&dest, ext))?;
        }
    }

    let mut manifest = dataset.load_manifest()?;
    manifest.remove(&relpath.to_string_lossy());
    dataset.save_manifest(&manifest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::types::origin::Origin;
    use crate::types::reftime::Reftime;
    use crate::types::time::Time;
    use crate::types::Attr;

    fn open_dataset(root: &Path, extra: &str) -> Dataset {
        std::fs::write(
            root.join("config"),
            format!(
                "type = iseg\npath = {}\nstep = daily\nindex = origin\nunique = origin\nreplace = true\n{extra}",
                root.display()
            ),
        )
        .unwrap();
        Dataset::open(root).unwrap()
    }

    fn md_for(centre: u16) -> Metadata {
        let mut md = Metadata::new();
        md.set(Attr::Origin(Origin::Grib1 { centre, subcentre: 0, process: 0 }));
        md.set(Attr::Reftime(Reftime::Position(Time::new(2007, 7, 8, 0, 0, 0).unwrap())));
        md
    }

    #[test]
    fn repacking_drops_a_superseded_records_bytes_and_clears_dontpack() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset(dir.path(), "");

        let mut first = md_for(200);
        crate::writer::acquire(&dataset, &mut first, b"GRIBhello7777").unwrap();
        let mut second = md_for(200);
        crate::writer::acquire(&dataset, &mut second, b"GRIBanother77").unwrap();
        assert!(dataset.root().join(crate::file::DONTPACK_FILE).exists());

        let relpath = dataset.relpath_for(&md_for(200)).unwrap();
        let full_path = dataset.root().join(&relpath);
        assert_eq!(std::fs::read(&full_path).unwrap().len(), b"GRIBhello7777".len() + b"GRIBanother77".len());

        repack_segment(&dataset, &relpath).unwrap();

        assert_eq!(std::fs::read(&full_path).unwrap(), b"GRIBanother77");
        let index = SegmentIndex::open(
            &Segment::new(relpath, Shape::Concatenated).index_sibling(dataset.root()),
            &dataset.config().index,
            &dataset.config().unique,
        )
        .unwrap();
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn mock_repacker_reports_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset(dir.path(), "");
        let mut first = md_for(200);
        crate::writer::acquire(&dataset, &mut first, b"GRIBhello7777").unwrap();
        let mut second = md_for(200);
        crate::writer::acquire(&dataset, &mut second, b"GRIBanother77").unwrap();

        let reports = MockRepacker.run(&dataset).unwrap();
        assert!(reports.iter().any(|r| r.classification == Classification::ToPack && !r.acted));

        let relpath = dataset.relpath_for(&md_for(200)).unwrap();
        let full_path = dataset.root().join(&relpath);
        assert_eq!(std::fs::read(&full_path).unwrap().len(), b"GRIBhello7777".len() + b"GRIBanother77".len());
    }
}
