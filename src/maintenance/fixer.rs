//! Fixing (spec §4.11, `--fix`): turns TO_INDEX / TO_RESCAN / TO_DEINDEX /
//! TO_DELETE classifications into action. A successful `RealFixer` run
//! clears `.dontpack`, lifting the block it puts on `RealRepacker`'s
//! TO_PACK handling once the data and index agree again. Grounded on the
//! same classify/act split as `repacker.rs`.

use super::{classify, deindex_segment, mtime_secs, Classification, SegmentStatus};
use crate::dataset::Dataset;
use crate::envelope::read_bundle;
use crate::error::Error;
use crate::index::SegmentIndex;
use crate::lock::{DatasetLock, SegmentLock, Tier};
use crate::metadata::Metadata;
use crate::scripting::Scanner;
use crate::segment::Segment;
use crate::types::source::Source;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub struct FixReport {
    pub relpath: PathBuf,
    pub classification: Classification,
    pub acted: bool,
    pub detail: String,
}

pub trait Fixer {
    fn run(&self, dataset: &Dataset) -> crate::Result<Vec<FixReport>>;
}

/// Reports what a fix run would do, without mutating anything.
pub struct MockFixer;

impl Fixer for MockFixer {
    fn run(&self, dataset: &Dataset) -> crate::Result<Vec<FixReport>> {
        Ok(classify(dataset)?
            .into_iter()
            .filter(|s| {
                matches!(
                    s.classification,
                    Classification::ToIndex | Classification::ToRescan | Classification::ToDeindex | Classification::ToDelete
                )
            })
            .map(|s| FixReport { detail: describe(&s), relpath: s.relpath, classification: s.classification, acted: false })
            .collect())
    }
}

fn describe(status: &SegmentStatus) -> String {
    match status.classification {
        Classification::ToIndex => format!("{} would be indexed", status.relpath.display()),
        Classification::ToRescan => format!("{} would be reindexed from scratch", status.relpath.display()),
        Classification::ToDeindex => format!("{} would be removed from the index", status.relpath.display()),
        Classification::ToDelete => format!("{} would be deleted", status.relpath.display()),
        other => format!("{} ({other:?}, not RealFixer's concern)", status.relpath.display()),
    }
}

/// Carries out TO_INDEX/TO_RESCAN/TO_DEINDEX/TO_DELETE under the
/// dataset's check lock, one segment at a time under that segment's own
/// lock. Holds an optional [`Scanner`] for segments whose `.metadata`
/// sibling can't cover a TO_INDEX/TO_RESCAN rebuild on its own.
pub struct RealFixer<'a> {
    scanner: Option<&'a dyn Scanner>,
}

impl<'a> RealFixer<'a> {
    pub fn new() -> Self {
        RealFixer { scanner: None }
    }

    pub fn with_scanner(scanner: &'a dyn Scanner) -> Self {
        RealFixer { scanner: Some(scanner) }
    }
}

impl Default for RealFixer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixer for RealFixer<'_> {
    fn run(&self, dataset: &Dataset) -> crate::Result<Vec<FixReport>> {
        let _lock = DatasetLock::acquire(dataset.root(), Tier::Check)?;

        let mut reports = Vec::new();
        let mut any_acted = false;
        for status in classify(dataset)? {
            let report = match status.classification {
                Classification::ToIndex | Classification::ToRescan => {
                    act(&status, rebuild_index_for_segment(dataset, &status.relpath, self.scanner), "indexed")
                }
                Classification::ToDeindex => act(&status, deindex_segment(dataset, &status.relpath), "removed from the index"),
                Classification::ToDelete => act(&status, delete_segment(dataset, &status.relpath), "deleted"),
                other => FixReport { detail: format!("{other:?}: not RealFixer's concern"), acted: false, relpath: status.relpath, classification: other },
            };
            any_acted |= report.acted;
            reports.push(report);
        }

        if any_acted {
            let _ = std::fs::remove_file(dataset.root().join(crate::file::DONTPACK_FILE));
        }
        Ok(reports)
    }
}

fn act(status: &SegmentStatus, result: crate::Result<()>, verb: &str) -> FixReport {
    match result {
        Ok(()) => FixReport { detail: format!("{}: {verb}", status.relpath.display()), acted: true, relpath: status.relpath.clone(), classification: status.classification },
        Err(e) => FixReport { detail: format!("{}: failed to be {verb}: {e}", status.relpath.display()), acted: false, relpath: status.relpath.clone(), classification: status.classification },
    }
}

/// Rebuilds a segment's index and manifest entry from scratch: first tries
/// replaying the `.metadata` sibling's surviving (non-tombstoned) `MD`
/// envelopes, the same bytes `writer::acquire` wrote at import time; if
/// that sibling is gone or carries nothing, falls back to the injected
/// [`Scanner`] to re-derive attributes straight from the data. With
/// neither available, the segment is left unindexed and that is reported,
/// rather than fabricating metadata from nothing.
fn rebuild_index_for_segment(dataset: &Dataset, relpath: &Path, scanner: Option<&dyn Scanner>) -> crate::Result<()> {
    let full_path = dataset.root().join(relpath);
    let _seg_lock = SegmentLock::acquire(&full_path)?;

    let segment = Segment::detect(dataset.root(), relpath)?;
    let mut entries = replay_metadata_sibling(&segment.metadata_sibling(dataset.root()))?;

    if entries.is_empty() {
        let Some(scanner) = scanner else {
            return Err(Error::IndexInconsistency {
                segment: relpath.display().to_string(),
                reason: "no surviving .metadata sibling and no scanner available to rebuild the index".to_string(),
            });
        };
        let format = crate::query::data_query::format_from_relpath(relpath)?;
        let data = std::fs::read(&full_path)?;
        entries = scanner
            .scan(&data, &format)?
            .into_iter()
            .map(|m| {
                let mut md = m.metadata;
                md.set_source(Source::Blob { format: format.clone(), relpath: relpath.to_string_lossy().to_string(), offset: m.offset, size: m.size });
                (md, m.offset, m.size)
            })
            .collect();
    }

    let index_path = segment.index_sibling(dataset.root());
    std::fs::remove_file(&index_path).ok();
    let index = SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique)?;

    let mut min_reftime = None;
    let mut max_reftime = None;
    for (md, offset, size) in &entries {
        index.insert(md, *offset, *size)?;
        if let Ok(crate::types::reftime::Reftime::Position(t)) = md.reftime() {
            let t = *t;
            min_reftime = Some(min_reftime.map_or(t, |m: crate::types::time::Time| if t.days_since_epoch() < m.days_since_epoch() { t } else { m }));
            max_reftime = Some(max_reftime.map_or(t, |m: crate::types::time::Time| if t.days_since_epoch() > m.days_since_epoch() { t } else { m }));
        }
    }

    let mtime = mtime_secs(&full_path)?;
    let mut manifest = dataset.load_manifest()?;
    let relpath_str = relpath.to_string_lossy().to_string();
    let (min_reftime, max_reftime) = match (min_reftime, max_reftime) {
        (Some(min), Some(max)) => (min, max),
        _ => match manifest.get(&relpath_str) {
            Some(entry) => (entry.min_reftime, entry.max_reftime),
            None => (crate::types::time::Time::NOW, crate::types::time::Time::NOW),
        },
    };
    manifest.upsert(relpath_str, mtime, min_reftime, max_reftime);
    dataset.save_manifest(&manifest)?;
    Ok(())
}

/// Replays a `.metadata` sibling's `MD`-tagged envelopes (skipping `!D`
/// tombstones) into `(Metadata, offset, size)` triples, the same manual
/// bundle-walk `writer.rs`'s own tombstoning uses. An absent sibling is not
/// an error — it just yields no rows, signalling the caller to fall back
/// to a [`Scanner`].
fn replay_metadata_sibling(sibling_path: &Path) -> crate::Result<Vec<(Metadata, u64, u64)>> {
    let Ok(bytes) = std::fs::read(sibling_path) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    let mut remaining: &[u8] = &bytes;
    while !remaining.is_empty() {
        let before_len = remaining.len();
        let bundle = read_bundle(&mut remaining)?;
        let consumed = before_len - remaining.len();
        let start = bytes.len() - before_len;
        let whole_entry = &bytes[start..start + consumed];

        if bundle.tag == crate::version::Tag::METADATA {
            if let Ok(md) = Metadata::decode_from(&mut std::io::Cursor::new(whole_entry)) {
                if let Ok(Source::Blob { offset, size, .. }) = md.source() {
                    out.push((md.clone(), *offset, *size));
                }
            }
        }
    }
    Ok(out)
}

fn delete_segment(dataset: &Dataset, relpath: &Path) -> crate::Result<()> {
    let full_path = dataset.root().join(relpath);
    let _seg_lock = SegmentLock::acquire(&full_path)?;

    if full_path.is_dir() {
        std::fs::remove_dir_all(&full_path)?;
    } else {
        std::fs::remove_file(&full_path)?;
    }
    for ext in [crate::file::INDEX_SIBLING_EXT, crate::file::METADATA_SIBLING_EXT, crate::file::SUMMARY_SIBLING_EXT] {
        let _ = std::fs::remove_file(crate::file::sibling_path(&full_path, ext));
    }

    let mut manifest = dataset.load_manifest()?;
    manifest.remove(&relpath.to_string_lossy());
    dataset.save_manifest(&manifest)?;
    Ok(())
}
