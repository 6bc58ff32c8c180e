//! `acquire`: the writer's entry point (spec §4.10). Stores one incoming
//! record into its dataset, advancing the segment and its index together
//! so the two never drift apart, and reports one of three outcomes a
//! dispatcher can act on without inspecting an error value.

use crate::dataset::config::DatasetKind;
use crate::dataset::Dataset;
use crate::envelope::read_bundle;
use crate::error::Error;
use crate::index::SegmentIndex;
use crate::lock::{DatasetLock, Tier};
use crate::metadata::Metadata;
use crate::segment::writer::{Pending, SegmentWriter};
use crate::segment::{Segment, Shape};
use crate::types::assigned_dataset::AssignedDataset;
use crate::types::source::Source;
use crate::types::time::Time;
use crate::types::{Attr, Code};
use crate::version::Tag;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// What happened to one record passed to [`acquire`] (spec §4.10).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Ok,
    /// Rejected by the dataset's `unique` constraint, `replace` unset —
    /// the original record is untouched besides a new note.
    ErrorDuplicate,
    /// Any other failure acquiring the record.
    Error,
}

/// Stores `md`/`data` into `dataset`, mutating `md` in place.
///
/// On [`Outcome::Ok`], `md` gains an `assigned-dataset` attribute naming
/// `dataset` and a stable id derived from its `unique` tuple. On any other
/// outcome, `md`'s `source` and `assigned-dataset` are restored to exactly
/// what they were on entry, plus one note explaining why (spec §4.10 steps
/// 3-4). Lock acquisition failures and other conditions the caller cannot
/// reasonably route around still propagate as `Err`.
pub fn acquire(dataset: &Dataset, md: &mut Metadata, data: &[u8]) -> crate::Result<Outcome> {
    match dataset.config().kind {
        DatasetKind::Discard => Ok(Outcome::Ok),
        DatasetKind::Outbound => acquire_outbound(dataset, md, data),
        // `simple`, `iseg`, `ondisk2`, `remote` and `file` datasets are all
        // served by the one concatenated-segment-plus-`SegmentIndex`
        // implementation here; their on-disk layout differences (spec §3)
        // don't change the append contract this function implements.
        _ => acquire_indexed(dataset, md, data),
    }
}

fn fail(md: &mut Metadata, original_source: Option<Attr>, original_assigned: Option<Attr>, reason: &str, outcome: Outcome) -> Outcome {
    match original_source {
        Some(attr) => md.set(attr),
        None => {
            md.unset(Code::Source);
        }
    }
    match original_assigned {
        Some(attr) => md.set(attr),
        None => {
            md.unset(Code::AssignedDataset);
        }
    }
    md.add_note(Time::now_wallclock(), reason.to_string());
    log::warn!("acquire failed: {reason}");
    outcome
}

fn acquire_outbound(dataset: &Dataset, md: &mut Metadata, data: &[u8]) -> crate::Result<Outcome> {
    let original_source = md.get(Code::Source).cloned();

    let relpath = match dataset.relpath_for(md) {
        Ok(r) => r,
        Err(e) => return Ok(fail(md, original_source, None, &e.to_string(), Outcome::Error)),
    };
    let format = match md.source() {
        Ok(s) => s.format().to_string(),
        Err(e) => return Ok(fail(md, original_source, None, &e.to_string(), Outcome::Error)),
    };

    let _lock = DatasetLock::acquire(dataset.root(), Tier::Append)?;

    let writer = match SegmentWriter::open(dataset.root(), &relpath, Shape::Concatenated) {
        Ok(w) => w,
        Err(e) => return Ok(fail(md, original_source, None, &e.to_string(), Outcome::Error)),
    };
    let mut pending = match writer.begin_append(&format) {
        Ok(p) => p,
        Err(e) => return Ok(fail(md, original_source, None, &e.to_string(), Outcome::Error)),
    };

    // Outbound datasets are append-only handoff points (spec §4.10): no
    // index, no assigned-dataset, nothing left to roll back to once the
    // bytes have been written besides the append itself.
    match pending.append(data) {
        Ok(source) => {
            pending.commit()?;
            md.set_source(source);
            Ok(Outcome::Ok)
        }
        Err(e) => {
            let _ = pending.rollback();
            Ok(fail(md, original_source, None, &e.to_string(), Outcome::Error))
        }
    }
}

fn stable_id(dataset: &Dataset, md: &Metadata) -> String {
    let unique_attrs: Vec<Attr> = dataset.config().unique.iter().filter_map(|code| md.get(*code).cloned()).collect();
    format!("{unique_attrs:?}")
}

fn append_metadata_sibling(dataset: &Dataset, segment: &Segment, md: &Metadata) -> crate::Result<()> {
    let path = segment.metadata_sibling(dataset.root());
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(&md.encode()?)?;
    file.flush()?;
    Ok(())
}

fn touch_dontpack(dataset: &Dataset) -> crate::Result<()> {
    let path = dataset.root().join(crate::file::DONTPACK_FILE);
    OpenOptions::new().create(true).write(true).open(path)?;
    Ok(())
}

/// Finds the `MD` envelope in `sibling_path` whose `source` matches
/// `(old_offset, old_size)` and rewrites its 2-byte tag in place to `!D`
/// (spec §8 S2). The tag is fixed-width, so this never needs to shift any
/// other byte in the file — only `for_each_bundle`'s convenience of not
/// tracking positions is given up here, not its framing.
fn tombstone_old_entry(sibling_path: &Path, old_offset: u64, old_size: u64) -> crate::Result<()> {
    let bytes = std::fs::read(sibling_path)?;
    let mut remaining: &[u8] = &bytes;
    let mut file_pos: usize = 0;

    while !remaining.is_empty() {
        let before_len = remaining.len();
        let bundle = read_bundle(&mut remaining)?;
        let consumed = before_len - remaining.len();

        if bundle.tag == Tag::METADATA {
            let whole_entry = &bytes[file_pos..file_pos + consumed];
            if let Ok(candidate) = Metadata::decode_from(&mut std::io::Cursor::new(whole_entry)) {
                if let Ok(Source::Blob { offset, size, .. }) = candidate.source() {
                    if *offset == old_offset && *size == old_size {
                        let mut file = OpenOptions::new().write(true).open(sibling_path)?;
                        file.seek(SeekFrom::Start(file_pos as u64))?;
                        file.write_all(&Tag::DELETED_METADATA.0)?;
                        return Ok(());
                    }
                }
            }
        }
        file_pos += consumed;
    }

    Err(Error::IndexInconsistency {
        segment: sibling_path.display().to_string(),
        reason: "replace: no metadata sibling entry found matching the record being superseded".to_string(),
    })
}

#[allow(clippy::too_many_arguments)]
fn replace_duplicate(
    dataset: &Dataset,
    segment: &Segment,
    index: &SegmentIndex,
    md: &mut Metadata,
    pending: Pending<'_>,
    new_offset: u64,
    new_size: u64,
) -> crate::Result<Outcome> {
    let old = index.find_by_unique(md)?.ok_or_else(|| Error::IndexInconsistency {
        segment: segment.relpath().display().to_string(),
        reason: "duplicate insert reported but no colliding row found by unique lookup".to_string(),
    })?;

    let sibling_path = segment.metadata_sibling(dataset.root());
    tombstone_old_entry(&sibling_path, old.offset, old.size)?;
    index.delete(old.id)?;
    index.insert(md, new_offset, new_size)?;

    md.set(Attr::AssignedDataset(AssignedDataset {
        name: dataset.config().name.clone(),
        id: stable_id(dataset, md),
    }));
    append_metadata_sibling(dataset, segment, md)?;

    // The index and sibling file were just mutated outside the normal
    // maintenance flow, leaving the segment's data file holding two
    // copies of the same record's bytes (the old one orphaned, the new
    // one live). Repacking has to wait for a Fixer pass to confirm the
    // index/sibling/segment agree again (spec §4.11).
    touch_dontpack(dataset)?;

    // Never rolled back: both appends to the segment's data file persist
    // unconditionally on a `replace` overwrite (spec §8 S2).
    pending.commit()?;
    Ok(Outcome::Ok)
}

fn acquire_indexed(dataset: &Dataset, md: &mut Metadata, data: &[u8]) -> crate::Result<Outcome> {
    let original_source = md.get(Code::Source).cloned();
    let original_assigned = md.get(Code::AssignedDataset).cloned();

    let relpath = match dataset.relpath_for(md) {
        Ok(r) => r,
        Err(e) => return Ok(fail(md, original_source, original_assigned, &e.to_string(), Outcome::Error)),
    };
    let format = match md.source() {
        Ok(s) => s.format().to_string(),
        Err(e) => return Ok(fail(md, original_source, original_assigned, &e.to_string(), Outcome::Error)),
    };

    let _lock = DatasetLock::acquire(dataset.root(), Tier::Append)?;

    let writer = match SegmentWriter::open(dataset.root(), &relpath, Shape::Concatenated) {
        Ok(w) => w,
        Err(e) => return Ok(fail(md, original_source, original_assigned, &e.to_string(), Outcome::Error)),
    };
    let mut pending = match writer.begin_append(&format) {
        Ok(p) => p,
        Err(e) => return Ok(fail(md, original_source, original_assigned, &e.to_string(), Outcome::Error)),
    };

    let (offset, size) = match pending.append(data) {
        Ok(source @ Source::Blob { offset, size, .. }) => {
            md.set_source(source);
            (offset, size)
        }
        Ok(_) => {
            let _ = pending.rollback();
            return Ok(fail(md, original_source, original_assigned, "append produced a non-blob source", Outcome::Error));
        }
        Err(e) => {
            return Ok(fail(md, original_source, original_assigned, &e.to_string(), Outcome::Error));
        }
    };

    let segment = Segment::new(relpath.clone(), Shape::Concatenated);
    let index_path = segment.index_sibling(dataset.root());
    let index = match SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique) {
        Ok(i) => i,
        Err(e) => {
            let _ = pending.rollback();
            return Ok(fail(md, original_source, original_assigned, &e.to_string(), Outcome::Error));
        }
    };

    match index.insert(md, offset, size) {
        Ok(_) => {
            md.set(Attr::AssignedDataset(AssignedDataset {
                name: dataset.config().name.clone(),
                id: stable_id(dataset, md),
            }));
            if let Err(e) = append_metadata_sibling(dataset, &segment, md) {
                let _ = pending.rollback();
                return Ok(fail(md, original_source, original_assigned, &e.to_string(), Outcome::Error));
            }
            pending.commit()?;
            Ok(Outcome::Ok)
        }
        Err(Error::DuplicateInsert { .. }) if dataset.config().replace => {
            replace_duplicate(dataset, &segment, &index, md, pending, offset, size)
        }
        Err(Error::DuplicateInsert { .. }) => {
            let _ = pending.rollback();
            Ok(fail(
                md,
                original_source,
                original_assigned,
                "duplicate record: unique constraint already satisfied by an existing record",
                Outcome::ErrorDuplicate,
            ))
        }
        Err(e) => {
            let _ = pending.rollback();
            Ok(fail(md, original_source, original_assigned, &e.to_string(), Outcome::Error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::origin::Origin;
    use crate::types::reftime::Reftime;

    fn open_iseg(root: &Path, replace: bool) -> Dataset {
        std::fs::write(
            root.join("config"),
            format!(
                "type = iseg\npath = {}\nstep = daily\nindex = origin\nunique = origin\nreplace = {}\n",
                root.display(),
                if replace { "true" } else { "false" }
            ),
        )
        .unwrap();
        Dataset::open(root).unwrap()
    }

    fn sample_md(centre: u16) -> Metadata {
        let mut md = Metadata::new();
        md.set(Attr::Origin(Origin::Grib1 { centre, subcentre: 0, process: 0 }));
        md.set(Attr::Reftime(Reftime::Position(Time::new(2007, 7, 8, 0, 0, 0).unwrap())));
        md
    }

    #[test]
    fn a_fresh_record_is_acquired_and_stamped_with_its_assigned_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_iseg(dir.path(), false);
        let mut md = sample_md(200);

        let outcome = acquire(&dataset, &mut md, b"GRIBhello7777").unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert!(matches!(md.get(Code::AssignedDataset), Some(Attr::AssignedDataset(_))));
        assert!(matches!(md.source().unwrap(), Source::Blob { offset: 0, size: 13, .. }));
    }

    #[test]
    fn a_duplicate_without_replace_is_rejected_and_the_record_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_iseg(dir.path(), false);

        let mut first = sample_md(200);
        assert_eq!(acquire(&dataset, &mut first, b"GRIBhello7777").unwrap(), Outcome::Ok);

        let mut second = sample_md(200);
        let outcome = acquire(&dataset, &mut second, b"GRIBanother77").unwrap();
        assert_eq!(outcome, Outcome::ErrorDuplicate);
        assert!(second.get(Code::Source).is_none());
        assert!(second.get(Code::AssignedDataset).is_none());
        assert_eq!(second.notes().len(), 1);
    }

    #[test]
    fn a_duplicate_with_replace_overwrites_the_index_and_flags_dontpack() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_iseg(dir.path(), true);

        let mut first = sample_md(200);
        assert_eq!(acquire(&dataset, &mut first, b"GRIBhello7777").unwrap(), Outcome::Ok);

        let mut second = sample_md(200);
        let outcome = acquire(&dataset, &mut second, b"GRIBanother77").unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert!(matches!(second.get(Code::AssignedDataset), Some(Attr::AssignedDataset(_))));

        let relpath = dataset.relpath_for(&sample_md(200)).unwrap();
        let segment = Segment::new(relpath, Shape::Concatenated);
        let index_path = segment.index_sibling(dataset.root());
        let index = SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique).unwrap();
        assert_eq!(index.len().unwrap(), 1);

        let on_disk = std::fs::read(dataset.root().join(relpath_str(&segment))).unwrap();
        assert_eq!(on_disk.len(), b"GRIBhello7777".len() + b"GRIBanother77".len());

        assert!(dataset.root().join(crate::file::DONTPACK_FILE).exists());
    }

    fn relpath_str(segment: &Segment) -> std::path::PathBuf {
        segment.relpath().to_path_buf()
    }
}
