//! Per-dataset execution of a [`DataQuery`] (spec §4.8 steps 1-5): split
//! the matcher into its SQL-pushdown and residual halves, prune segments
//! by the manifest before opening a single one, reconstruct metadata
//! lazily from each surviving index row, then sort and/or inline data as
//! the query asks.

use crate::cache::ReaderCache;
use crate::dataset::Dataset;
use crate::error::Error;
use crate::index::segment_index::{self, IndexedRecord};
use crate::index::SegmentIndex;
use crate::lock::{DatasetLock, Tier};
use crate::matcher::Matcher;
use crate::metadata::Metadata;
use crate::segment::SegmentReader;
use crate::types::reftime::Reftime;
use crate::types::source::Source;
use crate::types::time::Time;
use crate::types::{Attr, Code};
use std::cmp::Ordering;
use std::path::Path;

/// One ordering key: an attribute code plus direction.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub code: Code,
    pub ascending: bool,
}

/// An ordering clause over attribute codes (spec §4.8's `sorter`), applied
/// earliest key first. Compares each key's canonical encoded bytes rather
/// than a type-specific `Ord` — the same byte-wise comparison SQLite
/// already applies to `mduniq`/`mdother`'s BLOB columns, so a record's
/// rank here agrees with how the index itself orders tuples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sorter(pub Vec<SortKey>);

impl Sorter {
    #[must_use]
    pub fn by(code: Code, ascending: bool) -> Self {
        Sorter(vec![SortKey { code, ascending }])
    }

    fn key_bytes(md: &Metadata, code: Code) -> Vec<u8> {
        if code == Code::Reftime {
            return md.reftime().map(|r| r.representative().to_sql_text().into_bytes()).unwrap_or_default();
        }
        let Some(attr) = md.get(code) else { return Vec::new() };
        let mut buf = Vec::new();
        if attr.encode_value(&mut buf).is_err() {
            return Vec::new();
        }
        buf
    }

    fn cmp_metadata(&self, a: &Metadata, b: &Metadata) -> Ordering {
        for key in &self.0 {
            let (ka, kb) = (Self::key_bytes(a, key.code), Self::key_bytes(b, key.code));
            let ord = if key.ascending { ka.cmp(&kb) } else { kb.cmp(&ka) };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub(crate) fn cmp_hits(&self, a: &QueryHit, b: &QueryHit) -> Ordering {
        self.cmp_metadata(&a.metadata, &b.metadata)
    }

    pub fn sort(&self, hits: &mut [QueryHit]) {
        hits.sort_by(|a, b| self.cmp_hits(a, b));
    }
}

/// A compiled query (spec §4.8): the predicate, whether to inline data,
/// and an optional ordering clause.
#[derive(Clone, Debug, Default)]
pub struct DataQuery {
    pub matcher: Matcher,
    pub with_data: bool,
    pub sorter: Option<Sorter>,
}

/// One query result: the reconstructed record, plus its raw bytes if
/// `with_data` pulled them in. When `data` is `Some`, `metadata`'s source
/// has already been rewritten to `Inline` — the blob pointer is no longer
/// meaningful once the bytes travel with the record instead of it.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryHit {
    pub metadata: Metadata,
    pub data: Option<Vec<u8>>,
}

pub(crate) fn format_from_relpath(relpath: &Path) -> crate::Result<String> {
    relpath
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::IndexInconsistency {
            segment: relpath.display().to_string(),
            reason: "segment relpath carries no format extension".to_string(),
        })
}

/// Builds the SQL `WHERE` clause for `matcher`'s clauses against `index`'s
/// own column names (spec §4.8 step 1's "rewritten to SQL joining `md`
/// with `mduniq`/`mdother` by attribute id"). Unconstrained codes simply
/// contribute no fragment.
fn where_clause(matcher: &Matcher, index: &SegmentIndex) -> Option<String> {
    let lookup = |attr: &Attr| index.lookup_attr_id(attr).ok().flatten();
    let mut parts = Vec::new();
    for code in matcher.codes() {
        let colname = if code == Code::Reftime {
            "md.reftime".to_string()
        } else {
            format!("md.{}", segment_index::column_name(code))
        };
        if let Some(fragment) = matcher.sql_fragment(code, &colname, &lookup) {
            parts.push(fragment);
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

/// Rebuilds a full `Metadata` from one index row (spec §4.8 step 3): the
/// indexed/uniq/other attribute sets merged back together, `reftime`
/// parsed from its stored text form, `source` reconstructed as a `Blob`
/// pointing at this segment, and the stored notes replayed in order.
pub(crate) fn reconstruct(record: &IndexedRecord, relpath: &str, format: &str) -> crate::Result<Metadata> {
    let mut md = Metadata::new();
    for attr in record.indexed.iter().chain(record.uniq.iter()).chain(record.other.iter()) {
        md.set(attr.clone());
    }
    md.set(Attr::Reftime(Reftime::Position(Time::from_sql_text(&record.reftime_text)?)));
    md.set_source(Source::Blob {
        format: format.to_string(),
        relpath: relpath.to_string(),
        offset: record.offset,
        size: record.size,
    });
    for note in &record.notes.0 {
        md.add_note(note.time, note.text.clone());
    }
    Ok(md)
}

/// Executes `query` against one dataset (spec §4.8 steps 1-5), taking a
/// shared read lock on it for the duration.
pub fn query_dataset(dataset: &Dataset, cache: &ReaderCache, query: &DataQuery) -> crate::Result<Vec<QueryHit>> {
    let _lock = DatasetLock::acquire(dataset.root(), Tier::Read)?;
    let manifest = dataset.load_manifest()?;
    let (indexed, residual) = query.matcher.split(&dataset.config().index);

    let mut out = Vec::new();
    for (relpath, entry) in manifest.iter() {
        if !query.matcher.path_matches(Some((entry.min_reftime, entry.max_reftime))) {
            continue;
        }

        let segment = cache.segment(relpath)?;
        let index_path = segment.index_sibling(dataset.root());
        if !index_path.is_file() {
            log::warn!("segment {relpath} has no index file, skipping it for this query; it needs maintenance");
            continue;
        }
        let index = SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique)?;
        let format = format_from_relpath(Path::new(relpath))?;

        // Step 2: an empty indexed part means no predicate survived to push
        // into SQL at all, so every row is a candidate; otherwise the
        // manifest pruning above already stands in for "guided by the
        // manifest" and the indexed clauses narrow the segment's own rows.
        let records = if indexed.is_empty() {
            index.query(None)?
        } else {
            index.query(where_clause(&indexed, &index).as_deref())?
        };

        for record in records {
            let metadata = reconstruct(&record, relpath, &format)?;
            if !residual.matches_metadata(&metadata)? {
                continue;
            }
            out.push(QueryHit { metadata, data: None });
        }
    }

    if let Some(sorter) = &query.sorter {
        sorter.sort(&mut out);
    }

    if query.with_data {
        for hit in &mut out {
            let blob = hit.metadata.source()?.clone();
            let Source::Blob { relpath, .. } = &blob else {
                continue;
            };
            let segment = cache.segment(relpath.clone())?;
            let reader = SegmentReader::new(dataset.root(), segment);
            let bytes = reader.read(&blob)?;
            hit.metadata.set_source(Source::Inline {
                format: blob.format().to_string(),
                size: bytes.len() as u64,
            });
            hit.data = Some(bytes);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::index::SegmentIndex;
    use crate::segment::writer::SegmentWriter;
    use crate::segment::Shape;
    use crate::types::origin::Origin;
    use crate::types::reftime::Reftime;

    fn open_dataset(root: &Path) -> Dataset {
        std::fs::write(
            root.join("config"),
            format!("type = iseg\npath = {}\nstep = daily\nindex = origin\nunique = origin\n", root.display()),
        )
        .unwrap();
        Dataset::open(root).unwrap()
    }

    fn ingest(dataset: &Dataset, centre: u16, day: u8) -> std::path::PathBuf {
        let reftime = Time::new(2007, 7, day, 0, 0, 0).unwrap();
        let relpath = dataset
            .config()
            .step
            .relpath(&reftime, "grib", dataset.root())
            .unwrap();

        let writer = SegmentWriter::open(dataset.root(), &relpath, Shape::Concatenated).unwrap();
        let mut pending = writer.begin_append("grib").unwrap();
        let blob = pending.append(b"GRIBhello7777").unwrap();
        pending.commit().unwrap();

        let mut md = Metadata::new();
        md.set(Attr::Origin(Origin::Grib1 {
            centre,
            subcentre: 0,
            process: 0,
        }));
        md.set(Attr::Reftime(Reftime::Position(reftime)));
        md.set_source(blob);

        let Source::Blob { offset, size, .. } = md.source().unwrap().clone() else {
            unreachable!()
        };

        let index_path = crate::segment::Segment::new(relpath.clone(), Shape::Concatenated).index_sibling(dataset.root());
        let index = SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique).unwrap();
        index.insert(&md, offset, size).unwrap();

        let mut manifest = dataset.load_manifest().unwrap();
        manifest.upsert(relpath.to_str().unwrap(), 0, reftime, reftime);
        dataset.save_manifest(&manifest).unwrap();

        relpath
    }

    #[test]
    fn matches_the_indexed_origin_clause_via_sql_pushdown() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset(dir.path());
        ingest(&dataset, 200, 8);
        ingest(&dataset, 201, 9);

        let cache = ReaderCache::new(dataset.root(), 16);
        let query = DataQuery {
            matcher: Matcher::new().with_exact(
                Code::Origin,
                vec![Attr::Origin(Origin::Grib1 {
                    centre: 200,
                    subcentre: 0,
                    process: 0,
                })],
            ),
            with_data: false,
            sorter: None,
        };

        let hits = query_dataset(&dataset, &cache, &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0].metadata.get(Code::Origin), Some(Attr::Origin(Origin::Grib1 { centre: 200, .. }))));
    }

    #[test]
    fn reftime_range_prunes_segments_before_opening_their_index() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset(dir.path());
        ingest(&dataset, 200, 8);
        ingest(&dataset, 200, 20);

        let cache = ReaderCache::new(dataset.root(), 16);
        let query = DataQuery {
            matcher: Matcher::new().with_reftime_range(Some(Time::new(2007, 7, 1, 0, 0, 0).unwrap()), Some(Time::new(2007, 7, 10, 0, 0, 0).unwrap())),
            with_data: false,
            sorter: None,
        };

        let hits = query_dataset(&dataset, &cache, &query).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn with_data_inlines_bytes_and_rewrites_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset(dir.path());
        ingest(&dataset, 200, 8);

        let cache = ReaderCache::new(dataset.root(), 16);
        let query = DataQuery {
            matcher: Matcher::new(),
            with_data: true,
            sorter: None,
        };

        let hits = query_dataset(&dataset, &cache, &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].data.as_deref(), Some(&b"GRIBhello7777"[..]));
        assert!(matches!(hits[0].metadata.source().unwrap(), Source::Inline { .. }));
    }

    #[test]
    fn sorter_orders_hits_by_reftime() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset(dir.path());
        ingest(&dataset, 200, 20);
        ingest(&dataset, 200, 8);

        let cache = ReaderCache::new(dataset.root(), 16);
        let query = DataQuery {
            matcher: Matcher::new(),
            with_data: false,
            sorter: Some(Sorter::by(Code::Reftime, true)),
        };

        let hits = query_dataset(&dataset, &cache, &query).unwrap();
        let days: Vec<_> = hits.iter().map(|h| h.metadata.reftime().unwrap().representative().day).collect();
        assert_eq!(days, vec![8, 20]);
    }
}
