//! Multi-dataset merge (spec §4.8's "Multi-dataset merge"): one reader
//! thread per dataset, each pushing its hits into a bounded channel; the
//! merging side repeatedly pops the smallest head according to the
//! query's sorter (default: reftime) until every channel has drained.
//!
//! Grounded on `examples/original_source/arki/dataset/merged.cc`'s
//! error-isolation discipline: one producer failing never stops the
//! others, and every collected error is joined into a single combined
//! error only after all producers have finished.

use super::data_query::{query_dataset, DataQuery, QueryHit, Sorter};
use crate::cache::ReaderCache;
use crate::dataset::Dataset;
use crate::error::Error;
use crate::types::Code;
use interval_heap::IntervalHeap;
use std::cmp::Ordering;

/// Bounded channel capacity per producer (spec §4.8 default).
const CHANNEL_CAPACITY: usize = 10;

/// One channel's current head, ordered by the merge's sorter so the
/// interval heap's minimum is always the next hit to emit.
struct Head<'a> {
    channel: usize,
    hit: QueryHit,
    sorter: &'a Sorter,
}

impl PartialEq for Head<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.sorter.cmp_hits(&self.hit, &other.hit) == Ordering::Equal
    }
}

impl Eq for Head<'_> {}

impl PartialOrd for Head<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sorter.cmp_hits(&self.hit, &other.hit)
    }
}

/// Runs `query` against every `(label, dataset)` pair concurrently and
/// interleaves their hits in sorter order. `label` identifies a dataset in
/// any error raised against it; it carries no other meaning here.
pub fn merged_query(sources: &[(String, &Dataset)], cache_capacity: usize, query: &DataQuery) -> crate::Result<Vec<QueryHit>> {
    let sorter = query.sorter.clone().unwrap_or_else(|| Sorter::by(Code::Reftime, true));

    let (out, errors) = std::thread::scope(|scope| {
        let mut receivers = Vec::new();
        let mut handles = Vec::new();

        for (label, dataset) in sources {
            let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
            receivers.push(rx);
            let label = label.clone();
            handles.push(scope.spawn(move || -> crate::Result<()> {
                let cache = ReaderCache::new(dataset.root(), cache_capacity);
                let hits = query_dataset(dataset, &cache, query)
                    .map_err(|e| Error::DataUnavailable { path: label, reason: e.to_string() })?;
                for hit in hits {
                    if tx.send(hit).is_err() {
                        break;
                    }
                }
                Ok(())
            }));
        }

        let mut heap: IntervalHeap<Head<'_>> = IntervalHeap::new();
        for (channel, rx) in receivers.iter().enumerate() {
            if let Ok(hit) = rx.recv() {
                heap.push(Head { channel, hit, sorter: &sorter });
            }
        }

        let mut out = Vec::new();
        while let Some(Head { channel, hit, .. }) = heap.pop_min() {
            out.push(hit);
            if let Ok(next) = receivers[channel].recv() {
                heap.push(Head { channel, hit: next, sorter: &sorter });
            }
        }

        let mut errors = Vec::new();
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(_) => errors.push(Error::Reentrancy("a dataset's query thread panicked".to_string())),
            }
        }

        (out, errors)
    });

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(Error::Merged(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::matcher::Matcher;
    use crate::metadata::Metadata;
    use crate::segment::writer::SegmentWriter;
    use crate::segment::{Segment, Shape};
    use crate::types::origin::Origin;
    use crate::types::reftime::Reftime;
    use crate::types::time::Time;
    use crate::types::Attr;
    use crate::index::SegmentIndex;

    fn dataset_with_one_record(root: &std::path::Path, day: u8) -> Dataset {
        std::fs::write(
            root.join("config"),
            format!("type = iseg\npath = {}\nstep = daily\nindex = origin\nunique = origin\n", root.display()),
        )
        .unwrap();
        let dataset = Dataset::open(root).unwrap();

        let reftime = Time::new(2007, 7, day, 0, 0, 0).unwrap();
        let relpath = dataset.config().step.relpath(&reftime, "grib", root).unwrap();
        let writer = SegmentWriter::open(root, &relpath, Shape::Concatenated).unwrap();
        let mut pending = writer.begin_append("grib").unwrap();
        let blob = pending.append(b"GRIBx7777").unwrap();
        pending.commit().unwrap();

        let mut md = Metadata::new();
        md.set(Attr::Origin(Origin::Grib1 {
            centre: 200,
            subcentre: 0,
            process: 0,
        }));
        md.set(Attr::Reftime(Reftime::Position(reftime)));
        md.set_source(blob.clone());

        let crate::types::source::Source::Blob { offset, size, .. } = blob else {
            unreachable!()
        };
        let index_path = Segment::new(relpath.clone(), Shape::Concatenated).index_sibling(root);
        let index = SegmentIndex::open(&index_path, &dataset.config().index, &dataset.config().unique).unwrap();
        index.insert(&md, offset, size).unwrap();

        let mut manifest = dataset.load_manifest().unwrap();
        manifest.upsert(relpath.to_str().unwrap(), 0, reftime, reftime);
        dataset.save_manifest(&manifest).unwrap();

        dataset
    }

    #[test]
    fn merges_hits_from_two_datasets_in_reftime_order() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = dataset_with_one_record(dir_a.path(), 20);
        let b = dataset_with_one_record(dir_b.path(), 8);

        let query = DataQuery {
            matcher: Matcher::new(),
            with_data: false,
            sorter: None,
        };
        let hits = merged_query(&[("a".to_string(), &a), ("b".to_string(), &b)], 16, &query).unwrap();

        let days: Vec<_> = hits.iter().map(|h| h.metadata.reftime().unwrap().representative().day).collect();
        assert_eq!(days, vec![8, 20]);
    }
}
