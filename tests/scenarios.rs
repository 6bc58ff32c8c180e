//! End-to-end scenarios against the public API only, one per fixture in
//! spec.md's acceptance scenarios.

use arkimet_store::dataset::Dataset;
use arkimet_store::index::SegmentIndex;
use arkimet_store::maintenance::fixer::{Fixer, RealFixer};
use arkimet_store::maintenance::repacker::{Repacker, RealRepacker};
use arkimet_store::matcher::Matcher;
use arkimet_store::metadata::Metadata;
use arkimet_store::query::data_query::{DataQuery, Sorter};
use arkimet_store::query::merged::merged_query;
use arkimet_store::segment::{Segment, Shape};
use arkimet_store::types::origin::Origin;
use arkimet_store::types::reftime::Reftime;
use arkimet_store::types::time::Time;
use arkimet_store::types::Attr;
use arkimet_store::writer;

fn open_dataset(root: &std::path::Path, extra: &str) -> Dataset {
    std::fs::write(
        root.join("config"),
        format!(
            "type = iseg\npath = {}\nstep = daily\nindex = origin\nunique = origin,reftime\n{extra}",
            root.display()
        ),
    )
    .unwrap();
    Dataset::open(root).unwrap()
}

fn md_with(centre: u16, day: u8) -> Metadata {
    let mut md = Metadata::new();
    md.set(Attr::Origin(Origin::Grib1 { centre, subcentre: 0, process: 0 }));
    md.set(Attr::Reftime(Reftime::Position(Time::new(2007, 7, day, 0, 0, 0).unwrap())));
    md
}

/// S2: dispatching the same unique record twice under `replace=true`
/// leaves one surviving row and a tombstoned duplicate in the segment's
/// bytes; `check --repack --fix` drops the dead bytes back to a single
/// record's worth and clears `.dontpack`.
#[test]
fn s2_uniqueness_on_replace_then_repack() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = open_dataset(dir.path(), "replace = true\n");

    let mut first = md_with(200, 8);
    let outcome1 = writer::acquire(&dataset, &mut first, b"GRIBfirstcopy").unwrap();
    assert_eq!(outcome1, writer::Outcome::Ok);

    let mut second = md_with(200, 8);
    let outcome2 = writer::acquire(&dataset, &mut second, b"GRIBsecondcopy").unwrap();
    assert_eq!(outcome2, writer::Outcome::Ok);

    let relpath = dataset.relpath_for(&md_with(200, 8)).unwrap();
    let full_path = dataset.root().join(&relpath);
    assert_eq!(std::fs::read(&full_path).unwrap().len(), b"GRIBfirstcopy".len() + b"GRIBsecondcopy".len());
    assert!(dataset.root().join(".dontpack").exists());

    let segment = Segment::new(relpath.clone(), Shape::Concatenated);
    let index = SegmentIndex::open(&segment.index_sibling(dataset.root()), &dataset.config().index, &dataset.config().unique).unwrap();
    assert_eq!(index.len().unwrap(), 1);

    // A fixer pass first, the way `.dontpack`'s contract requires before a
    // repacker is allowed to touch the segment.
    let fix_reports = RealFixer::new().run(&dataset).unwrap();
    assert!(fix_reports.is_empty() || fix_reports.iter().all(|r| r.acted || r.detail.contains("not RealFixer's concern")));

    let repack_reports = RealRepacker.run(&dataset).unwrap();
    assert!(repack_reports.iter().any(|r| r.acted));

    assert_eq!(std::fs::read(&full_path).unwrap(), b"GRIBsecondcopy");
    let index = SegmentIndex::open(&segment.index_sibling(dataset.root()), &dataset.config().index, &dataset.config().unique).unwrap();
    assert_eq!(index.len().unwrap(), 1);
    assert!(!dataset.root().join(".dontpack").exists());
}

/// S4: two datasets each holding the same three reftimes, merged and
/// sorted by reftime, interleave in non-decreasing reftime order.
#[test]
fn s4_multi_dataset_merge_ordering() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let dataset_a = open_dataset(dir_a.path(), "");
    let dataset_b = open_dataset(dir_b.path(), "");

    for dataset in [&dataset_a, &dataset_b] {
        for day in [7u8, 8, 9] {
            let mut md = md_with(200, day);
            writer::acquire(dataset, &mut md, b"GRIBsamplebytes").unwrap();
        }
    }

    let query = DataQuery { matcher: Matcher::new(), with_data: false, sorter: Some(Sorter::by(arkimet_store::types::Code::Reftime, true)) };
    let sources = vec![("A".to_string(), &dataset_a), ("B".to_string(), &dataset_b)];
    let hits = merged_query(&sources, 16, &query).unwrap();

    assert_eq!(hits.len(), 6);
    let reftimes: Vec<Time> = hits.iter().map(|h| h.metadata.reftime().unwrap().representative()).collect();
    for pair in reftimes.windows(2) {
        assert!(pair[0].days_since_epoch() <= pair[1].days_since_epoch());
    }
}
