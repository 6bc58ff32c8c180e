//! `ByteQuery`: the four shapes a `DataQuery`'s hits can become an output
//! byte stream in (spec §4.8) — raw data concatenation, a whitelisted
//! post-processor's stdout, or a scripting collaborator's report driven by
//! either the metadata stream or the computed summary.

use super::data_query::{query_dataset, DataQuery, QueryHit};
use crate::cache::ReaderCache;
use crate::dataset::Dataset;
use crate::error::Error;
use crate::scripting::QueryMacro;
use crate::summary::Summary;
use crate::types::source::Source;
use std::io::Write;
use std::process::{Command, Stdio};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ByteQueryType {
    /// Raw concatenation of each hit's payload, in query order.
    Data,
    /// `param` names a whitelisted external process; hit payloads are piped
    /// to its stdin, its stdout becomes the output.
    Postprocess,
    /// `param` names a report rendered over each metadata record in turn.
    RepMetadata,
    /// `param` names a report rendered over the query's computed summary.
    RepSummary,
}

/// A `DataQuery` plus the output-stream shape a caller wants its hits
/// delivered in.
pub struct ByteQuery {
    pub data: DataQuery,
    pub kind: ByteQueryType,
    /// Postprocessor name (`Postprocess`) or report name (`Rep*`); unused by
    /// `Data`.
    pub param: Option<String>,
    /// Fired exactly once, just before the first byte of output leaves the
    /// system — lets a caller defer sending response headers until there is
    /// actually something to send.
    pub data_start_hook: Option<Box<dyn FnOnce() + Send>>,
}

fn hit_size(hit: &QueryHit) -> u64 {
    match hit.metadata.source() {
        Ok(Source::Blob { size, .. } | Source::Inline { size, .. }) => *size,
        _ => hit.data.as_ref().map_or(0, |d| d.len() as u64),
    }
}

impl ByteQuery {
    /// Executes this query against `dataset`, writing its output to `sink`.
    /// `postprocess_whitelist` is the dataset's configured `postprocess`
    /// option (spec §3); a `Postprocess` query naming anything else is
    /// rejected rather than run. `macro_impl` is required by the two `Rep*`
    /// kinds and ignored otherwise.
    pub fn run(
        mut self,
        dataset: &Dataset,
        cache: &ReaderCache,
        postprocess_whitelist: &[String],
        macro_impl: Option<&mut dyn QueryMacro>,
        sink: &mut dyn Write,
    ) -> crate::Result<()> {
        let hits = query_dataset(dataset, cache, &self.data)?;
        let mut hook = self.data_start_hook.take();
        let mut fire_hook = move || {
            if let Some(hook) = hook.take() {
                hook();
            }
        };

        match self.kind {
            ByteQueryType::Data => {
                for hit in &hits {
                    let bytes = hit.data.as_ref().ok_or_else(|| {
                        Error::Config("DATA byte queries require with_data on the underlying query".to_string())
                    })?;
                    if !bytes.is_empty() {
                        fire_hook();
                    }
                    sink.write_all(bytes)?;
                }
                Ok(())
            }
            ByteQueryType::Postprocess => {
                let name = self
                    .param
                    .as_deref()
                    .ok_or_else(|| Error::Config("POSTPROCESS query requires a postprocessor name".to_string()))?;
                if !postprocess_whitelist.iter().any(|p| p == name) {
                    return Err(Error::Config(format!("postprocessor {name:?} is not in this dataset's whitelist")));
                }
                let mut child = Command::new(name)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .spawn()
                    .map_err(|e| Error::Config(format!("failed to spawn postprocessor {name:?}: {e}")))?;
                {
                    let mut stdin = child.stdin.take().expect("stdin was piped");
                    for hit in &hits {
                        if let Some(bytes) = &hit.data {
                            stdin.write_all(bytes)?;
                        }
                    }
                }
                let output = child.wait_with_output()?;
                if !output.stdout.is_empty() {
                    fire_hook();
                }
                sink.write_all(&output.stdout)?;
                Ok(())
            }
            ByteQueryType::RepMetadata => {
                let macro_impl = macro_impl
                    .ok_or_else(|| Error::Config("REP_METADATA query requires a scripting collaborator".to_string()))?;
                for hit in &hits {
                    fire_hook();
                    macro_impl.on_metadata(&hit.metadata)?;
                }
                Ok(())
            }
            ByteQueryType::RepSummary => {
                let macro_impl = macro_impl
                    .ok_or_else(|| Error::Config("REP_SUMMARY query requires a scripting collaborator".to_string()))?;
                let mut summary = Summary::new();
                for hit in &hits {
                    summary.add(&hit.metadata, hit_size(hit))?;
                }
                fire_hook();
                macro_impl.on_summary(&summary)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::index::SegmentIndex;
    use crate::matcher::Matcher;
    use crate::metadata::Metadata;
    use crate::segment::writer::SegmentWriter;
    use crate::segment::{Segment, Shape};
    use crate::types::origin::Origin;
    use crate::types::reftime::Reftime;
    use crate::types::time::Time;
    use crate::types::Attr;

    fn open_dataset_with_one_record(root: &std::path::Path) -> Dataset {
        std::fs::write(
            root.join("config"),
            format!("type = iseg\npath = {}\nstep = daily\nindex = origin\nunique = origin\n", root.display()),
        )
        .unwrap();
        let dataset = Dataset::open(root).unwrap();

        let reftime = Time::new(2007, 7, 8, 0, 0, 0).unwrap();
        let relpath = dataset.config().step.relpath(&reftime, "grib", root).unwrap();
        let writer = SegmentWriter::open(root, &relpath, Shape::Concatenated).unwrap();
        let mut pending = writer.begin_append("grib").unwrap();
        let blob = pending.append(b"GRIBhello7777").unwrap();
        pending.commit().unwrap();

        let mut md = Metadata::new();
        md.set(Attr::Origin(Origin::Grib1 { centre: 200, subcentre: 0, process: 0 }));
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
    fn data_query_concatenates_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset_with_one_record(dir.path());
        let cache = ReaderCache::new(dataset.root(), 8);

        let query = ByteQuery {
            data: DataQuery { matcher: Matcher::new(), with_data: true, sorter: None },
            kind: ByteQueryType::Data,
            param: None,
            data_start_hook: None,
        };
        let mut out = Vec::new();
        query.run(&dataset, &cache, &[], None, &mut out).unwrap();
        assert_eq!(out, b"GRIBhello7777");
    }

    #[test]
    fn postprocess_rejects_names_outside_the_whitelist() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset_with_one_record(dir.path());
        let cache = ReaderCache::new(dataset.root(), 8);

        let query = ByteQuery {
            data: DataQuery { matcher: Matcher::new(), with_data: true, sorter: None },
            kind: ByteQueryType::Postprocess,
            param: Some("rm".to_string()),
            data_start_hook: None,
        };
        let mut out = Vec::new();
        let err = query.run(&dataset, &cache, &["cat".to_string()], None, &mut out).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn data_start_hook_fires_once_before_the_first_byte() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = open_dataset_with_one_record(dir.path());
        let cache = ReaderCache::new(dataset.root(), 8);

        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();
        let query = ByteQuery {
            data: DataQuery { matcher: Matcher::new(), with_data: true, sorter: None },
            kind: ByteQueryType::Data,
            param: None,
            data_start_hook: Some(Box::new(move || fired_clone.store(true, std::sync::atomic::Ordering::SeqCst))),
        };
        let mut out = Vec::new();
        query.run(&dataset, &cache, &[], None, &mut out).unwrap();
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }
}
