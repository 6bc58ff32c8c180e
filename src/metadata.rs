//! `Metadata`: one data message's attribute record (spec §3). Built on
//! `types::ItemSet` the way `arki/itemset.h`'s `ItemSet` factors out the
//! ordered-attribute-set machinery shared with `Summary` keys.

use crate::envelope::{read_bundle, write_bundle};
use crate::error::Error;
use crate::types::note::{Note, NoteLog};
use crate::types::reftime::Reftime;
use crate::types::source::Source;
use crate::types::time::Time;
use crate::types::{Attr, Code, ItemSet};
use crate::version::{FormatVersion, Tag};

/// A metadata record: a canonicalised attribute set plus an append-only
/// note log and exactly one `reftime` (spec §3's invariant). `source` is
/// mandatory once a record has been committed to a segment but is allowed
/// to be briefly absent while a record is being built up by a scanner, so
/// it is stored as an ordinary optional attribute rather than a required
/// field — `source()` surfaces the invariant violation as an error instead
/// of a panic when it matters (encode, `get_data`).
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Metadata {
    items: ItemSet,
    notes: NoteLog,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, attr: Attr) {
        self.items.set(attr);
    }

    pub fn unset(&mut self, code: Code) -> Option<Attr> {
        self.items.unset(code)
    }

    #[must_use]
    pub fn get(&self, code: Code) -> Option<&Attr> {
        self.items.get(code)
    }

    #[must_use]
    pub fn has(&self, code: Code) -> bool {
        self.items.has(code)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.notes.0.clear();
    }

    pub fn add_note(&mut self, time: Time, text: impl Into<String>) {
        self.notes.push(Note::new(time, text));
    }

    #[must_use]
    pub fn notes(&self) -> &[Note] {
        &self.notes.0
    }

    /// The record's mandatory reftime (spec §3: "exactly one `reftime`").
    pub fn reftime(&self) -> crate::Result<&Reftime> {
        match self.get(Code::Reftime) {
            Some(Attr::Reftime(r)) => Ok(r),
            _ => Err(Error::MalformedInput("metadata is missing its reftime".to_string())),
        }
    }

    /// The record's mandatory source (spec §3: "exactly one `source`").
    pub fn source(&self) -> crate::Result<&Source> {
        match self.get(Code::Source) {
            Some(Attr::Source(s)) => Ok(s),
            _ => Err(Error::MalformedInput("metadata is missing its source".to_string())),
        }
    }

    pub fn set_source(&mut self, source: Source) {
        self.set(Attr::Source(source));
    }

    /// Resolves this record's raw data. `BLOB` sources are read relative
    /// to `base_dir` (the dataset root the segment lives under); `INLINE`
    /// data is not reachable through this path and must have been carried
    /// alongside the metadata by the caller; `URL` sources require the
    /// scripting/network collaborator and are out of scope here.
    pub fn get_data(&self, base_dir: &std::path::Path) -> crate::Result<Vec<u8>> {
        match self.source()? {
            blob @ Source::Blob { relpath, .. } => {
                let segment = crate::segment::Segment::detect(base_dir, relpath.as_str())?;
                let reader = crate::segment::SegmentReader::new(base_dir, segment);
                reader.read(blob)
            }
            Source::Inline { .. } => Err(Error::DataUnavailable {
                path: "<inline>".to_string(),
                reason: "inline source data is not retrievable from the metadata record alone".to_string(),
            }),
            Source::Url { url, .. } => Err(Error::DataUnavailable {
                path: url.clone(),
                reason: "remote URL sources require the network collaborator".to_string(),
            }),
        }
    }

    /// Encodes this record as an `MD` envelope (spec §4.1). Notes are
    /// serialised inside the payload after the attribute set; they are not
    /// attributes and so are not part of `ItemSet`'s own encoding.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        let mut payload = Vec::new();
        crate::coding::Encode::encode_into(&self.items, &mut payload)?;
        crate::coding::Encode::encode_into(&self.notes, &mut payload)?;

        let mut out = Vec::new();
        write_bundle(&mut out, Tag::METADATA, FormatVersion::V1, &payload)?;
        Ok(out)
    }

    /// Decodes one `MD` envelope from `reader`. Rejects any other tag,
    /// including `!D` (deleted-metadata tombstones), which callers that
    /// need tombstone awareness should read with [`read_bundle`] directly.
    pub fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let bundle = read_bundle(reader)?;
        if bundle.tag != Tag::METADATA {
            return Err(Error::MalformedInput(format!(
                "expected {} envelope for a metadata record, found {}",
                Tag::METADATA,
                bundle.tag
            )));
        }
        let mut payload = &bundle.payload[..];
        let items = crate::coding::Decode::decode_from(&mut payload)?;
        let notes = crate::coding::Decode::decode_from(&mut payload)?;
        Ok(Metadata { items, notes })
    }

    /// True if `self` and `other` describe the same data relocated to a
    /// different segment: same attributes other than `source`, same notes.
    /// Used by repack/rescan to recognise "this is the record I just moved"
    /// without the full-record `PartialEq` (which, per spec §4.2, compares
    /// every attribute including `source`) reporting a spurious mismatch.
    #[must_use]
    pub fn equivalent_ignoring_source(&self, other: &Metadata) -> bool {
        let without_source = |items: &ItemSet| -> Vec<&Attr> {
            items.iter().filter(|attr| attr.code() != Code::Source).collect()
        };
        without_source(&self.items) == without_source(&other.items)
    }

    pub fn items(&self) -> &ItemSet {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::origin::Origin;

    fn sample() -> Metadata {
        let mut md = Metadata::new();
        md.set(Attr::Origin(Origin::Grib1 {
            centre: 200,
            subcentre: 0,
            process: 0,
        }));
        md.set(Attr::Reftime(Reftime::Position(Time::new(2007, 7, 8, 0, 0, 0).unwrap())));
        md.set_source(Source::Blob {
            format: "grib".to_string(),
            relpath: "2007/07-08.grib".to_string(),
            offset: 0,
            size: 100,
        });
        md
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let md = sample();
        let bytes = md.encode().unwrap();
        let decoded = Metadata::decode_from(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, md);
    }

    #[test]
    fn requires_reftime_and_source() {
        let md = Metadata::new();
        assert!(md.reftime().is_err());
        assert!(md.source().is_err());
    }

    #[test]
    fn equivalence_ignores_source_but_not_other_attributes() {
        let mut a = sample();
        let mut b = sample();
        b.set_source(Source::Blob {
            format: "grib".to_string(),
            relpath: "elsewhere.grib".to_string(),
            offset: 500,
            size: 100,
        });
        assert!(a.equivalent_ignoring_source(&b));

        b.set(Attr::Origin(Origin::Grib1 {
            centre: 1,
            subcentre: 0,
            process: 0,
        }));
        assert!(!a.equivalent_ignoring_source(&b));

        a.clear();
        assert!(!a.equivalent_ignoring_source(&sample()));
    }

    #[test]
    fn notes_are_preserved_in_append_order_and_excluded_from_items() {
        let mut md = sample();
        md.add_note(Time::NOW, "rescanned");
        assert_eq!(md.notes().len(), 1);
        assert!(!md.items().iter().any(|a| matches!(a, Attr::AssignedDataset(_))));

        let bytes = md.encode().unwrap();
        let decoded = Metadata::decode_from(&mut &bytes[..]).unwrap();
        assert_eq!(decoded.notes().len(), 1);
        assert_eq!(decoded.notes()[0].text, "rescanned");
    }

    #[test]
    fn get_data_resolves_a_blob_source_through_the_segment_reader() {
        use crate::segment::{writer::SegmentWriter, Shape};

        let dir = tempfile::tempdir().unwrap();
        let writer = SegmentWriter::open(dir.path(), "2007/07-08.grib", Shape::Concatenated).unwrap();
        let mut pending = writer.begin_append("grib").unwrap();
        let source = pending.append(b"GRIBhello7777").unwrap();
        pending.commit().unwrap();

        let mut md = sample();
        md.set_source(source);
        assert_eq!(md.get_data(dir.path()).unwrap(), b"GRIBhello7777");
    }
}
