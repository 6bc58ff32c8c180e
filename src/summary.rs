//! The summary structure (spec §4.7): a prefix-sharing map from a fixed-order
//! attribute tuple ([`SummaryItem`]) to accumulated stats ([`SummaryStats`]).
//!
//! Implemented as a `BTreeMap<SummaryItem, SummaryStats>` rather than
//! literal trie nodes: `SummaryItem`'s derived `Ord` already compares
//! field-by-field in descent order, so a sorted map gives the same
//! prefix-grouped iteration and common-prefix `merge` behaviour a trie
//! would, without a second tree implementation to keep in sync with it.

use crate::coding::{Decode, Encode};
use crate::envelope::{read_bundle, write_bundle};
use crate::error::Error;
use crate::metadata::Metadata;
use crate::types::summary_item::SummaryItem;
use crate::types::summary_stats::SummaryStats;
use crate::types::{Attr, Code};
use crate::version::{FormatVersion, Tag};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;

/// A dataset (or segment, or month) summary: one leaf per distinct
/// summarisable attribute tuple seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    leaves: BTreeMap<SummaryItem, SummaryStats>,
}

fn summarisable_tuple(md: &Metadata) -> SummaryItem {
    let origin = match md.items().get(Code::Origin) {
        Some(Attr::Origin(v)) => Some(v.clone()),
        _ => None,
    };
    let product = match md.items().get(Code::Product) {
        Some(Attr::Product(v)) => Some(v.clone()),
        _ => None,
    };
    let level = match md.items().get(Code::Level) {
        Some(Attr::Level(v)) => Some(v.clone()),
        _ => None,
    };
    let timerange = match md.items().get(Code::Timerange) {
        Some(Attr::Timerange(v)) => Some(v.clone()),
        _ => None,
    };
    let area = match md.items().get(Code::Area) {
        Some(Attr::Area(v)) => Some(v.clone()),
        _ => None,
    };
    let proddef = match md.items().get(Code::Proddef) {
        Some(Attr::Proddef(v)) => Some(v.clone()),
        _ => None,
    };
    SummaryItem {
        origin,
        product,
        level,
        timerange,
        area,
        proddef,
    }
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalises `md`'s summarisable attributes into a tuple, descends
    /// (creating the leaf if absent), and merges `md`'s size/reftime into
    /// that leaf's stats.
    pub fn add(&mut self, md: &Metadata, size: u64) -> crate::Result<()> {
        let reftime = md.reftime()?;
        let key = summarisable_tuple(md);
        self.leaves.entry(key).or_default().add(size, reftime);
        Ok(())
    }

    /// Recursive node-wise merge with common-prefix reuse: leaves that
    /// already exist in `self` have `other`'s stats folded in; leaves only
    /// `other` has are inserted as-is.
    pub fn merge(&mut self, other: &Summary) {
        for (key, stats) in &other.leaves {
            self.leaves.entry(key.clone()).or_default().merge(stats);
        }
    }

    /// A new summary containing only leaves whose tuple satisfies
    /// `predicate` — a whole-subtree prune, since a tuple failing at any
    /// position removes every leaf sharing that prefix.
    pub fn filter(&self, predicate: impl Fn(&SummaryItem) -> bool) -> Summary {
        Summary {
            leaves: self
                .leaves
                .iter()
                .filter(|(key, _)| predicate(key))
                .map(|(key, stats)| (key.clone(), *stats))
                .collect(),
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.leaves.values().map(|s| s.count).sum()
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.leaves.values().map(|s| s.total_size).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The union of this summary's reftime span across all leaves.
    #[must_use]
    pub fn reftime_span(&self) -> Option<(crate::types::time::Time, crate::types::time::Time)> {
        self.leaves.values().filter_map(SummaryStats::reftime_span).fold(None, |acc, (min, max)| match acc {
            None => Some((min, max)),
            Some((amin, amax)) => Some((amin.min(min), amax.max(max))),
        })
    }

    /// Bounding-box union over leaf geometry attributes. Geometry
    /// computation (the `area` attribute's actual footprint) is an
    /// external collaborator's concern, not this crate's (spec §4.7); this
    /// returns the leaf tuples a caller would feed to that collaborator.
    pub fn convex_hull_inputs(&self) -> impl Iterator<Item = &SummaryItem> {
        self.leaves.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SummaryItem, &SummaryStats)> {
        self.leaves.iter()
    }

    /// Encodes as an `SU` envelope: a count, then each `(item, stats)` pair.
    pub fn encode_envelope(&self) -> crate::Result<Vec<u8>> {
        let mut payload = Vec::new();
        payload.write_u32::<BigEndian>(self.leaves.len() as u32)?;
        for (item, stats) in &self.leaves {
            item.encode_into(&mut payload)?;
            stats.encode_into(&mut payload)?;
        }
        let mut out = Vec::new();
        write_bundle(&mut out, Tag::SUMMARY, FormatVersion::V1, &payload)?;
        Ok(out)
    }

    pub fn decode_envelope<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let bundle = read_bundle(reader)?;
        if bundle.tag != Tag::SUMMARY {
            return Err(Error::MalformedInput(format!("expected SU envelope, got {}", bundle.tag)));
        }
        let mut cursor = &bundle.payload[..];
        let count = cursor.read_u32::<BigEndian>()?;
        let mut leaves = BTreeMap::new();
        for _ in 0..count {
            let item = SummaryItem::decode_from(&mut cursor)?;
            let stats = SummaryStats::decode_from(&mut cursor)?;
            leaves.insert(item, stats);
        }
        Ok(Summary { leaves })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::origin::Origin;
    use crate::types::reftime::Reftime;
    use crate::types::source::Source;
    use crate::types::time::Time;

    fn sample(centre: u16, day: u8) -> Metadata {
        let mut md = Metadata::new();
        md.set(Attr::Origin(Origin::Grib1 {
            centre,
            subcentre: 0,
            process: 0,
        }));
        md.set(Attr::Reftime(Reftime::Position(Time::new(2007, 7, day, 0, 0, 0).unwrap())));
        md.set_source(Source::Blob {
            format: "grib".to_string(),
            relpath: "2007/07.grib".to_string(),
            offset: 0,
            size: 10,
        });
        md
    }

    #[test]
    fn add_accumulates_into_a_shared_leaf() {
        let mut summary = Summary::new();
        summary.add(&sample(200, 1), 100).unwrap();
        summary.add(&sample(200, 2), 200).unwrap();
        assert_eq!(summary.count(), 2);
        assert_eq!(summary.size(), 300);
        assert_eq!(summary.leaves.len(), 1);
    }

    #[test]
    fn distinct_tuples_get_distinct_leaves() {
        let mut summary = Summary::new();
        summary.add(&sample(200, 1), 100).unwrap();
        summary.add(&sample(201, 1), 100).unwrap();
        assert_eq!(summary.leaves.len(), 2);
    }

    #[test]
    fn merge_combines_overlapping_and_disjoint_leaves() {
        let mut a = Summary::new();
        a.add(&sample(200, 1), 100).unwrap();
        let mut b = Summary::new();
        b.add(&sample(200, 2), 50).unwrap();
        b.add(&sample(201, 2), 50).unwrap();

        a.merge(&b);
        assert_eq!(a.count(), 3);
        assert_eq!(a.size(), 200);
    }

    #[test]
    fn filter_prunes_leaves_failing_the_predicate() {
        let mut summary = Summary::new();
        summary.add(&sample(200, 1), 100).unwrap();
        summary.add(&sample(201, 1), 100).unwrap();

        let filtered = summary.filter(|item| matches!(&item.origin, Some(Origin::Grib1 { centre: 200, .. })));
        assert_eq!(filtered.count(), 1);
    }

    #[test]
    fn round_trips_through_su_envelope() {
        let mut summary = Summary::new();
        summary.add(&sample(200, 1), 100).unwrap();
        summary.add(&sample(201, 2), 200).unwrap();

        let bytes = summary.encode_envelope().unwrap();
        let decoded = Summary::decode_envelope(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, summary);
    }
}
