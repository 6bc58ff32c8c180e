//! The compiled query predicate (spec §6.3). The matcher/alias expansion
//! *language* is an external collaborator's concern (spec §1's
//! Out-of-scope list) — this module is only the compiled AST the core
//! consumes: one clause per attribute code, each clause either an OR-list
//! of literal values or (for `reftime`) an open/closed range, combined by
//! implicit AND across codes the way `arki/matcher-tut.cc`'s fixture
//! expressions (`origin:GRIB1,200; reftime:>=2007-07-08`) read.
//!
//! `CodeClause` dispatches through `enum_dispatch` the way the teacher's
//! `compaction::CompactionStrategy` is implemented by several concrete
//! strategy structs behind one enum — here the two concrete clause shapes
//! (`ExactClause`, `ReftimeClause`) behind the `Clause` trait.

use crate::error::Error;
use crate::metadata::Metadata;
use crate::types::reftime::Reftime;
use crate::types::summary_item::SummaryItem;
use crate::types::time::Time;
use crate::types::{Attr, Code};
use enum_dispatch::enum_dispatch;
use std::collections::BTreeMap;

#[enum_dispatch]
pub trait Clause {
    /// Whether a non-reftime attribute (or its absence) satisfies this
    /// clause.
    fn matches_attr(&self, attr: Option<&Attr>) -> bool;
    /// Whether a reftime satisfies this clause. Only `ReftimeClause`
    /// overrides this meaningfully; `ExactClause` never applies to
    /// `Code::Reftime` so it simply rejects.
    fn matches_reftime(&self, reftime: &Reftime) -> bool;
    /// A self-contained SQL boolean expression over `colname`, or `None`
    /// if this clause can't be expressed against the index (an OR-list
    /// value with no interned id at all — meaning it can never match any
    /// row already indexed).
    fn sql_fragment(&self, colname: &str, lookup: &dyn Fn(&Attr) -> Option<i64>) -> Option<String>;
    /// Whether `span` (a segment's step-implied reftime range) could
    /// possibly contain a match — used to prune whole segments before
    /// opening them. Non-reftime clauses never prune on path alone.
    fn path_matches_span(&self, span: Option<(Time, Time)>) -> bool;
}

/// An OR-list of literal attribute values for one non-reftime code.
#[derive(Clone, Debug, PartialEq)]
pub struct ExactClause {
    values: Vec<Attr>,
}

impl Clause for ExactClause {
    fn matches_attr(&self, attr: Option<&Attr>) -> bool {
        match attr {
            Some(attr) => self.values.iter().any(|v| v == attr),
            None => false,
        }
    }

    fn matches_reftime(&self, _reftime: &Reftime) -> bool {
        false
    }

    fn sql_fragment(&self, colname: &str, lookup: &dyn Fn(&Attr) -> Option<i64>) -> Option<String> {
        let ids: Vec<i64> = self.values.iter().filter_map(lookup).collect();
        if ids.is_empty() {
            // None of the OR-list's values were ever interned: this clause
            // can't match any indexed row.
            return Some("0".to_string());
        }
        let list = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
        Some(format!("{colname} IN ({list})"))
    }

    fn path_matches_span(&self, _span: Option<(Time, Time)>) -> bool {
        true
    }
}

/// An open or closed `reftime` range.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReftimeClause {
    from: Option<Time>,
    to: Option<Time>,
}

impl Clause for ReftimeClause {
    fn matches_attr(&self, _attr: Option<&Attr>) -> bool {
        false
    }

    fn matches_reftime(&self, reftime: &Reftime) -> bool {
        let (begin, end) = reftime.span();
        self.from.is_none_or(|from| end >= from) && self.to.is_none_or(|to| begin <= to)
    }

    fn sql_fragment(&self, colname: &str, _lookup: &dyn Fn(&Attr) -> Option<i64>) -> Option<String> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some(format!("{colname} BETWEEN '{}' AND '{}'", from.to_sql_text(), to.to_sql_text())),
            (Some(from), None) => Some(format!("{colname} >= '{}'", from.to_sql_text())),
            (None, Some(to)) => Some(format!("{colname} <= '{}'", to.to_sql_text())),
            (None, None) => None,
        }
    }

    fn path_matches_span(&self, span: Option<(Time, Time)>) -> bool {
        match span {
            None => true,
            Some((min, max)) => self.from.is_none_or(|from| max >= from) && self.to.is_none_or(|to| min <= to),
        }
    }
}

#[enum_dispatch(Clause)]
#[derive(Clone, Debug, PartialEq)]
pub enum CodeClause {
    Exact(ExactClause),
    Reftime(ReftimeClause),
}

/// A compiled predicate: one clause per constrained attribute code,
/// implicitly ANDed together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Matcher {
    clauses: BTreeMap<Code, CodeClause>,
}

impl Matcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_exact(mut self, code: Code, values: Vec<Attr>) -> Self {
        self.clauses.insert(code, CodeClause::Exact(ExactClause { values }));
        self
    }

    #[must_use]
    pub fn with_reftime_range(mut self, from: Option<Time>, to: Option<Time>) -> Self {
        self.clauses.insert(Code::Reftime, CodeClause::Reftime(ReftimeClause { from, to }));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = Code> + '_ {
        self.clauses.keys().copied()
    }

    /// Evaluates every clause against `md`, short-circuiting on the first
    /// failure (spec §6.3's `match(metadata) -> bool`).
    pub fn matches_metadata(&self, md: &Metadata) -> crate::Result<bool> {
        for (code, clause) in &self.clauses {
            let ok = if *code == Code::Reftime {
                clause.matches_reftime(md.reftime()?)
            } else {
                clause.matches_attr(md.items().get(*code))
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluates every non-reftime clause against a summary leaf's tuple
    /// (spec §6.3's `match(summary-item) -> bool`); reftime isn't part of
    /// a `SummaryItem`'s key, so a reftime clause is vacuously satisfied
    /// here and must be checked separately against the leaf's own stats.
    #[must_use]
    pub fn matches_summary_item(&self, item: &SummaryItem) -> bool {
        self.clauses
            .iter()
            .filter(|(code, _)| **code != Code::Reftime)
            .all(|(code, clause)| clause.matches_attr(summary_item_attr(item, *code).as_ref()))
    }

    /// Splits this matcher's clauses into the subset indexed as SQL
    /// columns and the residual that must be checked in memory against
    /// each candidate row's reconstructed metadata (spec §4.8 step 1).
    #[must_use]
    pub fn split(&self, indexed_codes: &[Code]) -> (Matcher, Matcher) {
        let mut indexed = Matcher::new();
        let mut residual = Matcher::new();
        for (code, clause) in &self.clauses {
            if *code == Code::Reftime || indexed_codes.contains(code) {
                indexed.clauses.insert(*code, clause.clone());
            } else {
                residual.clauses.insert(*code, clause.clone());
            }
        }
        (indexed, residual)
    }

    /// The SQL fragment for `code`'s clause against `colname`, or `None`
    /// if this matcher has no clause for that code (an unconstrained
    /// column contributes no fragment, not a `TRUE`/`FALSE` one).
    pub fn sql_fragment(&self, code: Code, colname: &str, lookup: &dyn Fn(&Attr) -> Option<i64>) -> Option<String> {
        self.clauses.get(&code).and_then(|clause| clause.sql_fragment(colname, lookup))
    }

    /// Whether a segment whose step-implied reftime span is `span` could
    /// possibly hold a match (spec §6.3's `path_matches`); only the
    /// reftime clause, if any, constrains this.
    #[must_use]
    pub fn path_matches(&self, span: Option<(Time, Time)>) -> bool {
        match self.clauses.get(&Code::Reftime) {
            Some(clause) => clause.path_matches_span(span),
            None => true,
        }
    }
}

fn summary_item_attr(item: &SummaryItem, code: Code) -> Option<Attr> {
    match code {
        Code::Origin => item.origin.clone().map(Attr::Origin),
        Code::Product => item.product.clone().map(Attr::Product),
        Code::Level => item.level.clone().map(Attr::Level),
        Code::Timerange => item.timerange.clone().map(Attr::Timerange),
        Code::Area => item.area.clone().map(Attr::Area),
        Code::Proddef => item.proddef.clone().map(Attr::Proddef),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::origin::Origin;
    use crate::types::source::Source;

    fn md_with_origin(centre: u16, reftime: Time) -> Metadata {
        let mut md = Metadata::new();
        md.set(Attr::Origin(Origin::Grib1 {
            centre,
            subcentre: 0,
            process: 0,
        }));
        md.set(Attr::Reftime(Reftime::Position(reftime)));
        md.set_source(Source::Blob {
            format: "grib".to_string(),
            relpath: "x.grib".to_string(),
            offset: 0,
            size: 1,
        });
        md
    }

    #[test]
    fn exact_clause_matches_any_value_in_its_or_list() {
        let matcher = Matcher::new().with_exact(
            Code::Origin,
            vec![
                Attr::Origin(Origin::Grib1 {
                    centre: 200,
                    subcentre: 0,
                    process: 0,
                }),
                Attr::Origin(Origin::Grib1 {
                    centre: 201,
                    subcentre: 0,
                    process: 0,
                }),
            ],
        );
        let t = Time::new(2007, 7, 8, 0, 0, 0).unwrap();
        assert!(matcher.matches_metadata(&md_with_origin(200, t)).unwrap());
        assert!(matcher.matches_metadata(&md_with_origin(201, t)).unwrap());
        assert!(!matcher.matches_metadata(&md_with_origin(202, t)).unwrap());
    }

    #[test]
    fn reftime_range_is_inclusive_on_both_ends() {
        let from = Time::new(2007, 7, 1, 0, 0, 0).unwrap();
        let to = Time::new(2007, 7, 31, 0, 0, 0).unwrap();
        let matcher = Matcher::new().with_reftime_range(Some(from), Some(to));

        assert!(matcher.matches_metadata(&md_with_origin(200, from)).unwrap());
        assert!(matcher.matches_metadata(&md_with_origin(200, to)).unwrap());
        assert!(!matcher.matches_metadata(&md_with_origin(200, Time::new(2007, 8, 1, 0, 0, 0).unwrap())).unwrap());
    }

    #[test]
    fn split_separates_indexed_and_residual_clauses() {
        let matcher = Matcher::new()
            .with_exact(
                Code::Origin,
                vec![Attr::Origin(Origin::Grib1 {
                    centre: 200,
                    subcentre: 0,
                    process: 0,
                })],
            )
            .with_reftime_range(Some(Time::new(2007, 7, 1, 0, 0, 0).unwrap()), None);

        let (indexed, residual) = matcher.split(&[Code::Origin]);
        assert!(indexed.clauses.contains_key(&Code::Origin));
        assert!(indexed.clauses.contains_key(&Code::Reftime));
        assert!(residual.is_empty());
    }

    #[test]
    fn split_routes_unindexed_codes_to_the_residual() {
        let matcher = Matcher::new().with_exact(
            Code::Product,
            vec![Attr::Origin(Origin::Grib1 {
                centre: 200,
                subcentre: 0,
                process: 0,
            })],
        );
        let (indexed, residual) = matcher.split(&[Code::Origin]);
        assert!(indexed.is_empty());
        assert!(residual.clauses.contains_key(&Code::Product));
    }

    #[test]
    fn sql_fragment_renders_an_in_clause_from_looked_up_ids() {
        let origin = Attr::Origin(Origin::Grib1 {
            centre: 200,
            subcentre: 0,
            process: 0,
        });
        let matcher = Matcher::new().with_exact(Code::Origin, vec![origin.clone()]);
        let lookup = |attr: &Attr| if *attr == origin { Some(42) } else { None };
        assert_eq!(matcher.sql_fragment(Code::Origin, "c_origin", &lookup).unwrap(), "c_origin IN (42)");
    }

    #[test]
    fn sql_fragment_for_a_half_open_reftime_range() {
        let from = Time::new(2007, 7, 1, 0, 0, 0).unwrap();
        let matcher = Matcher::new().with_reftime_range(Some(from), None);
        let fragment = matcher.sql_fragment(Code::Reftime, "reftime_text", &|_| None).unwrap();
        assert_eq!(fragment, "reftime_text >= '2007-07-01 00:00:00'");
    }

    #[test]
    fn path_matches_prunes_segments_outside_the_reftime_span() {
        let from = Time::new(2007, 7, 1, 0, 0, 0).unwrap();
        let matcher = Matcher::new().with_reftime_range(Some(from), None);
        let june = (Time::new(2007, 6, 1, 0, 0, 0).unwrap(), Time::new(2007, 6, 30, 23, 59, 59).unwrap());
        let july = (Time::new(2007, 7, 1, 0, 0, 0).unwrap(), Time::new(2007, 7, 31, 23, 59, 59).unwrap());
        assert!(!matcher.path_matches(Some(june)));
        assert!(matcher.path_matches(Some(july)));
    }

    #[test]
    fn matches_summary_item_ignores_reftime_clauses() {
        let matcher = Matcher::new().with_reftime_range(Some(Time::new(2007, 1, 1, 0, 0, 0).unwrap()), None);
        assert!(matcher.matches_summary_item(&SummaryItem::empty()));
    }
}
