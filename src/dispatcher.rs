//! Routes one scanned record across a pool of datasets (spec §4.10). Builds
//! on [`crate::writer::acquire`] the way `flush.rs`'s `Options`-struct plus
//! `flush_to_segment` builds on `segment::writer::Writer`: one struct
//! describing a single operation's inputs, one function driving it end to
//! end. Parsing a dataset's `filter` string into the [`Matcher`] a [`Route`]
//! carries is the alias/expression language's job (spec §1's out-of-scope
//! list); the dispatcher only ever consumes the already-compiled form.

use crate::dataset::config::DatasetKind;
use crate::dataset::Dataset;
use crate::error::Error;
use crate::matcher::Matcher;
use crate::metadata::Metadata;
use crate::types::time::Time;
use crate::writer::{self, Outcome};
use std::path::Path;

/// One dataset the dispatcher can route into, paired with the compiled
/// predicate that decides whether a record belongs there.
pub struct Route {
    pub name: String,
    pub dataset: Dataset,
    pub matcher: Matcher,
}

impl Route {
    pub fn new(name: impl Into<String>, dataset: Dataset, matcher: Matcher) -> Self {
        Route {
            name: name.into(),
            dataset,
            matcher,
        }
    }
}

/// What the dispatcher did with one record (spec §4.10 steps 3-5).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    /// Every outbound pass aside, acquired into exactly the one regular
    /// dataset that matched.
    Acquired { dataset: String },
    /// No regular dataset matched; routed to `error`.
    Unassigned,
    /// More than one regular dataset matched; routed to `error`.
    Ambiguous { datasets: Vec<String> },
    /// The matched dataset rejected the record under its `unique`
    /// constraint and no `duplicates` dataset resolved it; routed to
    /// `error`.
    Duplicate,
    /// Rejected as a duplicate by its matched dataset, then accepted by
    /// the configured `duplicates` dataset.
    Redirected,
    /// Acquiring into the matched dataset failed outright; routed to
    /// `error`.
    Failed,
}

/// A pool of writers composed into one routing decision per record.
pub struct Dispatcher {
    routes: Vec<Route>,
    error: Dataset,
    duplicates: Option<Dataset>,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(routes: Vec<Route>, error: Dataset, duplicates: Option<Dataset>) -> Self {
        Dispatcher {
            routes,
            error,
            duplicates,
            dry_run: false,
        }
    }

    /// The test-mode dispatcher used by `arki-check --dispatch`: every step
    /// runs, nothing is written. Used to preview where a record would land.
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Dispatches one record, mutating `md` with whatever the chosen
    /// writer(s) stamped onto it. `base_dir` resolves `md`'s current
    /// `source` (typically the scan input, not any target dataset) so the
    /// bytes can be force-fetched up front, per spec §4.10 step 1: a record
    /// whose data can't be read at all fails here, before any dataset is
    /// touched, rather than after a route has already been chosen.
    ///
    /// Returns the outcome alongside a textual trace of every step taken;
    /// in `dry_run` mode the trace describes what would have happened
    /// without any writer being called.
    pub fn dispatch(&self, md: &mut Metadata, base_dir: &Path) -> crate::Result<(DispatchOutcome, Vec<String>)> {
        let mut trace = Vec::new();
        let data = md.get_data(base_dir)?;
        trace.push(format!("fetched {} bytes", data.len()));

        self.run_outbound_pass(md, &data, &mut trace);

        let matches: Vec<&Route> = self
            .routes
            .iter()
            .filter(|r| r.dataset.config().kind != DatasetKind::Outbound)
            .filter(|r| r.matcher.matches_metadata(md).unwrap_or(false))
            .collect();

        let (target, mut outcome) = match matches.len() {
            0 => {
                md.add_note(Time::now_wallclock(), "unassigned: no dataset matched this record".to_string());
                (&self.error, DispatchOutcome::Unassigned)
            }
            1 => (
                &matches[0].dataset,
                DispatchOutcome::Acquired {
                    dataset: matches[0].name.clone(),
                },
            ),
            _ => {
                let names: Vec<String> = matches.iter().map(|r| r.name.clone()).collect();
                md.add_note(
                    Time::now_wallclock(),
                    format!("ambiguous: matched {} datasets: {}", names.len(), names.join(", ")),
                );
                (&self.error, DispatchOutcome::Ambiguous { datasets: names })
            }
        };

        if self.dry_run {
            trace.push(format!("DRY RUN: would acquire into {outcome:?}"));
            return Ok((outcome, trace));
        }

        match writer::acquire(target, md, &data)? {
            Outcome::Ok => {
                trace.push(format!("acquired ({outcome:?})"));
            }
            Outcome::ErrorDuplicate => {
                outcome = self.redirect_duplicate(md, &data, &mut trace)?;
            }
            Outcome::Error => {
                self.route_to_error(md, &data, "acquire failed")?;
                trace.push("acquire failed, routed to error".to_string());
                outcome = DispatchOutcome::Failed;
            }
        }

        Ok((outcome, trace))
    }

    /// Step 2: acquire into every matching outbound dataset, isolated from
    /// everything else — an outbound failure is logged and counted but
    /// never changes the regular routing decision or fails the dispatch.
    fn run_outbound_pass(&self, md: &Metadata, data: &[u8], trace: &mut Vec<String>) {
        let mut failures = 0usize;
        for route in self.routes.iter().filter(|r| r.dataset.config().kind == DatasetKind::Outbound) {
            if !route.matcher.matches_metadata(md).unwrap_or(false) {
                continue;
            }
            if self.dry_run {
                trace.push(format!("DRY RUN: would acquire into outbound dataset {:?}", route.name));
                continue;
            }
            let mut copy = md.clone();
            match writer::acquire(&route.dataset, &mut copy, data) {
                Ok(Outcome::Ok) => trace.push(format!("acquired into outbound dataset {:?}", route.name)),
                other => {
                    failures += 1;
                    log::warn!("outbound dataset {:?} failed to acquire: {other:?}", route.name);
                    trace.push(format!("outbound dataset {:?} failed to acquire (ignored)", route.name));
                }
            }
        }
        if failures > 0 {
            trace.push(format!("{failures} outbound dataset(s) failed; dispatch continues"));
        }
    }

    /// Step 4: the matched dataset rejected `md` under its `unique`
    /// constraint. Retry into `duplicates` if configured; either way, a
    /// failure to settle there falls through to `error`.
    fn redirect_duplicate(&self, md: &mut Metadata, data: &[u8], trace: &mut Vec<String>) -> crate::Result<DispatchOutcome> {
        if let Some(duplicates) = &self.duplicates {
            match writer::acquire(duplicates, md, data)? {
                Outcome::Ok => {
                    trace.push("duplicate: redirected into the duplicates dataset".to_string());
                    return Ok(DispatchOutcome::Redirected);
                }
                _ => {
                    md.add_note(Time::now_wallclock(), "duplicate: the duplicates dataset also rejected this record".to_string());
                }
            }
        }
        self.route_to_error(md, data, "duplicate: no duplicates dataset resolved this record")?;
        trace.push("duplicate: routed to error".to_string());
        Ok(DispatchOutcome::Duplicate)
    }

    fn route_to_error(&self, md: &mut Metadata, data: &[u8], reason: &str) -> crate::Result<()> {
        match writer::acquire(&self.error, md, data)? {
            Outcome::Ok => Ok(()),
            _ => Err(Error::DataUnavailable {
                path: self.error.config().name.clone(),
                reason: format!("error dataset itself failed to acquire ({reason})"),
            }),
        }
    }
}
