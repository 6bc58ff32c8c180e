//! Segment-time granularity (spec §3's `step` config key): the mapping
//! from a message's reftime to the segment-relative path it belongs in.
//! Grounded on `arki/dataset/targetfile.cc`'s per-step `operator()` and
//! `reftimeForPath` pair — one builds the path forward from a reftime, the
//! other recovers a segment's covered span from its path for maintenance's
//! "does this segment's data agree with where `step` put it" checks.

use crate::error::Error;
use crate::types::time::Time;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Step {
    Yearly,
    Monthly,
    Biweekly,
    Weekly,
    Daily,
    Singlefile,
}

impl Step {
    pub fn parse(name: &str) -> crate::Result<Self> {
        Ok(match name {
            "yearly" => Step::Yearly,
            "monthly" => Step::Monthly,
            "biweekly" => Step::Biweekly,
            "weekly" => Step::Weekly,
            "daily" => Step::Daily,
            "singlefile" => Step::Singlefile,
            other => {
                return Err(Error::Config(format!(
                    "step '{other}' is not supported; valid values are yearly, monthly, biweekly, weekly, daily, singlefile"
                )))
            }
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Yearly => "yearly",
            Step::Monthly => "monthly",
            Step::Biweekly => "biweekly",
            Step::Weekly => "weekly",
            Step::Daily => "daily",
            Step::Singlefile => "singlefile",
        }
    }

    /// Whether this step's reftime→path mapping is total and injective
    /// (spec §3); `singlefile` is neither, since several reftimes can share
    /// the same hour bucket and the distinguishing counter carries no
    /// reftime information back out of a path.
    #[must_use]
    pub fn is_injective(&self) -> bool {
        !matches!(self, Step::Singlefile)
    }

    /// Builds the segment-relative path for `reftime` under this step.
    /// `dataset_root` is only consulted for `singlefile`'s persistent
    /// counter.
    pub fn relpath(&self, reftime: &Time, format: &str, dataset_root: &Path) -> crate::Result<PathBuf> {
        if reftime.is_now() {
            return Err(Error::Config("cannot place data with the \"now\" sentinel reftime".to_string()));
        }
        let Time { year, month, day, hour, .. } = *reftime;
        let rel = match self {
            Step::Yearly => format!("{:02}/{year:04}.{format}", year / 100),
            Step::Monthly => format!("{year:04}/{month:02}.{format}"),
            Step::Biweekly => {
                let half = if day <= 14 { 1 } else { 2 };
                format!("{year:04}/{month:02}-{half}.{format}")
            }
            Step::Weekly => {
                let week = ((day - 1) / 7) + 1;
                format!("{year:04}/{month:02}-{week}.{format}")
            }
            Step::Daily => format!("{year:04}/{month:02}-{day:02}.{format}"),
            Step::Singlefile => {
                let counter = next_singlefile_counter(dataset_root)?;
                format!("{year:04}/{month:02}/{day:02}/{hour:02}/{counter}.{format}")
            }
        };
        Ok(PathBuf::from(rel))
    }

    /// Recovers the `[min, max]` reftime span a segment at `relpath`
    /// covers, by construction of this step's path format. Returns `None`
    /// if `relpath` doesn't parse under this step, or if this step isn't
    /// injective (spec §3, used by invariant 6's overlap check).
    #[must_use]
    pub fn span_for_path(&self, relpath: &str) -> Option<(Time, Time)> {
        if !self.is_injective() {
            return None;
        }
        let stem = relpath.rsplit_once('.').map_or(relpath, |(stem, _)| stem);
        match self {
            Step::Yearly => {
                let (_, year) = stem.split_once('/')?;
                let year: u16 = year.parse().ok()?;
                Some((Time::new(year, 1, 1, 0, 0, 0).ok()?, Time::new(year, 12, days_in_month(year, 12), 23, 59, 59).ok()?))
            }
            Step::Monthly => {
                let (year, month) = stem.split_once('/')?;
                let year: u16 = year.parse().ok()?;
                let month: u8 = month.parse().ok()?;
                let last_day = days_in_month(year, month);
                Some((
                    Time::new(year, month, 1, 0, 0, 0).ok()?,
                    Time::new(year, month, last_day, 23, 59, 59).ok()?,
                ))
            }
            Step::Biweekly => {
                let (year, rest) = stem.split_once('/')?;
                let (month, half) = rest.split_once('-')?;
                let year: u16 = year.parse().ok()?;
                let month: u8 = month.parse().ok()?;
                let half: u8 = half.parse().ok()?;
                let (start, end) = match half {
                    1 => (1, 14),
                    2 => (15, days_in_month(year, month)),
                    _ => return None,
                };
                Some((
                    Time::new(year, month, start, 0, 0, 0).ok()?,
                    Time::new(year, month, end, 23, 59, 59).ok()?,
                ))
            }
            Step::Weekly => {
                let (year, rest) = stem.split_once('/')?;
                let (month, week) = rest.split_once('-')?;
                let year: u16 = year.parse().ok()?;
                let month: u8 = month.parse().ok()?;
                let week: u8 = week.parse().ok()?;
                let start = (week - 1) * 7 + 1;
                let end = (start + 6).min(days_in_month(year, month));
                Some((
                    Time::new(year, month, start, 0, 0, 0).ok()?,
                    Time::new(year, month, end, 23, 59, 59).ok()?,
                ))
            }
            Step::Daily => {
                let (year, rest) = stem.split_once('/')?;
                let (month, day) = rest.split_once('-')?;
                let year: u16 = year.parse().ok()?;
                let month: u8 = month.parse().ok()?;
                let day: u8 = day.parse().ok()?;
                Some((Time::new(year, month, day, 0, 0, 0).ok()?, Time::new(year, month, day, 23, 59, 59).ok()?))
            }
            Step::Singlefile => None,
        }
    }
}

#[must_use]
pub fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 30,
    }
}

#[must_use]
fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Reads, increments, and persists the dataset's singlefile counter.
/// Deliberately not fsynced: a crash losing the last few increments only
/// costs a handful of counter values, never a collision within one
/// process's lifetime, and the per-hour directory bucket keeps collisions
/// across processes astronomically unlikely regardless.
fn next_singlefile_counter(dataset_root: &Path) -> crate::Result<u64> {
    let path = dataset_root.join(crate::file::SINGLEFILE_COUNTER_FILE);
    let current = match std::fs::read(&path) {
        Ok(bytes) if bytes.len() == 8 => u64::from_be_bytes(bytes.try_into().unwrap()),
        Ok(_) | Err(_) => 0,
    };
    let next = current + 1;
    std::fs::write(&path, next.to_be_bytes())?;
    Ok(next)
}
