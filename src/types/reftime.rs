//! The `reftime` attribute: an instant or a closed interval (spec §4.3).

use super::time::Time;
use crate::coding::{Decode, Encode};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style")]
pub enum Reftime {
    /// A single instant.
    Position(Time),
    /// A closed `[begin, end]` interval.
    Period(Time, Time),
}

impl Reftime {
    /// The instant used for segment-path mapping and manifest pruning: the
    /// period's begin for a `Period`, or the instant itself.
    #[must_use]
    pub fn representative(&self) -> Time {
        match self {
            Reftime::Position(t) => *t,
            Reftime::Period(begin, _) => *begin,
        }
    }

    #[must_use]
    pub fn span(&self) -> (Time, Time) {
        match self {
            Reftime::Position(t) => (*t, *t),
            Reftime::Period(begin, end) => (*begin, *end),
        }
    }
}

impl Ord for Reftime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.span().cmp(&other.span())
    }
}

impl PartialOrd for Reftime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Encode for Reftime {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        match self {
            Reftime::Position(t) => {
                writer.write_all(&[0])?;
                t.encode_into(writer)
            }
            Reftime::Period(begin, end) => {
                writer.write_all(&[1])?;
                begin.encode_into(writer)?;
                end.encode_into(writer)
            }
        }
    }
}

impl Decode for Reftime {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let mut style = [0u8; 1];
        reader.read_exact(&mut style)?;
        match style[0] {
            0 => Ok(Reftime::Position(Time::decode_from(reader)?)),
            1 => {
                let begin = Time::decode_from(reader)?;
                let end = Time::decode_from(reader)?;
                Ok(Reftime::Period(begin, end))
            }
            other => Err(Error::MalformedInput(format!(
                "unknown reftime style {other}"
            ))),
        }
    }
}

/// A running `(min, max)` bound over reftime values merged into it,
/// used by the summary engine's leaf stats (spec §4.7) and by the manifest
/// when computing a segment's span.
#[derive(Copy, Clone, Debug, Default)]
pub struct PeriodMerger {
    span: Option<(Time, Time)>,
}

impl PeriodMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, reftime: &Reftime) {
        let (begin, end) = reftime.span();
        self.span = Some(match self.span {
            None => (begin, end),
            Some((min, max)) => (min.min(begin), max.max(end)),
        });
    }

    #[must_use]
    pub fn span(&self) -> Option<(Time, Time)> {
        self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_merger_widens_to_cover_all_inputs() {
        let mut merger = PeriodMerger::new();
        merger.merge(&Reftime::Position(Time::new(2007, 7, 8, 0, 0, 0).unwrap()));
        merger.merge(&Reftime::Position(Time::new(2007, 10, 9, 0, 0, 0).unwrap()));
        merger.merge(&Reftime::Position(Time::new(2007, 7, 7, 0, 0, 0).unwrap()));

        let (min, max) = merger.span().unwrap();
        assert_eq!(min, Time::new(2007, 7, 7, 0, 0, 0).unwrap());
        assert_eq!(max, Time::new(2007, 10, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn encode_decode_round_trips_both_styles() {
        let position = Reftime::Position(Time::new(2007, 7, 8, 0, 0, 0).unwrap());
        let bytes = position.encode().unwrap();
        assert_eq!(Reftime::decode_from(&mut &bytes[..]).unwrap(), position);

        let period = Reftime::Period(
            Time::new(2007, 7, 7, 0, 0, 0).unwrap(),
            Time::new(2007, 7, 9, 0, 0, 0).unwrap(),
        );
        let bytes = period.encode().unwrap();
        assert_eq!(Reftime::decode_from(&mut &bytes[..]).unwrap(), period);
    }
}
