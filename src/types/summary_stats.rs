//! `SummaryStats`: the leaf payload of the summary trie — `(count,
//! total_size, reftime_merger)` (spec §4.7).

use crate::coding::{Decode, Encode};
use crate::types::reftime::{PeriodMerger, Reftime};
use crate::types::time::Time;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

#[derive(Clone, Copy, Debug, Default)]
pub struct SummaryStats {
    pub count: u64,
    pub total_size: u64,
    reftime: PeriodMerger,
}

impl SummaryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, size: u64, reftime: &Reftime) {
        self.count += 1;
        self.total_size += size;
        self.reftime.merge(reftime);
    }

    pub fn merge(&mut self, other: &SummaryStats) {
        self.count += other.count;
        self.total_size += other.total_size;
        if let Some((min, max)) = other.reftime.span() {
            self.reftime.merge(&Reftime::Position(min));
            self.reftime.merge(&Reftime::Position(max));
        }
    }

    #[must_use]
    pub fn reftime_span(&self) -> Option<(Time, Time)> {
        self.reftime.span()
    }
}

impl PartialEq for SummaryStats {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.total_size == other.total_size && self.reftime_span() == other.reftime_span()
    }
}

impl Encode for SummaryStats {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        writer.write_u64::<BigEndian>(self.count)?;
        writer.write_u64::<BigEndian>(self.total_size)?;
        match self.reftime_span() {
            Some((begin, end)) => {
                writer.write_u8(1)?;
                begin.encode_into(writer)?;
                end.encode_into(writer)?;
            }
            None => writer.write_u8(0)?,
        }
        Ok(())
    }
}

impl Decode for SummaryStats {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let count = reader.read_u64::<BigEndian>()?;
        let total_size = reader.read_u64::<BigEndian>()?;
        let mut reftime = PeriodMerger::new();
        if reader.read_u8()? == 1 {
            let begin = Time::decode_from(reader)?;
            let end = Time::decode_from(reader)?;
            reftime.merge(&Reftime::Position(begin));
            reftime.merge(&Reftime::Position(end));
        }
        Ok(SummaryStats {
            count,
            total_size,
            reftime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_count_size_and_span() {
        let mut stats = SummaryStats::new();
        stats.add(100, &Reftime::Position(Time::new(2007, 7, 8, 0, 0, 0).unwrap()));
        stats.add(200, &Reftime::Position(Time::new(2007, 10, 9, 0, 0, 0).unwrap()));

        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_size, 300);
        let (min, max) = stats.reftime_span().unwrap();
        assert_eq!(min, Time::new(2007, 7, 8, 0, 0, 0).unwrap());
        assert_eq!(max, Time::new(2007, 10, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn merge_combines_two_leaves() {
        let mut a = SummaryStats::new();
        a.add(100, &Reftime::Position(Time::new(2007, 7, 8, 0, 0, 0).unwrap()));
        let mut b = SummaryStats::new();
        b.add(50, &Reftime::Position(Time::new(2007, 7, 9, 0, 0, 0).unwrap()));

        a.merge(&b);
        assert_eq!(a.count, 2);
        assert_eq!(a.total_size, 150);
    }

    #[test]
    fn round_trips_empty_and_populated() {
        let empty = SummaryStats::new();
        let bytes = empty.encode().unwrap();
        assert_eq!(SummaryStats::decode_from(&mut &bytes[..]).unwrap(), empty);

        let mut populated = SummaryStats::new();
        populated.add(10, &Reftime::Position(Time::new(2007, 1, 1, 0, 0, 0).unwrap()));
        let bytes = populated.encode().unwrap();
        assert_eq!(SummaryStats::decode_from(&mut &bytes[..]).unwrap(), populated);
    }
}
