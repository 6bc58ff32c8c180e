//! The typed attribute system (spec §3, §4.3): a closed, versioned
//! enumeration of attribute codes, one Rust type per code, and a generic
//! ordered attribute-set container (`ItemSet`) that `Metadata` builds on.
//!
//! Grounded on `arki/itemset.h`/`itemset.cc`: the original factors out a
//! single `ItemSet` base that both `Metadata` and `Summary` keys extend,
//! rather than duplicating the "canonicalised ordered attribute vector"
//! logic in each. We keep that factoring here.

pub mod area;
pub mod arena;
pub mod assigned_dataset;
pub mod kvbag;
pub mod level;
pub mod note;
pub mod origin;
pub mod product;
pub mod proddef;
pub mod quantity;
pub mod reftime;
pub mod run;
pub mod source;
pub mod summary_item;
pub mod summary_stats;
pub mod time;
pub mod timerange;
pub mod value;

use crate::coding::{Decode, Encode};
use crate::error::Error;
use area::Area;
use assigned_dataset::AssignedDataset;
use byteorder::ReadBytesExt;
use level::Level;
use note::NoteLog;
use origin::Origin;
use product::Product;
use proddef::Proddef;
use quantity::Quantity;
use reftime::Reftime;
use run::{Run, Task};
use source::Source;
use std::cmp::Ordering;
use summary_item::SummaryItem;
use summary_stats::SummaryStats;
use time::Time;
use timerange::Timerange;
use value::Value;

/// The closed, versioned set of attribute codes (spec §3). Ordering here
/// doubles as the canonical lexicographic comparison order for a record's
/// attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum Code {
    Origin = 0,
    Product = 1,
    Level = 2,
    Timerange = 3,
    Area = 4,
    Proddef = 5,
    Reftime = 6,
    Source = 7,
    Run = 8,
    Task = 9,
    Quantity = 10,
    Value = 11,
    AssignedDataset = 12,
    Note = 13,
    SummaryItem = 14,
    SummaryStats = 15,
}

impl Code {
    #[must_use]
    pub fn from_u8(byte: u8) -> crate::Result<Self> {
        Ok(match byte {
            0 => Code::Origin,
            1 => Code::Product,
            2 => Code::Level,
            3 => Code::Timerange,
            4 => Code::Area,
            5 => Code::Proddef,
            6 => Code::Reftime,
            7 => Code::Source,
            8 => Code::Run,
            9 => Code::Task,
            10 => Code::Quantity,
            11 => Code::Value,
            12 => Code::AssignedDataset,
            13 => Code::Note,
            14 => Code::SummaryItem,
            15 => Code::SummaryStats,
            other => return Err(Error::MalformedInput(format!("unknown attribute code {other}"))),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Origin => "origin",
            Code::Product => "product",
            Code::Level => "level",
            Code::Timerange => "timerange",
            Code::Area => "area",
            Code::Proddef => "proddef",
            Code::Reftime => "reftime",
            Code::Source => "source",
            Code::Run => "run",
            Code::Task => "task",
            Code::Quantity => "quantity",
            Code::Value => "value",
            Code::AssignedDataset => "assigned-dataset",
            Code::Note => "note",
            Code::SummaryItem => "summary-item",
            Code::SummaryStats => "summary-stats",
        }
    }

    /// Parses a code's lowercase name, as written in a dataset's `index`/
    /// `unique` config lines.
    pub fn from_name(name: &str) -> crate::Result<Self> {
        Ok(match name {
            "origin" => Code::Origin,
            "product" => Code::Product,
            "level" => Code::Level,
            "timerange" => Code::Timerange,
            "area" => Code::Area,
            "proddef" => Code::Proddef,
            "reftime" => Code::Reftime,
            "source" => Code::Source,
            "run" => Code::Run,
            "task" => Code::Task,
            "quantity" => Code::Quantity,
            "value" => Code::Value,
            "assigned-dataset" => Code::AssignedDataset,
            "note" => Code::Note,
            "summary-item" => Code::SummaryItem,
            "summary-stats" => Code::SummaryStats,
            other => return Err(Error::MalformedInput(format!("unknown attribute code name {other:?}"))),
        })
    }
}

/// A tagged value for any recognised attribute code, with unified
/// encode/decode/ordering dispatch. `Note` is intentionally absent: notes
/// are an ordered append-only sub-sequence, not a canonicalised attribute
/// (spec §3), and live in `Metadata::notes` instead of the item set.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Attr {
    Origin(Origin),
    Product(Product),
    Level(Level),
    Timerange(Timerange),
    Area(Area),
    Proddef(Proddef),
    Reftime(Reftime),
    Source(Source),
    Run(Run),
    Task(Task),
    Quantity(Quantity),
    Value(Value),
    AssignedDataset(AssignedDataset),
    SummaryItem(SummaryItem),
    SummaryStats(SummaryStats),
}

impl Attr {
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            Attr::Origin(_) => Code::Origin,
            Attr::Product(_) => Code::Product,
            Attr::Level(_) => Code::Level,
            Attr::Timerange(_) => Code::Timerange,
            Attr::Area(_) => Code::Area,
            Attr::Proddef(_) => Code::Proddef,
            Attr::Reftime(_) => Code::Reftime,
            Attr::Source(_) => Code::Source,
            Attr::Run(_) => Code::Run,
            Attr::Task(_) => Code::Task,
            Attr::Quantity(_) => Code::Quantity,
            Attr::Value(_) => Code::Value,
            Attr::AssignedDataset(_) => Code::AssignedDataset,
            Attr::SummaryItem(_) => Code::SummaryItem,
            Attr::SummaryStats(_) => Code::SummaryStats,
        }
    }

    pub fn encode_value<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        match self {
            Attr::Origin(v) => v.encode_into(writer),
            Attr::Product(v) => v.encode_into(writer),
            Attr::Level(v) => v.encode_into(writer),
            Attr::Timerange(v) => v.encode_into(writer),
            Attr::Area(v) => v.encode_into(writer),
            Attr::Proddef(v) => v.encode_into(writer),
            Attr::Reftime(v) => v.encode_into(writer),
            Attr::Source(v) => v.encode_into(writer),
            Attr::Run(v) => v.encode_into(writer),
            Attr::Task(v) => v.encode_into(writer),
            Attr::Quantity(v) => v.encode_into(writer),
            Attr::Value(v) => v.encode_into(writer),
            Attr::AssignedDataset(v) => v.encode_into(writer),
            Attr::SummaryItem(v) => v.encode_into(writer),
            Attr::SummaryStats(v) => v.encode_into(writer),
        }
    }

    pub fn decode_value<R: std::io::Read>(code: Code, reader: &mut R) -> crate::Result<Self> {
        Ok(match code {
            Code::Origin => Attr::Origin(Origin::decode_from(reader)?),
            Code::Product => Attr::Product(Product::decode_from(reader)?),
            Code::Level => Attr::Level(Level::decode_from(reader)?),
            Code::Timerange => Attr::Timerange(Timerange::decode_from(reader)?),
            Code::Area => Attr::Area(Area::decode_from(reader)?),
            Code::Proddef => Attr::Proddef(Proddef::decode_from(reader)?),
            Code::Reftime => Attr::Reftime(Reftime::decode_from(reader)?),
            Code::Source => Attr::Source(Source::decode_from(reader)?),
            Code::Run => Attr::Run(Run::decode_from(reader)?),
            Code::Task => Attr::Task(Task::decode_from(reader)?),
            Code::Quantity => Attr::Quantity(Quantity::decode_from(reader)?),
            Code::Value => Attr::Value(Value::decode_from(reader)?),
            Code::AssignedDataset => Attr::AssignedDataset(AssignedDataset::decode_from(reader)?),
            Code::SummaryItem => Attr::SummaryItem(SummaryItem::decode_from(reader)?),
            Code::SummaryStats => Attr::SummaryStats(SummaryStats::decode_from(reader)?),
            Code::Note => {
                return Err(Error::MalformedInput(
                    "note is not a canonicalised attribute".to_string(),
                ))
            }
        })
    }
}

impl Encode for Attr {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        writer.write_all(&[self.code() as u8])?;
        self.encode_value(writer)
    }
}

impl Decode for Attr {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let code = Code::from_u8(reader.read_u8()?)?;
        Attr::decode_value(code, reader)
    }
}

/// Orders two attributes of the same code by comparing their encoded
/// bytes, since the per-type `Ord` impls are not object-safe behind the
/// `Attr` enum's dynamic dispatch. Matches the spec's "total and stable
/// across process runs" contract: encoding is deterministic, so byte
/// comparison agrees with the type's own field-order comparison.
fn compare_same_code(a: &Attr, b: &Attr) -> Ordering {
    let a_bytes = a.encode_value(&mut Vec::new()).ok();
    let b_bytes = b.encode_value(&mut Vec::new()).ok();
    match (a_bytes, b_bytes) {
        (Some(_), Some(_)) => {
            let mut ab = Vec::new();
            let mut bb = Vec::new();
            let _ = a.encode_value(&mut ab);
            let _ = b.encode_value(&mut bb);
            ab.cmp(&bb)
        }
        _ => Ordering::Equal,
    }
}

/// An ordered, canonicalised set of attributes keyed by code: at most one
/// value per code, duplicates on `set` replace rather than accumulate
/// (spec §3's "attribute sets are canonicalised"). Backs both `Metadata`
/// and `SummaryItem`'s construction, per `arki/itemset.h`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ItemSet {
    items: Vec<Attr>,
}

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, attr: Attr) {
        let code = attr.code();
        match self.items.binary_search_by_key(&code, Attr::code) {
            Ok(idx) => self.items[idx] = attr,
            Err(idx) => self.items.insert(idx, attr),
        }
    }

    pub fn unset(&mut self, code: Code) -> Option<Attr> {
        match self.items.binary_search_by_key(&code, Attr::code) {
            Ok(idx) => Some(self.items.remove(idx)),
            Err(_) => None,
        }
    }

    #[must_use]
    pub fn get(&self, code: Code) -> Option<&Attr> {
        self.items.binary_search_by_key(&code, Attr::code).ok().map(|idx| &self.items[idx])
    }

    #[must_use]
    pub fn has(&self, code: Code) -> bool {
        self.get(code).is_some()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attr> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Eq for ItemSet {}

impl Ord for ItemSet {
    /// Lexicographic across attributes ordered by code (spec §3).
    fn cmp(&self, other: &Self) -> Ordering {
        let mut a = self.items.iter();
        let mut b = other.items.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(x), Some(y)) => {
                    let by_code = x.code().cmp(&y.code());
                    if by_code != Ordering::Equal {
                        return by_code;
                    }
                    let by_value = compare_same_code(x, y);
                    if by_value != Ordering::Equal {
                        return by_value;
                    }
                }
            }
        }
    }
}

impl PartialOrd for ItemSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Encode for ItemSet {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        use byteorder::{BigEndian, WriteBytesExt};
        writer.write_u16::<BigEndian>(self.items.len() as u16)?;
        for attr in &self.items {
            attr.encode_into(writer)?;
        }
        Ok(())
    }
}

impl Decode for ItemSet {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        use byteorder::{BigEndian, ReadBytesExt};
        let count = reader.read_u16::<BigEndian>()?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(Attr::decode_from(reader)?);
        }
        Ok(ItemSet { items })
    }
}
