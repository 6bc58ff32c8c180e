//! `SummaryItem`: the fixed-order attribute tuple that labels a path from
//! root to leaf in the summary trie (spec §4.7). Only the attributes that
//! are meaningful to summarise (origin, product, level, timerange, area,
//! proddef) participate; `reftime` is folded into the leaf stats instead of
//! the key, since every leaf already carries a `reftime_merger`.

use crate::coding::{Decode, Encode};
use crate::types::area::Area;
use crate::types::level::Level;
use crate::types::origin::Origin;
use crate::types::product::Product;
use crate::types::proddef::Proddef;
use crate::types::timerange::Timerange;
use byteorder::{ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

/// One slot of the tuple, in the fixed descent order the trie uses.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SummaryItem {
    pub origin: Option<Origin>,
    pub product: Option<Product>,
    pub level: Option<Level>,
    pub timerange: Option<Timerange>,
    pub area: Option<Area>,
    pub proddef: Option<Proddef>,
}

impl SummaryItem {
    pub fn empty() -> Self {
        SummaryItem {
            origin: None,
            product: None,
            level: None,
            timerange: None,
            area: None,
            proddef: None,
        }
    }
}

fn encode_option<T: Encode, W: std::io::Write>(writer: &mut W, value: &Option<T>) -> crate::Result<()> {
    match value {
        Some(v) => {
            writer.write_u8(1)?;
            v.encode_into(writer)
        }
        None => writer.write_u8(0).map_err(Into::into),
    }
}

fn decode_option<T: Decode, R: std::io::Read>(reader: &mut R) -> crate::Result<Option<T>> {
    match reader.read_u8()? {
        0 => Ok(None),
        _ => Ok(Some(T::decode_from(reader)?)),
    }
}

impl Encode for SummaryItem {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        encode_option(writer, &self.origin)?;
        encode_option(writer, &self.product)?;
        encode_option(writer, &self.level)?;
        encode_option(writer, &self.timerange)?;
        encode_option(writer, &self.area)?;
        encode_option(writer, &self.proddef)?;
        Ok(())
    }
}

impl Decode for SummaryItem {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        Ok(SummaryItem {
            origin: decode_option(reader)?,
            product: decode_option(reader)?,
            level: decode_option(reader)?,
            timerange: decode_option(reader)?,
            area: decode_option(reader)?,
            proddef: decode_option(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_partial_tuple() {
        let item = SummaryItem {
            origin: Some(Origin::Grib1 {
                centre: 200,
                subcentre: 0,
                process: 0,
            }),
            product: None,
            level: None,
            timerange: None,
            area: None,
            proddef: None,
        };
        let bytes = item.encode().unwrap();
        assert_eq!(SummaryItem::decode_from(&mut &bytes[..]).unwrap(), item);
    }

    #[test]
    fn empty_tuple_round_trips() {
        let item = SummaryItem::empty();
        let bytes = item.encode().unwrap();
        assert_eq!(SummaryItem::decode_from(&mut &bytes[..]).unwrap(), item);
    }
}
