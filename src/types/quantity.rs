//! The `quantity` attribute: an ordered set of VM2-style numeric quantity
//! codes (e.g. measured variables in a multi-sensor station record).

use crate::coding::{Decode, Encode};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
pub struct Quantity(pub BTreeSet<u32>);

impl Quantity {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encode for Quantity {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        writer.write_u32::<BigEndian>(self.0.len() as u32)?;
        for code in &self.0 {
            writer.write_u32::<BigEndian>(*code)?;
        }
        Ok(())
    }
}

impl Decode for Quantity {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let count = reader.read_u32::<BigEndian>()?;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            set.insert(reader.read_u32::<BigEndian>()?);
        }
        Ok(Quantity(set))
    }
}
