//! The `area` attribute: geographic extent, carried as a key-value bag
//! (spec §4.3) rather than a fixed schema since its shape varies by format.

use crate::coding::{Decode, Encode};
use crate::types::kvbag::KvBag;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
pub struct Area(pub KvBag);

impl Area {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encode for Area {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        self.0.encode_into(writer)
    }
}

impl Decode for Area {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        Ok(Area(KvBag::decode_from(reader)?))
    }
}
