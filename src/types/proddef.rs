//! The `proddef` attribute: format-specific product definition, also a
//! key-value bag (spec §4.3).

use crate::coding::{Decode, Encode};
use crate::types::kvbag::KvBag;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
pub struct Proddef(pub KvBag);

impl Proddef {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encode for Proddef {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        self.0.encode_into(writer)
    }
}

impl Decode for Proddef {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        Ok(Proddef(KvBag::decode_from(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_kvbag() {
        let mut proddef = Proddef::new();
        proddef.0.insert_text("tod", "0");

        let bytes = proddef.encode().unwrap();
        assert_eq!(Proddef::decode_from(&mut &bytes[..]).unwrap(), proddef);
    }
}
