//! The `value` attribute: an opaque per-format payload (e.g. a VM2 station
//! reading encoded as `key=val,key=val`). Participates in uniqueness but is
//! never indexed in its own column (spec §4.3).

use crate::coding::{read_length_prefixed, write_length_prefixed, Decode, Encode};
use crate::error::Error;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Value(pub String);

impl Encode for Value {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        write_length_prefixed(writer, self.0.as_bytes())
    }
}

impl Decode for Value {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let bytes = read_length_prefixed(reader, 1 << 16)?;
        Ok(Value(
            String::from_utf8(bytes).map_err(|e| Error::MalformedInput(e.to_string()))?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let value = Value("158,12.5,254".to_string());
        let bytes = value.encode().unwrap();
        assert_eq!(Value::decode_from(&mut &bytes[..]).unwrap(), value);
    }
}
