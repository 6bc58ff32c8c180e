//! The `assigned_dataset` attribute: records which dataset a metadata
//! record was dispatched into, stamped by the writer so a byproduct such as
//! an error or duplicate copy can be traced back to its intended home.

use crate::coding::{read_length_prefixed, write_length_prefixed, Decode, Encode};
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// `id` is the string form of the dataset's `unique` tuple (spec §4.10:
/// "An 'id' is the string form of the unique tuple") — stable across
/// repacks and rescans as long as the unique attributes themselves don't
/// change, unlike a row id that's reassigned every time a segment is
/// rewritten.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct AssignedDataset {
    pub name: String,
    pub id: String,
}

impl Encode for AssignedDataset {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        write_length_prefixed(writer, self.name.as_bytes())?;
        write_length_prefixed(writer, self.id.as_bytes())?;
        Ok(())
    }
}

impl Decode for AssignedDataset {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let name = String::from_utf8(read_length_prefixed(reader, 256)?)
            .map_err(|e| Error::MalformedInput(e.to_string()))?;
        let id = String::from_utf8(read_length_prefixed(reader, 4096)?)
            .map_err(|e| Error::MalformedInput(e.to_string()))?;
        Ok(AssignedDataset { name, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let assigned = AssignedDataset {
            name: "error".to_string(),
            id: "42".to_string(),
        };
        let bytes = assigned.encode().unwrap();
        assert_eq!(AssignedDataset::decode_from(&mut &bytes[..]).unwrap(), assigned);
    }
}
