//! Shared key-value-bag shape underlying `area` and `proddef`: a sorted bag
//! of tagged scalars (int or string) used by scanners to attach
//! format-specific identifiers (spec §4.3).

use crate::coding::{read_length_prefixed, write_length_prefixed, Decode, Encode};
use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Int(i64),
    Text(String),
}

/// A sorted `key -> scalar` bag. `BTreeMap` gives both the total order the
/// spec requires and a stable iteration order for encoding, with no
/// separate sort step.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
pub struct KvBag(pub BTreeMap<String, ScalarValue>);

impl KvBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_int(&mut self, key: impl Into<String>, value: i64) {
        self.0.insert(key.into(), ScalarValue::Int(value));
    }

    pub fn insert_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), ScalarValue::Text(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.0.get(key)
    }
}

impl Encode for KvBag {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        writer.write_u32::<BigEndian>(self.0.len() as u32)?;
        for (key, value) in &self.0 {
            write_length_prefixed(writer, key.as_bytes())?;
            match value {
                ScalarValue::Int(v) => {
                    writer.write_u8(0)?;
                    writer.write_i64::<BigEndian>(*v)?;
                }
                ScalarValue::Text(v) => {
                    writer.write_u8(1)?;
                    write_length_prefixed(writer, v.as_bytes())?;
                }
            }
        }
        Ok(())
    }
}

impl Decode for KvBag {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let count = reader.read_u32::<BigEndian>()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = String::from_utf8(read_length_prefixed(reader, 4096)?)
                .map_err(|e| Error::MalformedInput(e.to_string()))?;
            let style = reader.read_u8()?;
            let value = match style {
                0 => ScalarValue::Int(reader.read_i64::<BigEndian>()?),
                1 => ScalarValue::Text(
                    String::from_utf8(read_length_prefixed(reader, 1 << 20)?)
                        .map_err(|e| Error::MalformedInput(e.to_string()))?,
                ),
                other => {
                    return Err(Error::MalformedInput(format!(
                        "unknown kvbag scalar style {other}"
                    )))
                }
            };
            map.insert(key, value);
        }
        Ok(KvBag(map))
    }
}
