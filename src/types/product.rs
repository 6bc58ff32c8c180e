//! The `product` attribute: which physical quantity a message carries.

use crate::coding::{Decode, Encode};
use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(tag = "style")]
pub enum Product {
    Grib1 {
        origin: u8,
        table: u8,
        product: u8,
    },
    Grib2 {
        centre: u16,
        discipline: u8,
        category: u8,
        number: u8,
    },
    Bufr {
        data_type: u8,
        subtype: u8,
        local_subtype: u8,
        name: String,
    },
    Vm2 {
        variable_id: u32,
    },
}

impl Encode for Product {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        match self {
            Product::Grib1 { origin, table, product } => {
                writer.write_u8(0)?;
                writer.write_u8(*origin)?;
                writer.write_u8(*table)?;
                writer.write_u8(*product)?;
            }
            Product::Grib2 {
                centre,
                discipline,
                category,
                number,
            } => {
                writer.write_u8(1)?;
                writer.write_u16::<BigEndian>(*centre)?;
                writer.write_u8(*discipline)?;
                writer.write_u8(*category)?;
                writer.write_u8(*number)?;
            }
            Product::Bufr {
                data_type,
                subtype,
                local_subtype,
                name,
            } => {
                writer.write_u8(2)?;
                writer.write_u8(*data_type)?;
                writer.write_u8(*subtype)?;
                writer.write_u8(*local_subtype)?;
                crate::coding::write_length_prefixed(writer, name.as_bytes())?;
            }
            Product::Vm2 { variable_id } => {
                writer.write_u8(3)?;
                writer.write_u32::<BigEndian>(*variable_id)?;
            }
        }
        Ok(())
    }
}

impl Decode for Product {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let style = reader.read_u8()?;
        match style {
            0 => Ok(Product::Grib1 {
                origin: reader.read_u8()?,
                table: reader.read_u8()?,
                product: reader.read_u8()?,
            }),
            1 => Ok(Product::Grib2 {
                centre: reader.read_u16::<BigEndian>()?,
                discipline: reader.read_u8()?,
                category: reader.read_u8()?,
                number: reader.read_u8()?,
            }),
            2 => {
                let data_type = reader.read_u8()?;
                let subtype = reader.read_u8()?;
                let local_subtype = reader.read_u8()?;
                let name = String::from_utf8(crate::coding::read_length_prefixed(reader, 4096)?)
                    .map_err(|e| Error::MalformedInput(e.to_string()))?;
                Ok(Product::Bufr {
                    data_type,
                    subtype,
                    local_subtype,
                    name,
                })
            }
            3 => Ok(Product::Vm2 {
                variable_id: reader.read_u32::<BigEndian>()?,
            }),
            other => Err(Error::MalformedInput(format!("unknown product style {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_style() {
        let samples = [
            Product::Grib1 {
                origin: 200,
                table: 2,
                product: 11,
            },
            Product::Grib2 {
                centre: 98,
                discipline: 0,
                category: 0,
                number: 0,
            },
            Product::Bufr {
                data_type: 0,
                subtype: 1,
                local_subtype: 2,
                name: "synop".to_string(),
            },
            Product::Vm2 { variable_id: 158 },
        ];
        for sample in samples {
            let bytes = sample.encode().unwrap();
            assert_eq!(Product::decode_from(&mut &bytes[..]).unwrap(), sample);
        }
    }
}
