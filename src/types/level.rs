//! The `level` attribute: a vertical level or layer.

use crate::coding::{Decode, Encode};
use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(tag = "style")]
pub enum Level {
    Grib1 {
        level_type: u8,
        l1: u16,
        l2: u16,
    },
    Grib2S {
        level_type: u8,
        scale: u8,
        value: i32,
    },
    Grib2Double {
        type1: u8,
        scale1: u8,
        value1: i32,
        type2: u8,
        scale2: u8,
        value2: i32,
    },
}

impl Encode for Level {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        match self {
            Level::Grib1 { level_type, l1, l2 } => {
                writer.write_u8(0)?;
                writer.write_u8(*level_type)?;
                writer.write_u16::<BigEndian>(*l1)?;
                writer.write_u16::<BigEndian>(*l2)?;
            }
            Level::Grib2S {
                level_type,
                scale,
                value,
            } => {
                writer.write_u8(1)?;
                writer.write_u8(*level_type)?;
                writer.write_u8(*scale)?;
                writer.write_i32::<BigEndian>(*value)?;
            }
            Level::Grib2Double {
                type1,
                scale1,
                value1,
                type2,
                scale2,
                value2,
            } => {
                writer.write_u8(2)?;
                writer.write_u8(*type1)?;
                writer.write_u8(*scale1)?;
                writer.write_i32::<BigEndian>(*value1)?;
                writer.write_u8(*type2)?;
                writer.write_u8(*scale2)?;
                writer.write_i32::<BigEndian>(*value2)?;
            }
        }
        Ok(())
    }
}

impl Decode for Level {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let style = reader.read_u8()?;
        match style {
            0 => Ok(Level::Grib1 {
                level_type: reader.read_u8()?,
                l1: reader.read_u16::<BigEndian>()?,
                l2: reader.read_u16::<BigEndian>()?,
            }),
            1 => Ok(Level::Grib2S {
                level_type: reader.read_u8()?,
                scale: reader.read_u8()?,
                value: reader.read_i32::<BigEndian>()?,
            }),
            2 => Ok(Level::Grib2Double {
                type1: reader.read_u8()?,
                scale1: reader.read_u8()?,
                value1: reader.read_i32::<BigEndian>()?,
                type2: reader.read_u8()?,
                scale2: reader.read_u8()?,
                value2: reader.read_i32::<BigEndian>()?,
            }),
            other => Err(Error::MalformedInput(format!("unknown level style {other}"))),
        }
    }
}
