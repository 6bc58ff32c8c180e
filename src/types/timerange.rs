//! The `timerange` attribute: forecast step / statistical processing window.

use crate::coding::{Decode, Encode};
use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(tag = "style")]
pub enum Timerange {
    Grib1 {
        proc_type: u8,
        unit: u8,
        p1: u32,
        p2: u32,
    },
    Grib2Timedef {
        step_type: u8,
        step_unit: u8,
        step_len: u32,
        stat_type: u8,
    },
    Bufr {
        value: i32,
        unit: u8,
    },
}

impl Encode for Timerange {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        match self {
            Timerange::Grib1 { proc_type, unit, p1, p2 } => {
                writer.write_u8(0)?;
                writer.write_u8(*proc_type)?;
                writer.write_u8(*unit)?;
                writer.write_u32::<BigEndian>(*p1)?;
                writer.write_u32::<BigEndian>(*p2)?;
            }
            Timerange::Grib2Timedef {
                step_type,
                step_unit,
                step_len,
                stat_type,
            } => {
                writer.write_u8(1)?;
                writer.write_u8(*step_type)?;
                writer.write_u8(*step_unit)?;
                writer.write_u32::<BigEndian>(*step_len)?;
                writer.write_u8(*stat_type)?;
            }
            Timerange::Bufr { value, unit } => {
                writer.write_u8(2)?;
                writer.write_i32::<BigEndian>(*value)?;
                writer.write_u8(*unit)?;
            }
        }
        Ok(())
    }
}

impl Decode for Timerange {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let style = reader.read_u8()?;
        match style {
            0 => Ok(Timerange::Grib1 {
                proc_type: reader.read_u8()?,
                unit: reader.read_u8()?,
                p1: reader.read_u32::<BigEndian>()?,
                p2: reader.read_u32::<BigEndian>()?,
            }),
            1 => Ok(Timerange::Grib2Timedef {
                step_type: reader.read_u8()?,
                step_unit: reader.read_u8()?,
                step_len: reader.read_u32::<BigEndian>()?,
                stat_type: reader.read_u8()?,
            }),
            2 => Ok(Timerange::Bufr {
                value: reader.read_i32::<BigEndian>()?,
                unit: reader.read_u8()?,
            }),
            other => Err(Error::MalformedInput(format!(
                "unknown timerange style {other}"
            ))),
        }
    }
}
