//! The `origin` attribute: which centre/process produced a message.

use crate::coding::{read_length_prefixed, write_length_prefixed, Decode, Encode};
use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(tag = "style")]
pub enum Origin {
    Grib1 {
        centre: u8,
        subcentre: u8,
        process: u8,
    },
    Grib2 {
        centre: u16,
        subcentre: u16,
        process_type: u8,
        background_process: u8,
        process: u8,
    },
    Bufr {
        centre: u16,
        subcentre: u16,
    },
}

impl Encode for Origin {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        match self {
            Origin::Grib1 {
                centre,
                subcentre,
                process,
            } => {
                writer.write_u8(0)?;
                writer.write_u8(*centre)?;
                writer.write_u8(*subcentre)?;
                writer.write_u8(*process)?;
            }
            Origin::Grib2 {
                centre,
                subcentre,
                process_type,
                background_process,
                process,
            } => {
                writer.write_u8(1)?;
                writer.write_u16::<BigEndian>(*centre)?;
                writer.write_u16::<BigEndian>(*subcentre)?;
                writer.write_u8(*process_type)?;
                writer.write_u8(*background_process)?;
                writer.write_u8(*process)?;
            }
            Origin::Bufr { centre, subcentre } => {
                writer.write_u8(2)?;
                writer.write_u16::<BigEndian>(*centre)?;
                writer.write_u16::<BigEndian>(*subcentre)?;
            }
        }
        Ok(())
    }
}

impl Decode for Origin {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let style = reader.read_u8()?;
        match style {
            0 => Ok(Origin::Grib1 {
                centre: reader.read_u8()?,
                subcentre: reader.read_u8()?,
                process: reader.read_u8()?,
            }),
            1 => Ok(Origin::Grib2 {
                centre: reader.read_u16::<BigEndian>()?,
                subcentre: reader.read_u16::<BigEndian>()?,
                process_type: reader.read_u8()?,
                background_process: reader.read_u8()?,
                process: reader.read_u8()?,
            }),
            2 => Ok(Origin::Bufr {
                centre: reader.read_u16::<BigEndian>()?,
                subcentre: reader.read_u16::<BigEndian>()?,
            }),
            other => Err(Error::MalformedInput(format!("unknown origin style {other}"))),
        }
    }
}

impl Origin {
    /// The matcher's textual form, e.g. `GRIB1,200` — used by `split` when
    /// resolving an OR-list against the interning table (spec §6.3).
    #[must_use]
    pub fn matcher_key(&self) -> String {
        match self {
            Origin::Grib1 {
                centre,
                subcentre,
                process,
            } => format!("GRIB1,{centre},{subcentre},{process}"),
            Origin::Grib2 {
                centre,
                subcentre,
                process_type,
                background_process,
                process,
            } => format!("GRIB2,{centre},{subcentre},{process_type},{background_process},{process}"),
            Origin::Bufr { centre, subcentre } => format!("BUFR,{centre},{subcentre}"),
        }
    }

    pub fn write_matcher_key<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        write_length_prefixed(writer, self.matcher_key().as_bytes())
    }

    pub fn read_matcher_key<R: std::io::Read>(reader: &mut R) -> crate::Result<String> {
        let bytes = read_length_prefixed(reader, 4096)?;
        String::from_utf8(bytes).map_err(|e| Error::MalformedInput(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_style() {
        let samples = [
            Origin::Grib1 {
                centre: 200,
                subcentre: 0,
                process: 0,
            },
            Origin::Grib2 {
                centre: 98,
                subcentre: 0,
                process_type: 0,
                background_process: 0,
                process: 0,
            },
            Origin::Bufr {
                centre: 80,
                subcentre: 255,
            },
        ];
        for sample in samples {
            let bytes = sample.encode().unwrap();
            assert_eq!(Origin::decode_from(&mut &bytes[..]).unwrap(), sample);
        }
    }

    #[test]
    fn matcher_key_matches_s1_fixture_shape() {
        let origin = Origin::Grib1 {
            centre: 200,
            subcentre: 0,
            process: 0,
        };
        assert_eq!(origin.matcher_key(), "GRIB1,200,0,0");
    }
}
