//! The `source` attribute: exactly one per metadata record, naming where
//! its raw data lives (spec §4.3, §4.5).

use crate::coding::{read_length_prefixed, write_length_prefixed, Decode, Encode};
use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style")]
pub enum Source {
    /// A byte range within a segment file, resolved relative to the
    /// dataset's base path at read time.
    Blob {
        format: String,
        relpath: String,
        offset: u64,
        size: u64,
    },
    /// The raw data is carried alongside the metadata in memory, not yet
    /// committed to a segment.
    Inline { format: String, size: u64 },
    /// The raw data is fetched on demand from a remote URL.
    Url { format: String, url: String },
}

impl Source {
    #[must_use]
    pub fn format(&self) -> &str {
        match self {
            Source::Blob { format, .. } | Source::Inline { format, .. } | Source::Url { format, .. } => format,
        }
    }

    /// Re-anchors a `Blob` source to a new base path, used when a segment
    /// is repacked or moved to the archive (spec §5.5/§8 S4).
    #[must_use]
    pub fn with_relpath(&self, relpath: impl Into<String>) -> Source {
        match self {
            Source::Blob { format, offset, size, .. } => Source::Blob {
                format: format.clone(),
                relpath: relpath.into(),
                offset: *offset,
                size: *size,
            },
            other => other.clone(),
        }
    }
}

impl Encode for Source {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        match self {
            Source::Blob {
                format,
                relpath,
                offset,
                size,
            } => {
                writer.write_u8(0)?;
                write_length_prefixed(writer, format.as_bytes())?;
                write_length_prefixed(writer, relpath.as_bytes())?;
                writer.write_u64::<BigEndian>(*offset)?;
                writer.write_u64::<BigEndian>(*size)?;
            }
            Source::Inline { format, size } => {
                writer.write_u8(1)?;
                write_length_prefixed(writer, format.as_bytes())?;
                writer.write_u64::<BigEndian>(*size)?;
            }
            Source::Url { format, url } => {
                writer.write_u8(2)?;
                write_length_prefixed(writer, format.as_bytes())?;
                write_length_prefixed(writer, url.as_bytes())?;
            }
        }
        Ok(())
    }
}

impl Decode for Source {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let style = reader.read_u8()?;
        let read_string = |reader: &mut R, max: usize| -> crate::Result<String> {
            String::from_utf8(read_length_prefixed(reader, max)?)
                .map_err(|e| Error::MalformedInput(e.to_string()))
        };
        match style {
            0 => {
                let format = read_string(reader, 32)?;
                let relpath = read_string(reader, 4096)?;
                let offset = reader.read_u64::<BigEndian>()?;
                let size = reader.read_u64::<BigEndian>()?;
                Ok(Source::Blob {
                    format,
                    relpath,
                    offset,
                    size,
                })
            }
            1 => {
                let format = read_string(reader, 32)?;
                let size = reader.read_u64::<BigEndian>()?;
                Ok(Source::Inline { format, size })
            }
            2 => {
                let format = read_string(reader, 32)?;
                let url = read_string(reader, 4096)?;
                Ok(Source::Url { format, url })
            }
            other => Err(Error::MalformedInput(format!("unknown source style {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_style() {
        let samples = vec![
            Source::Blob {
                format: "grib".to_string(),
                relpath: "2007/07-08.grib".to_string(),
                offset: 100,
                size: 200,
            },
            Source::Inline {
                format: "grib".to_string(),
                size: 200,
            },
            Source::Url {
                format: "grib".to_string(),
                url: "http://example.invalid/data".to_string(),
            },
        ];
        for sample in samples {
            let bytes = sample.encode().unwrap();
            assert_eq!(Source::decode_from(&mut &bytes[..]).unwrap(), sample);
        }
    }

    #[test]
    fn with_relpath_only_rewrites_blob() {
        let blob = Source::Blob {
            format: "grib".to_string(),
            relpath: "old.grib".to_string(),
            offset: 0,
            size: 1,
        };
        let moved = blob.with_relpath("new.grib");
        assert!(matches!(moved, Source::Blob { ref relpath, .. } if relpath == "new.grib"));

        let inline = Source::Inline {
            format: "grib".to_string(),
            size: 1,
        };
        assert_eq!(inline.with_relpath("ignored"), inline);
    }
}
