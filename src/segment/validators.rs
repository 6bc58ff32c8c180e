//! Format validators (spec §4.9): signature checks used by `check` and by
//! writers to reject malformed appends before they ever touch a segment.

use crate::error::Error;

const HDF5_MAGIC: &[u8] = &[0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// Recognised message formats, one validator per format (spec §4.9).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Format {
    Grib,
    Bufr,
    Hdf5,
    Vm2,
}

impl Format {
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "grib" => Some(Format::Grib),
            "bufr" => Some(Format::Bufr),
            "h5" | "odimh5" | "hdf5" => Some(Format::Hdf5),
            "vm2" => Some(Format::Vm2),
            _ => None,
        }
    }
}

/// Validates `bytes` as a well-formed message of `format`, per the
/// signature rules in spec §4.9. Returns `DataCorrupt` naming `context`
/// (typically the segment path and offset) on rejection.
pub fn validate(format: Format, bytes: &[u8], context: &str) -> crate::Result<()> {
    let ok = match format {
        Format::Grib => bytes.starts_with(b"GRIB") && bytes.ends_with(b"7777"),
        Format::Bufr => bytes.starts_with(b"BUFR") && bytes.ends_with(b"7777"),
        Format::Hdf5 => bytes.starts_with(HDF5_MAGIC),
        Format::Vm2 => bytes.ends_with(b"\n") && bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ' || *b == b'\n'),
    };

    if ok {
        Ok(())
    } else {
        Err(Error::DataCorrupt {
            path: context.to_string(),
            reason: format!("message does not match the {format:?} signature"),
        })
    }
}
