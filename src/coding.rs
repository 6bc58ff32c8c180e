//! Serialisation primitives shared by every framed object: the `Encode`/
//! `Decode` trait pair and the 7-bit little-endian variable-length integer
//! used for envelope lengths and string prefixes (spec §4.1).

use crate::error::Error;
use varint_rs::{VarintReader, VarintWriter};

/// A type that can write itself to a byte stream.
pub trait Encode {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()>;

    /// Convenience: encode into a fresh `Vec<u8>`.
    fn encode(&self) -> crate::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }
}

/// A type that can read itself back from a byte stream written by its
/// `Encode` counterpart.
pub trait Decode: Sized {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self>;
}

/// Reads a 7-bit little-endian group varint (high bit = continuation).
pub fn read_uvarint<R: std::io::Read>(reader: &mut R) -> crate::Result<u64> {
    reader
        .read_u64_varint()
        .map_err(|e| Error::MalformedInput(format!("bad varint: {e}")))
}

/// Writes a 7-bit little-endian group varint.
pub fn write_uvarint<W: std::io::Write>(writer: &mut W, value: u64) -> crate::Result<()> {
    writer
        .write_u64_varint(value)
        .map_err(|e| Error::MalformedInput(format!("cannot write varint: {e}")))
}

/// Writes a length-prefixed (varint length, then raw bytes) string/blob,
/// the shape used for all variable-length string fields inside payloads.
pub fn write_length_prefixed<W: std::io::Write>(writer: &mut W, bytes: &[u8]) -> crate::Result<()> {
    write_uvarint(writer, bytes.len() as u64)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Reads a length-prefixed string/blob written by [`write_length_prefixed`].
///
/// Rejects a claimed length that exceeds `max_len`, guarding against a
/// corrupt or malicious varint turning a small buffer into an enormous
/// allocation.
pub fn read_length_prefixed<R: std::io::Read>(
    reader: &mut R,
    max_len: usize,
) -> crate::Result<Vec<u8>> {
    let len = read_uvarint(reader)? as usize;
    if len > max_len {
        return Err(Error::MalformedInput(format!(
            "length-prefixed field claims {len} bytes, exceeding the {max_len} cap"
        )));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
