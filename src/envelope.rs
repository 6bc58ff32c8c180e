//! Envelope framing: `tag[2] | version:varint | length:varint | payload`
//! (spec §4.1, §6.2). Every persisted object — metadata, deleted-metadata
//! tombstones, summaries, metadata groups, and each attribute's own payload
//! — is framed this way.

use crate::coding::{read_uvarint, write_uvarint};
use crate::error::Error;
use crate::version::{FormatVersion, Tag};

/// The maximum payload length this crate is willing to allocate for in one
/// go. A `length` varint above this is treated as malformed input rather
/// than an honest request for a multi-gigabyte allocation.
pub const MAX_PAYLOAD_LEN: u64 = 1 << 30;

/// A decoded envelope: its tag, version, and the raw payload bytes.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub tag: Tag,
    pub version: FormatVersion,
    pub payload: Vec<u8>,
}

/// Writes `envelope(tag, version, length, payload)` to `writer`.
pub fn write_bundle<W: std::io::Write>(
    writer: &mut W,
    tag: Tag,
    version: FormatVersion,
    payload: &[u8],
) -> crate::Result<()> {
    writer.write_all(&tag.0)?;
    version.write_to(writer)?;
    write_uvarint(writer, payload.len() as u64)?;
    writer.write_all(payload)?;
    Ok(())
}

/// Reads one envelope from `reader`: the 2-byte tag, the varint version,
/// the varint length, then exactly `length` bytes of payload.
///
/// Fails with [`Error::MalformedInput`] if `length` would overrun a
/// sane bound, or if the version is higher than this build knows how to
/// decode for the given tag. Does **not** reject unknown tags itself —
/// tags are only "fatal" relative to a decoder table that doesn't have an
/// entry for them (spec §4.1); that check happens one layer up, where the
/// decoder table lives.
pub fn read_bundle<R: std::io::Read>(reader: &mut R) -> crate::Result<Bundle> {
    let mut tag_bytes = [0u8; 2];
    reader.read_exact(&mut tag_bytes)?;
    let tag = Tag(tag_bytes);

    let version = FormatVersion::read_from(reader)?;
    if !version.is_known_for(tag) {
        return Err(Error::MalformedInput(format!(
            "tag {tag} has version {} which is newer than the highest known version {}",
            version.0,
            tag.highest_known_version().0
        )));
    }

    let length = read_uvarint(reader)?;
    if length > MAX_PAYLOAD_LEN {
        return Err(Error::MalformedInput(format!(
            "envelope for tag {tag} claims {length} bytes of payload, exceeding the {MAX_PAYLOAD_LEN} byte cap"
        )));
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload)?;

    Ok(Bundle {
        tag,
        version,
        payload,
    })
}

/// Reads envelopes back-to-back from `reader` until EOF, invoking `visit`
/// for each one. Used to decode a `<seg>.metadata` sibling file and the
/// packed contents of an `MG` metadata group incrementally, without
/// materializing the whole stream in memory.
pub fn for_each_bundle<R: std::io::Read>(
    reader: &mut R,
    mut visit: impl FnMut(Bundle) -> crate::Result<()>,
) -> crate::Result<()> {
    loop {
        let mut probe = [0u8; 1];
        match reader.read(&mut probe)? {
            0 => return Ok(()),
            _ => {
                let mut chained = std::io::Cursor::new(probe).chain(&mut *reader);
                let bundle = read_bundle(&mut chained)?;
                visit(bundle)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_bundle() {
        let mut buf = Vec::new();
        write_bundle(&mut buf, Tag::METADATA, FormatVersion::V1, b"hello").unwrap();

        let mut cursor = &buf[..];
        let bundle = read_bundle(&mut cursor).unwrap();
        assert_eq!(bundle.tag, Tag::METADATA);
        assert_eq!(bundle.version, FormatVersion::V1);
        assert_eq!(bundle.payload, b"hello");
    }

    #[test]
    fn rejects_version_newer_than_known() {
        let mut buf = Vec::new();
        write_bundle(&mut buf, Tag::METADATA, FormatVersion(99), b"x").unwrap();
        let mut cursor = &buf[..];
        assert!(read_bundle(&mut cursor).is_err());
    }

    #[test]
    fn rejects_length_overrunning_cap() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&Tag::METADATA.0);
        FormatVersion::V0.write_to(&mut buf).unwrap();
        crate::coding::write_uvarint(&mut buf, MAX_PAYLOAD_LEN + 1).unwrap();
        let mut cursor = &buf[..];
        assert!(read_bundle(&mut cursor).is_err());
    }

    #[test]
    fn for_each_bundle_visits_sequence_and_stops_at_eof() {
        let mut buf = Vec::new();
        write_bundle(&mut buf, Tag::METADATA, FormatVersion::V1, b"a").unwrap();
        write_bundle(&mut buf, Tag::DELETED_METADATA, FormatVersion::V1, b"bb").unwrap();

        let mut seen = Vec::new();
        let mut cursor = &buf[..];
        for_each_bundle(&mut cursor, |bundle| {
            seen.push((bundle.tag, bundle.payload));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, b"a");
        assert_eq!(seen[1].1, b"bb");
    }
}
