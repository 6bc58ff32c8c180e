use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// A 2-character ASCII envelope tag (spec §4.1, §6.2).
///
/// Top-level tags are `MD` (metadata), `!D` (deleted metadata), `SU`
/// (summary), `MG` (metadata group); every attribute type also owns a tag
/// for its own framed payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Tag(pub [u8; 2]);

impl Tag {
    pub const METADATA: Tag = Tag(*b"MD");
    pub const DELETED_METADATA: Tag = Tag(*b"!D");
    pub const SUMMARY: Tag = Tag(*b"SU");
    pub const METADATA_GROUP: Tag = Tag(*b"MG");

    /// The highest version this crate knows how to decode for a tag.
    ///
    /// Readers accept any version `<=` this and reject higher ones
    /// (spec §6.2): an unknown higher version means a newer writer used a
    /// payload shape this build cannot interpret, which is a hard decode
    /// failure rather than something to silently skip.
    pub fn highest_known_version(self) -> FormatVersion {
        match self {
            Tag::METADATA | Tag::DELETED_METADATA => FormatVersion(1),
            Tag::SUMMARY => FormatVersion(1),
            Tag::METADATA_GROUP => FormatVersion(0),
            _ => FormatVersion(0),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

/// A per-tag envelope version.
///
/// Unlike a single crate-wide format version, versions here are scoped to
/// one tag: `("MD", 1)` and `("SU", 1)` do not constrain each other. A
/// decoder table keyed by `(tag, version)` dispatches to the matching
/// payload decoder; unknown versions above [`Tag::highest_known_version`]
/// are rejected before the payload is even looked at.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Default)]
pub struct FormatVersion(pub u16);

impl FormatVersion {
    pub const V0: FormatVersion = FormatVersion(0);
    pub const V1: FormatVersion = FormatVersion(1);

    #[must_use]
    pub fn is_known_for(self, tag: Tag) -> bool {
        self.0 <= tag.highest_known_version().0
    }

    pub fn read_from<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self(reader.read_u16::<BigEndian>()?))
    }

    pub fn write_to<W: std::io::Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<BigEndian>(self.0)
    }
}

impl From<FormatVersion> for u16 {
    fn from(value: FormatVersion) -> Self {
        value.0
    }
}

impl From<u16> for FormatVersion {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_versions_accepted_unknown_rejected() {
        assert!(FormatVersion(0).is_known_for(Tag::METADATA));
        assert!(FormatVersion(1).is_known_for(Tag::METADATA));
        assert!(!FormatVersion(2).is_known_for(Tag::METADATA));
    }

    #[test]
    fn round_trips_through_big_endian_bytes() {
        let mut buf = vec![];
        FormatVersion(513).write_to(&mut buf).unwrap();
        assert_eq!(buf, vec![2, 1]);

        let mut cursor = &buf[..];
        assert_eq!(FormatVersion::read_from(&mut cursor).unwrap(), FormatVersion(513));
    }

    #[test]
    fn tag_display_round_trips_ascii() {
        assert_eq!(Tag::METADATA.to_string(), "MD");
        assert_eq!(Tag::DELETED_METADATA.to_string(), "!D");
    }
}
