//! Notes: an ordered, append-only log of free-text annotations carried
//! alongside a metadata record's attribute set. Unlike attributes, notes
//! are not part of the record's identity and are not compared for equality
//! or indexed (spec §4.4).

use crate::coding::{read_length_prefixed, write_length_prefixed, Decode, Encode};
use crate::error::Error;
use crate::types::time::Time;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub time: Time,
    pub text: String,
}

impl Note {
    pub fn new(time: Time, text: impl Into<String>) -> Self {
        Note {
            time,
            text: text.into(),
        }
    }
}

impl Encode for Note {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        self.time.encode_into(writer)?;
        write_length_prefixed(writer, self.text.as_bytes())
    }
}

impl Decode for Note {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let time = Time::decode_from(reader)?;
        let text = String::from_utf8(read_length_prefixed(reader, 1 << 16)?)
            .map_err(|e| Error::MalformedInput(e.to_string()))?;
        Ok(Note { time, text })
    }
}

/// An ordered list of notes, encoded as a count followed by each note in
/// append order. Appending never reorders or deduplicates prior entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteLog(pub Vec<Note>);

impl NoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, note: Note) {
        self.0.push(note);
    }
}

impl Encode for NoteLog {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        writer.write_u32::<BigEndian>(self.0.len() as u32)?;
        for note in &self.0 {
            note.encode_into(writer)?;
        }
        Ok(())
    }
}

impl Decode for NoteLog {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let count = reader.read_u32::<BigEndian>()?;
        let mut notes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            notes.push(Note::decode_from(reader)?);
        }
        Ok(NoteLog(notes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_preserving_append_order() {
        let mut log = NoteLog::new();
        log.push(Note::new(Time::NOW, "rescanned"));
        log.push(Note::new(
            Time::new(2026, 1, 1, 0, 0, 0).unwrap(),
            "repacked",
        ));

        let bytes = log.encode().unwrap();
        let decoded = NoteLog::decode_from(&mut &bytes[..]).unwrap();
        assert_eq!(decoded.0.len(), 2);
        assert_eq!(decoded.0[0].text, "rescanned");
        assert_eq!(decoded.0[1].text, "repacked");
    }
}
