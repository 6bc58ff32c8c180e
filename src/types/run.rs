//! The `run` attribute: model run time-of-day, e.g. forecast cycle.

use crate::coding::{read_length_prefixed, write_length_prefixed, Decode, Encode};
use crate::error::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(tag = "style")]
pub enum Run {
    Minute { hour: u8, minute: u8 },
}

impl Encode for Run {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        match self {
            Run::Minute { hour, minute } => {
                writer.write_u8(0)?;
                writer.write_u8(*hour)?;
                writer.write_u8(*minute)?;
            }
        }
        Ok(())
    }
}

impl Decode for Run {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let style = reader.read_u8()?;
        match style {
            0 => Ok(Run::Minute {
                hour: reader.read_u8()?,
                minute: reader.read_u8()?,
            }),
            other => Err(Error::MalformedInput(format!("unknown run style {other}"))),
        }
    }
}

/// Free-form task label attached by some scanners (e.g. ODIM `how/task`).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Task(pub String);

impl Encode for Task {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> crate::Result<()> {
        write_length_prefixed(writer, self.0.as_bytes())
    }
}

impl Decode for Task {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> crate::Result<Self> {
        let bytes = read_length_prefixed(reader, 4096)?;
        Ok(Task(
            String::from_utf8(bytes).map_err(|e| Error::MalformedInput(e.to_string()))?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_round_trips() {
        let run = Run::Minute { hour: 0, minute: 0 };
        let bytes = run.encode().unwrap();
        assert_eq!(Run::decode_from(&mut &bytes[..]).unwrap(), run);
    }

    #[test]
    fn task_round_trips() {
        let task = Task("SCAN".to_string());
        let bytes = task.encode().unwrap();
        assert_eq!(Task::decode_from(&mut &bytes[..]).unwrap(), task);
    }
}
