//! Compressed segment shape: the concatenated form, gzip-compressed as a
//! sequence of independently-decodable gzip members (one per seek-index
//! block), plus a `.gz.idx` sibling recording `(uncompressed_offset,
//! compressed_offset)` pairs at block boundaries (spec §3, §4.4 steps 3-4).
//! Splitting into independent members, instead of one gzip stream for the
//! whole segment, is what makes seeking to an arbitrary block possible
//! without replaying the stream from the start.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SeekIndexEntry {
    pub uncompressed_offset: u64,
    pub compressed_offset: u64,
}

/// Builds the `.gz` bytes and seek index for a concatenated segment's raw
/// content, grouping `groupsize` messages per gzip member (spec's `gz
/// groupsize` dataset option).
pub fn compress(messages: &[&[u8]], groupsize: usize) -> crate::Result<(Vec<u8>, Vec<SeekIndexEntry>)> {
    let groupsize = groupsize.max(1);
    let mut gz_bytes = Vec::new();
    let mut index = Vec::new();
    let mut uncompressed_offset = 0u64;

    for group in messages.chunks(groupsize) {
        index.push(SeekIndexEntry {
            uncompressed_offset,
            compressed_offset: gz_bytes.len() as u64,
        });

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        for message in group {
            encoder.write_all(message)?;
            uncompressed_offset += message.len() as u64;
        }
        gz_bytes.extend(encoder.finish()?);
    }

    Ok((gz_bytes, index))
}

pub fn write_seek_index<W: Write>(writer: &mut W, index: &[SeekIndexEntry]) -> crate::Result<()> {
    writer.write_u32::<BigEndian>(index.len() as u32)?;
    for entry in index {
        writer.write_u64::<BigEndian>(entry.uncompressed_offset)?;
        writer.write_u64::<BigEndian>(entry.compressed_offset)?;
    }
    Ok(())
}

pub fn read_seek_index<R: Read>(reader: &mut R) -> crate::Result<Vec<SeekIndexEntry>> {
    let count = reader.read_u32::<BigEndian>()?;
    let mut index = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let uncompressed_offset = reader.read_u64::<BigEndian>()?;
        let compressed_offset = reader.read_u64::<BigEndian>()?;
        index.push(SeekIndexEntry {
            uncompressed_offset,
            compressed_offset,
        });
    }
    Ok(index)
}

/// The seek index entry whose block covers uncompressed byte `offset`: the
/// last entry whose `uncompressed_offset` is `<= offset`.
#[must_use]
pub fn locate_block(index: &[SeekIndexEntry], offset: u64) -> Option<SeekIndexEntry> {
    index.iter().rev().find(|entry| entry.uncompressed_offset <= offset).copied()
}

/// Reads `size` bytes at uncompressed `offset` using the `.gz.idx` seek
/// index: seeks the compressed stream to the covering block's compressed
/// offset, decompresses that one gzip member, and skips forward in
/// decompressed space (spec §4.4 step 3).
pub fn read_range_indexed(gz_path: &Path, index: &[SeekIndexEntry], offset: u64, size: u64) -> crate::Result<Vec<u8>> {
    let block = locate_block(index, offset).ok_or_else(|| crate::error::Error::DataCorrupt {
        path: gz_path.display().to_string(),
        reason: format!("no seek index block covers uncompressed offset {offset}"),
    })?;

    let mut file = std::fs::File::open(gz_path)?;
    file.seek(SeekFrom::Start(block.compressed_offset))?;
    let mut decoder = GzDecoder::new(file);

    let skip = (offset - block.uncompressed_offset) as usize;
    let mut discard = vec![0u8; skip];
    decoder.read_exact(&mut discard)?;

    let mut buf = vec![0u8; size as usize];
    decoder.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads `size` bytes at uncompressed `offset` by sequentially decompressing
/// from the start of the file (spec §4.4 step 4, used when no `.gz.idx`
/// sibling exists). The in-process cache that avoids rewinding on
/// in-order reads lives in `crate::cache`; this is the raw fallback.
pub fn read_range_sequential(gz_path: &Path, offset: u64, size: u64) -> crate::Result<Vec<u8>> {
    let file = std::fs::File::open(gz_path)?;
    let mut decoder = GzDecoder::new(file);

    let mut discard = vec![0u8; offset as usize];
    decoder.read_exact(&mut discard)?;

    let mut buf = vec![0u8; size as usize];
    decoder.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_and_read_range_indexed_round_trips() {
        let messages: Vec<&[u8]> = vec![b"GRIBone7777", b"GRIBtwo7777", b"GRIBthree7777"];
        let (gz_bytes, index) = compress(&messages, 1).unwrap();
        assert_eq!(index.len(), 3);

        let dir = tempfile::tempdir().unwrap();
        let gz_path = dir.path().join("seg.grib.gz");
        std::fs::write(&gz_path, &gz_bytes).unwrap();

        let bytes = read_range_indexed(&gz_path, &index, index[2].uncompressed_offset, 13).unwrap();
        assert_eq!(bytes, b"GRIBthree7777");
    }

    #[test]
    fn read_range_sequential_matches_indexed_result() {
        let messages: Vec<&[u8]> = vec![b"GRIBone7777", b"GRIBtwo7777"];
        let (gz_bytes, _index) = compress(&messages, 2).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let gz_path = dir.path().join("seg.grib.gz");
        std::fs::write(&gz_path, &gz_bytes).unwrap();

        let bytes = read_range_sequential(&gz_path, 11, 11).unwrap();
        assert_eq!(bytes, b"GRIBtwo7777");
    }

    #[test]
    fn seek_index_round_trips_through_encode_decode() {
        let index = vec![
            SeekIndexEntry {
                uncompressed_offset: 0,
                compressed_offset: 0,
            },
            SeekIndexEntry {
                uncompressed_offset: 100,
                compressed_offset: 40,
            },
        ];
        let mut buf = Vec::new();
        write_seek_index(&mut buf, &index).unwrap();
        let decoded = read_seek_index(&mut &buf[..]).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn locate_block_finds_the_last_covering_entry() {
        let index = vec![
            SeekIndexEntry {
                uncompressed_offset: 0,
                compressed_offset: 0,
            },
            SeekIndexEntry {
                uncompressed_offset: 50,
                compressed_offset: 20,
            },
        ];
        assert_eq!(locate_block(&index, 10), Some(index[0]));
        assert_eq!(locate_block(&index, 60), Some(index[1]));
    }
}
