//! Unifies the three shapes' read paths behind one handle, implementing the
//! source-resolution fallback chain of spec §4.4: a concatenated segment's
//! raw file, a compressed segment's seek index (or sequential decompression
//! if no index sibling exists), or a directory segment's numbered member.

use super::{compressed, concatenated, directory, Segment, Shape};
use crate::error::Error;
use crate::types::source::Source;
use std::path::Path;

/// A segment open for reading. Thin and cheap to construct; the actual fd
/// and decompression-position cache this should sit behind live in
/// `crate::cache`, which wraps `SegmentReader` per dataset.
pub struct SegmentReader<'a> {
    dataset_root: &'a Path,
    segment: Segment,
}

impl<'a> SegmentReader<'a> {
    #[must_use]
    pub fn new(dataset_root: &'a Path, segment: Segment) -> Self {
        SegmentReader { dataset_root, segment }
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.segment.shape()
    }

    /// Resolves a `Source::Blob`'s bytes, dispatching on this segment's
    /// shape (spec §4.4 steps 2-5): a concatenated file's byte range, a
    /// compressed segment's seek index (falling back to sequential
    /// decompression when no `.gz.idx` sibling exists), or a directory
    /// segment's numbered member file, rebuilt from `offset` and `format`.
    /// In every shape `blob.relpath` names the segment itself, matching the
    /// path `Segment::detect` was given.
    pub fn read(&self, blob: &Source) -> crate::Result<Vec<u8>> {
        let Source::Blob {
            relpath,
            offset,
            size,
            format,
        } = blob
        else {
            return Err(Error::Config("SegmentReader::read requires a Source::Blob".to_string()));
        };

        match self.segment.shape() {
            Shape::Concatenated => {
                let full_path = self.dataset_root.join(relpath);
                concatenated::read_range(&full_path, *offset, *size)
            }
            Shape::Directory => {
                let dir_path = self.dataset_root.join(relpath);
                directory::read_member(&dir_path, *offset, format)
            }
            Shape::Compressed => {
                let full_path = self.dataset_root.join(relpath);
                let gz_path = crate::file::sibling_path(&full_path, crate::file::GZ_EXT);
                let idx_path = crate::file::sibling_path(&full_path, crate::file::GZ_IDX_EXT);

                if idx_path.is_file() {
                    let mut file = std::fs::File::open(&idx_path)?;
                    let index = compressed::read_seek_index(&mut file)?;
                    compressed::read_range_indexed(&gz_path, &index, *offset, *size)
                } else if gz_path.is_file() {
                    compressed::read_range_sequential(&gz_path, *offset, *size)
                } else {
                    Err(Error::DataUnavailable {
                        path: gz_path.display().to_string(),
                        reason: "segment marked Compressed but no .gz file found".to_string(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::writer::SegmentWriter;
    use tempfile::tempdir;

    #[test]
    fn reads_a_concatenated_segment_through_the_unified_path() {
        let dir = tempdir().unwrap();
        let writer = SegmentWriter::open(dir.path(), "2007/07-08.grib", Shape::Concatenated).unwrap();
        let mut pending = writer.begin_append("grib").unwrap();
        let blob = pending.append(b"GRIBhello7777").unwrap();
        pending.commit().unwrap();

        let segment = Segment::new("2007/07-08.grib", Shape::Concatenated);
        let reader = SegmentReader::new(dir.path(), segment);
        assert_eq!(reader.read(&blob).unwrap(), b"GRIBhello7777");
    }

    #[test]
    fn reads_a_directory_segment_member_through_the_unified_path() {
        let dir = tempdir().unwrap();
        let writer = SegmentWriter::open(dir.path(), "2007/07-08", Shape::Directory).unwrap();
        let mut pending = writer.begin_append("grib").unwrap();
        let blob = pending.append(b"GRIBa7777").unwrap();
        pending.commit().unwrap();

        let segment = Segment::new("2007/07-08", Shape::Directory);
        let reader = SegmentReader::new(dir.path(), segment);
        assert_eq!(reader.read(&blob).unwrap(), b"GRIBa7777");
    }

    #[test]
    fn reads_a_compressed_segment_via_seek_index_through_the_unified_path() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2007")).unwrap();
        let messages: Vec<&[u8]> = vec![b"GRIBone7777", b"GRIBtwo7777"];
        let (gz_bytes, index) = compressed::compress(&messages, 1).unwrap();
        std::fs::write(dir.path().join("2007/07-08.grib.gz"), &gz_bytes).unwrap();

        let idx_path = dir.path().join("2007/07-08.grib.gz.idx");
        let mut buf = Vec::new();
        compressed::write_seek_index(&mut buf, &index).unwrap();
        std::fs::write(&idx_path, &buf).unwrap();

        let segment = Segment::new("2007/07-08.grib", Shape::Compressed);
        let reader = SegmentReader::new(dir.path(), segment);
        let blob = Source::Blob {
            format: "grib".to_string(),
            relpath: "2007/07-08.grib".to_string(),
            offset: index[1].uncompressed_offset,
            size: 11,
        };
        assert_eq!(reader.read(&blob).unwrap(), b"GRIBtwo7777");
    }
}
