//! Reads from a concatenated-file segment: back-to-back format-native
//! messages, addressed by byte offset (spec §3, §4.4 step 2).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Reads exactly `size` bytes at `offset` from the segment file at
/// `full_path` (a `pread`, conceptually — done here as seek+read since the
/// crate targets portable `std::fs` rather than a platform-specific pread).
pub fn read_range(full_path: &Path, offset: u64, size: u64) -> crate::Result<Vec<u8>> {
    let mut file = File::open(full_path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; size as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_the_requested_byte_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.grib");
        std::fs::write(&path, b"GRIBfirst7777GRIBsecond7777").unwrap();

        let bytes = read_range(&path, 13, 14).unwrap();
        assert_eq!(bytes, b"GRIBsecond7777");
    }
}
