//! Reads from a directory segment: one message per numerically-named file,
//! the "offset" being the numeric filename (spec §3, §4.4 step 5).

use crate::error::Error;
use std::path::{Path, PathBuf};

/// Resolves the path of the file holding message `offset` within the
/// directory segment at `dir_path`, given the format extension.
#[must_use]
pub fn member_path(dir_path: &Path, offset: u64, format: &str) -> PathBuf {
    dir_path.join(format!("{offset:06}.{format}"))
}

/// Reads the whole member file for `offset`.
pub fn read_member(dir_path: &Path, offset: u64, format: &str) -> crate::Result<Vec<u8>> {
    let path = member_path(dir_path, offset, format);
    std::fs::read(&path).map_err(|e| Error::DataUnavailable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
