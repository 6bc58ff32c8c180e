use std::{fs::File, io::Write, path::Path};

pub const CONFIG_FILE: &str = "config";
pub const LOCK_FILE: &str = "lock";
pub const MANIFEST_FILE: &str = "MANIFEST";
pub const MANIFEST_SQLITE_FILE: &str = "index.sqlite";
pub const DATASET_SUMMARY_FILE: &str = "summary";
pub const MONTHLY_SUMMARY_DIR: &str = ".summaries";
pub const ARCHIVE_DIR: &str = ".archive";
pub const ARCHIVE_LAST_DIR: &str = "last";
pub const DONTPACK_FILE: &str = ".dontpack";
pub const SINGLEFILE_COUNTER_FILE: &str = "targetfile.singlefile.dat";

pub const METADATA_SIBLING_EXT: &str = "metadata";
pub const SUMMARY_SIBLING_EXT: &str = "summary";
pub const INDEX_SIBLING_EXT: &str = "index";
pub const GZ_EXT: &str = "gz";
pub const GZ_IDX_EXT: &str = "gz.idx";

/// Path of `<seg>.metadata`, `<seg>.summary`, `<seg>.index`, `<seg>.gz`, ...
/// for a segment-relative path and sibling extension.
pub fn sibling_path(segment_path: &Path, ext: &str) -> std::path::PathBuf {
    let mut s = segment_path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    std::path::PathBuf::from(s)
}

/// Atomically rewrites a file
pub fn rewrite_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    let folder = path.parent().expect("should have a parent");

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.persist(path).map_err(|e| e.error)?;

    // TODO: not sure why it fails on Windows...
    #[cfg(not(target_os = "windows"))]
    {
        let file = File::open(path)?;
        file.sync_all()?;
    }

    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn fsync_directory<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let file = File::open(path)?;
    debug_assert!(file.metadata()?.is_dir());
    file.sync_all()
}

#[cfg(target_os = "windows")]
pub fn fsync_directory<P: AsRef<Path>>(_path: P) -> std::io::Result<()> {
    // Cannot fsync directory on Windows
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn sibling_path_appends_extension() {
        let p = Path::new("2007/07-08.grib1");
        assert_eq!(
            sibling_path(p, METADATA_SIBLING_EXT),
            Path::new("2007/07-08.grib1.metadata")
        );
        assert_eq!(
            sibling_path(p, GZ_IDX_EXT),
            Path::new("2007/07-08.grib1.gz.idx")
        );
    }

    #[test]
    fn test_atomic_rewrite() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let path = dir.path().join("test.txt");
        {
            let mut file = File::create(&path)?;
            write!(file, "asdasdasdasdasd")?;
        }

        rewrite_atomic(&path, b"newcontent")?;

        let content = std::fs::read_to_string(&path)?;
        assert_eq!("newcontent", content);

        Ok(())
    }
}
