//! Dataset glue (spec §3, §4.6, §4.7): ties a dataset's on-disk config,
//! manifest, and cached summaries together behind one handle, and maps a
//! record's reftime to the segment it belongs in via `step`.

pub mod config;
pub mod step;

pub use config::Config;
pub use step::Step;

use crate::index::Manifest;
use crate::metadata::Metadata;
use crate::summary::Summary;
use std::path::{Path, PathBuf};

/// A dataset: its validated config plus the root directory it lives under.
/// Does not itself hold index/summary state open — callers load and save
/// the manifest/summary caches explicitly, the way the teacher's own
/// higher-level handles are thin wrappers around files they reopen per use
/// rather than long-lived in-memory state.
pub struct Dataset {
    root: PathBuf,
    config: Config,
}

impl Dataset {
    pub fn open(root: impl Into<PathBuf>) -> crate::Result<Self> {
        let root = root.into();
        let config = Config::load(&root)?;
        Ok(Dataset { root, config })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The segment-relative path `md` belongs in, per this dataset's
    /// `step` (spec §3's "total and injective" mapping; `singlefile`
    /// dereferences this dataset's persistent counter as a side effect).
    pub fn relpath_for(&self, md: &Metadata) -> crate::Result<PathBuf> {
        let reftime = md.reftime()?.representative();
        let format = md.source()?.format().to_string();
        self.config.step.relpath(&reftime, &format, &self.root)
    }

    pub fn load_manifest(&self) -> crate::Result<Manifest> {
        Manifest::load(&self.root.join(crate::file::MANIFEST_FILE))
    }

    pub fn save_manifest(&self, manifest: &Manifest) -> crate::Result<()> {
        manifest.save(&self.root.join(crate::file::MANIFEST_FILE))
    }

    fn month_summary_path(&self, month_key: &str) -> PathBuf {
        self.root.join(crate::file::MONTHLY_SUMMARY_DIR).join(format!("{month_key}.summary"))
    }

    /// Loads a month's cached summary, or an empty one if it hasn't been
    /// written yet (a month with no segments, or one never summarised).
    pub fn load_month_summary(&self, month_key: &str) -> crate::Result<Summary> {
        let path = self.month_summary_path(month_key);
        if !path.exists() {
            return Ok(Summary::new());
        }
        let bytes = std::fs::read(&path)?;
        Summary::decode_envelope(&mut &bytes[..])
    }

    pub fn save_month_summary(&self, month_key: &str, summary: &Summary) -> crate::Result<()> {
        let path = self.month_summary_path(month_key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        crate::file::rewrite_atomic(&path, &summary.encode_envelope()?)?;
        Ok(())
    }

    fn dataset_summary_path(&self) -> PathBuf {
        self.root.join(crate::file::DATASET_SUMMARY_FILE)
    }

    /// Loads the whole-dataset summary cache (spec invariant 5: equals the
    /// merge of every per-segment summary). Missing or stale caches are
    /// the caller's concern to detect via manifest mtimes and rebuild by
    /// merging `load_month_summary` over the manifest's months.
    pub fn load_dataset_summary(&self) -> crate::Result<Option<Summary>> {
        let path = self.dataset_summary_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(Summary::decode_envelope(&mut &bytes[..])?))
    }

    pub fn save_dataset_summary(&self, summary: &Summary) -> crate::Result<()> {
        crate::file::rewrite_atomic(&self.dataset_summary_path(), &summary.encode_envelope()?)?;
        Ok(())
    }

    /// Drops the whole-dataset summary cache, forcing the next read to
    /// rebuild it from the per-month caches (used after a write changes a
    /// segment's stats but before the month's cache has been refreshed).
    pub fn invalidate_dataset_summary(&self) -> crate::Result<()> {
        let path = self.dataset_summary_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
