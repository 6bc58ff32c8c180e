//! The dataset-level manifest (spec §4.6's "simple" style): a plain-text
//! file tracking `(relpath, mtime, min_reftime, max_reftime)` per segment,
//! so that segment pruning during a query doesn't require opening every
//! segment's own `.index` file. Rewritten atomically via `file::rewrite_atomic`,
//! the same idiom the teacher uses for its own manifest-shaped files.

use crate::types::time::Time;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct ManifestEntry {
    pub mtime: i64,
    pub min_reftime: Time,
    pub max_reftime: Time,
}

/// One dataset's manifest, keyed by segment relpath. Kept in memory and
/// rewritten whole on every `save`; datasets have at most a few thousand
/// segments, so this is cheap compared to the I/O it saves on the query
/// path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a manifest from `path`. A missing file is an empty manifest,
    /// the state of a freshly created dataset.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let text = std::fs::read_to_string(path)?;
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = parse_line(line)?;
            entries.insert(entry.0, entry.1);
        }
        Ok(Manifest { entries })
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let mut text = String::new();
        for (relpath, entry) in &self.entries {
            text.push_str(&format!(
                "{relpath}\t{}\t{}\t{}\n",
                entry.mtime,
                entry.min_reftime.to_sql_text(),
                entry.max_reftime.to_sql_text()
            ));
        }
        crate::file::rewrite_atomic(path, text.as_bytes())?;
        Ok(())
    }

    pub fn upsert(&mut self, relpath: impl Into<String>, mtime: i64, min_reftime: Time, max_reftime: Time) {
        self.entries.insert(
            relpath.into(),
            ManifestEntry {
                mtime,
                min_reftime,
                max_reftime,
            },
        );
    }

    pub fn remove(&mut self, relpath: &str) -> Option<ManifestEntry> {
        self.entries.remove(relpath)
    }

    pub fn get(&self, relpath: &str) -> Option<&ManifestEntry> {
        self.entries.get(relpath)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Segments whose `[min_reftime, max_reftime]` span overlaps
    /// `[from, to]`, in relpath order (spec §4.8 step 2's manifest-pruned
    /// full scan fallback).
    pub fn overlapping(&self, from: Time, to: Time) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.min_reftime <= to && entry.max_reftime >= from)
            .map(|(relpath, _)| relpath.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn parse_line(line: &str) -> crate::Result<(String, ManifestEntry)> {
    let mut fields = line.split('\t');
    let relpath = fields
        .next()
        .ok_or_else(|| crate::error::Error::MalformedInput("manifest line missing relpath".to_string()))?
        .to_string();
    let mtime: i64 = fields
        .next()
        .ok_or_else(|| crate::error::Error::MalformedInput("manifest line missing mtime".to_string()))?
        .parse()
        .map_err(|e| crate::error::Error::MalformedInput(format!("bad mtime: {e}")))?;
    let min_reftime = Time::from_sql_text(
        fields.next().ok_or_else(|| crate::error::Error::MalformedInput("manifest line missing reftime".to_string()))?,
    )?;
    let max_reftime = Time::from_sql_text(
        fields.next().ok_or_else(|| crate::error::Error::MalformedInput("manifest line missing reftime".to_string()))?,
    )?;
    Ok((
        relpath,
        ManifestEntry {
            mtime,
            min_reftime,
            max_reftime,
        },
    ))
}
