//! Dataset configuration (spec §3): a flat `key = value` text file, one
//! entry per recognised option, read from a dataset root's `config` file.
//! Grounded on `arki/dataset/file.cc`'s `ConfigFile` section-building (the
//! same `key = value` shape, minus its multi-section `[name]` merging,
//! which this crate doesn't need — one `config` file names exactly one
//! dataset).

use super::step::Step;
use crate::error::Error;
use crate::types::Code;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DatasetKind {
    Simple,
    Iseg,
    Ondisk2,
    Remote,
    Outbound,
    Discard,
    File,
}

impl DatasetKind {
    fn parse(name: &str) -> crate::Result<Self> {
        Ok(match name {
            "simple" => DatasetKind::Simple,
            "iseg" => DatasetKind::Iseg,
            "ondisk2" => DatasetKind::Ondisk2,
            "remote" => DatasetKind::Remote,
            "outbound" => DatasetKind::Outbound,
            "discard" => DatasetKind::Discard,
            "file" => DatasetKind::File,
            other => return Err(Error::Config(format!("unknown dataset type {other:?}"))),
        })
    }
}

/// A parsed, validated dataset configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub kind: DatasetKind,
    pub path: PathBuf,
    pub name: String,
    pub step: Step,
    pub filter: Option<String>,
    pub index: Vec<Code>,
    pub unique: Vec<Code>,
    pub replace: bool,
    pub archive_age: Option<u32>,
    pub delete_age: Option<u32>,
    pub postprocess: Vec<String>,
    pub smallfiles: bool,
    pub gz_groupsize: usize,
}

impl Config {
    /// Parses and validates `config`'s raw `key = value` pairs (spec §3's
    /// recognised-option table).
    pub fn from_raw(raw: &BTreeMap<String, String>) -> crate::Result<Self> {
        let kind = raw
            .get("type")
            .ok_or_else(|| Error::Config("missing required key \"type\"".to_string()))
            .and_then(|v| DatasetKind::parse(v))?;
        let path = raw
            .get("path")
            .ok_or_else(|| Error::Config("missing required key \"path\"".to_string()))
            .map(PathBuf::from)?;
        let name = raw.get("name").cloned().unwrap_or_else(|| "(unnamed)".to_string());
        let step = match raw.get("step") {
            Some(s) => Step::parse(s)?,
            None if matches!(kind, DatasetKind::Remote | DatasetKind::Outbound | DatasetKind::Discard | DatasetKind::File) => {
                Step::Daily
            }
            None => return Err(Error::Config("missing required key \"step\"".to_string())),
        };
        let filter = raw.get("filter").cloned();
        let index = parse_code_list(raw.get("index"))?;
        let unique = parse_code_list(raw.get("unique"))?;
        let replace = parse_bool(raw.get("replace"))?;
        let archive_age = parse_opt_u32(raw.get("archive age"))?;
        let delete_age = parse_opt_u32(raw.get("delete age"))?;
        let postprocess = raw
            .get("postprocess")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let smallfiles = parse_bool(raw.get("smallfiles"))?;
        let gz_groupsize = match raw.get("gz groupsize") {
            Some(v) => v.parse().map_err(|_| Error::Config(format!("bad gz groupsize {v:?}")))?,
            None => 256,
        };

        if matches!(kind, DatasetKind::Iseg) && unique.is_empty() {
            return Err(Error::Config("iseg datasets require a non-empty \"unique\" key".to_string()));
        }

        Ok(Config {
            kind,
            path,
            name,
            step,
            filter,
            index,
            unique,
            replace,
            archive_age,
            delete_age,
            postprocess,
            smallfiles,
            gz_groupsize,
        })
    }

    /// Loads and parses the `config` file at `dataset_root`.
    pub fn load(dataset_root: &Path) -> crate::Result<Self> {
        let path = dataset_root.join(crate::file::CONFIG_FILE);
        let text = std::fs::read_to_string(&path)?;
        let raw = parse_kv_lines(&text)?;
        Self::from_raw(&raw)
    }
}

fn parse_kv_lines(text: &str) -> crate::Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("config line missing \"=\": {line:?}")))?;
        out.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(out)
}

fn parse_code_list(value: Option<&String>) -> crate::Result<Vec<Code>> {
    match value {
        None => Ok(Vec::new()),
        Some(v) => v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(Code::from_name).collect(),
    }
}

fn parse_bool(value: Option<&String>) -> crate::Result<bool> {
    match value.map(String::as_str) {
        None => Ok(false),
        Some("true" | "yes" | "1") => Ok(true),
        Some("false" | "no" | "0") => Ok(false),
        Some(other) => Err(Error::Config(format!("bad boolean value {other:?}"))),
    }
}

fn parse_opt_u32(value: Option<&String>) -> crate::Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| Error::Config(format!("bad integer value {v:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_simple_dataset() {
        let mut raw = BTreeMap::new();
        raw.insert("type".to_string(), "simple".to_string());
        raw.insert("path".to_string(), "/data/test".to_string());
        raw.insert("step".to_string(), "daily".to_string());
        raw.insert("filter".to_string(), "origin:GRIB1,200".to_string());

        let cfg = Config::from_raw(&raw).unwrap();
        assert_eq!(cfg.kind, DatasetKind::Simple);
        assert_eq!(cfg.step, Step::Daily);
        assert_eq!(cfg.filter.as_deref(), Some("origin:GRIB1,200"));
        assert!(!cfg.replace);
        assert_eq!(cfg.gz_groupsize, 256);
    }

    #[test]
    fn iseg_without_unique_is_rejected() {
        let mut raw = BTreeMap::new();
        raw.insert("type".to_string(), "iseg".to_string());
        raw.insert("path".to_string(), "/data/test".to_string());
        raw.insert("step".to_string(), "daily".to_string());

        assert!(Config::from_raw(&raw).is_err());
    }

    #[test]
    fn iseg_parses_index_and_unique_code_lists() {
        let mut raw = BTreeMap::new();
        raw.insert("type".to_string(), "iseg".to_string());
        raw.insert("path".to_string(), "/data/test".to_string());
        raw.insert("step".to_string(), "daily".to_string());
        raw.insert("index".to_string(), "origin, product, level".to_string());
        raw.insert("unique".to_string(), "reftime, origin".to_string());

        let cfg = Config::from_raw(&raw).unwrap();
        assert_eq!(cfg.index, vec![Code::Origin, Code::Product, Code::Level]);
        assert_eq!(cfg.unique, vec![Code::Reftime, Code::Origin]);
    }

    #[test]
    fn load_reads_a_config_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config"),
            "type = simple\npath = .\nstep = monthly\n# a comment\nreplace = true\n",
        )
        .unwrap();

        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.step, Step::Monthly);
        assert!(cfg.replace);
    }
}
