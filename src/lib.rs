// Copyright (c) 2026-present, the arkimet-store authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Dataset storage engine for an archival system for meteorological data.
//!
//! This crate owns the on-disk layout that binds raw data segments to
//! per-segment indices and a dataset-level manifest, the ingestion/dispatch
//! pipeline that routes incoming messages into the correct dataset and
//! segment, the query engine that evaluates predicates against the index
//! and streams matching data, and the maintenance engine that detects,
//! classifies and repairs inconsistencies between data segments and index.
//!
//! Format-specific scanners, the matcher/alias expansion language, HTTP and
//! CLI front-ends beyond the four core-owned subcommands, post-processor
//! implementations, the embedded scripting language and bounding-box
//! geometry are external collaborators; this crate only defines the
//! capability traits ([`scripting::QueryMacro`], [`scripting::TargetFile`],
//! [`scripting::Scanner`], [`matcher::Matcher`]) they must implement.

pub mod cache;
pub mod coding;
pub mod dataset;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub(crate) mod file;
pub mod index;
pub mod lock;
pub mod maintenance;
pub mod matcher;
pub mod metadata;
pub mod query;
pub mod scripting;
pub mod segment;
pub mod summary;
pub mod types;
pub mod version;
pub mod writer;

pub use error::{Error, Result};
pub use metadata::Metadata;
pub use segment::Segment;
