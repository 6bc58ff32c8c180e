//! Capability traits for integration points the core depends on but does
//! not implement: the two embedded-scripting hooks (spec §4.8's
//! REP_METADATA / REP_SUMMARY `ByteQuery` specialisations, and target-file
//! overrides during dispatch), plus the format-specific message scanner
//! maintenance needs to recover attributes from raw bytes (spec §4.11's
//! TO_INDEX). Callers supply a concrete implementation backed by whatever
//! scripting engine or format decoder they embed; this crate only needs the
//! trait object shape to invoke it at the right point in the query,
//! dispatch and maintenance pipelines.

use crate::metadata::Metadata;
use crate::summary::Summary;

/// Produces a textual report from either a stream of metadata records or a
/// computed summary.
pub trait QueryMacro: Send {
    /// Called once per record, in stream order, for a REP_METADATA query.
    fn on_metadata(&mut self, metadata: &Metadata) -> crate::Result<()>;

    /// Called once, after every record has been folded in, for a
    /// REP_SUMMARY query.
    fn on_summary(&mut self, summary: &Summary) -> crate::Result<()>;
}

/// Computes a message's target beyond a dataset's static filter/step
/// mapping, e.g. consulting an external script to pick a destination or
/// relpath override during dispatch.
pub trait TargetFile: Send {
    fn target_for(&self, metadata: &Metadata) -> crate::Result<Option<String>>;
}

/// One message recovered from a raw segment's bytes, the way the original
/// import-time scan would have produced it.
pub struct ScannedMessage {
    pub offset: u64,
    pub size: u64,
    pub metadata: Metadata,
}

/// Splits a raw segment's bytes back into individual messages with their
/// full attributes. Needed by [`crate::maintenance::fixer::RealFixer`] to
/// rebuild an index from scratch (TO_INDEX) for a segment whose
/// `.metadata` sibling is gone too, since recognising message boundaries
/// by format signature (spec §4.9's validators, `segment::validators`) is
/// not itself enough to recover origin/product/reftime/etc.
pub trait Scanner: Send {
    fn scan(&self, data: &[u8], format: &str) -> crate::Result<Vec<ScannedMessage>>;
}
