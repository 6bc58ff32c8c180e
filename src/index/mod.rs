//! Per-segment and manifest indices (spec §4.6): the `iseg` SQLite index
//! colocated with each segment, and the dataset-wide manifest that tracks
//! segment reftime spans without opening every segment index.

pub mod manifest;
pub mod segment_index;

pub use manifest::Manifest;
pub use segment_index::SegmentIndex;
