//! The query engine (spec §4.8): a `DataQuery` compiles down to per-segment
//! SQL over each dataset's `iseg` index, pruned ahead of time by the
//! dataset manifest; `ByteQuery` adds the four output-stream shapes a
//! caller actually wants bytes in; `Merged` fans a query out across
//! several datasets and interleaves their hits in sorted order.

pub mod byte_query;
pub mod data_query;
pub mod merged;

pub use byte_query::{ByteQuery, ByteQueryType};
pub use data_query::{query_dataset, DataQuery, QueryHit, SortKey, Sorter};
pub use merged::merged_query;
