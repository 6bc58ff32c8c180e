// Copyright (c) 2026-present, the arkimet-store authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::fmt;

/// Error taxonomy for the dataset storage engine.
///
/// Variants map 1:1 onto the abstract error kinds of the design: decode
/// failures never lose the tag/version that caused them, IO failures carry
/// the dataset/segment context the caller needs to report something
/// actionable, and recoverable conditions (duplicates, index drift) are kept
/// distinct from fatal ones (`Io`, `Config`) so callers can pattern-match on
/// what they can route around.
#[derive(Debug)]
pub enum Error {
    /// Envelope or payload could not be parsed: unknown tag, version above
    /// the highest known for a tag, or `length` overruns the buffer.
    MalformedInput(String),
    /// A `Source` could not be resolved to bytes (file/segment missing).
    DataUnavailable { path: String, reason: String },
    /// A format validator rejected the bytes at a given source.
    DataCorrupt { path: String, reason: String },
    /// A `unique` constraint fired on insert.
    DuplicateInsert { dataset: String, id: String },
    /// The index references something the data segment does not have, or
    /// vice versa.
    IndexInconsistency { segment: String, reason: String },
    /// Retryable OS-level I/O condition (EINTR/EAGAIN) exhausted its
    /// backoff budget.
    TransientIo(std::io::Error),
    /// Non-retryable OS-level I/O condition (ENOSPC/EIO/...).
    FatalIo(std::io::Error),
    /// A dataset `type` or option is unknown or inconsistent.
    Config(String),
    /// A re-entrant call into the dataset that produced a callback.
    Reentrancy(String),
    /// Many producers each failed independently (multi-dataset merge).
    Merged(Vec<Error>),
    /// Generic I/O error without enough context to classify as transient or
    /// fatal; propagated as-is.
    Io(std::io::Error),
    /// Embedded SQLite index failure.
    Sql(rusqlite::Error),
}

/// Convenience alias used throughout the crate, mirroring the teacher's own
/// crate-root `Result`.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInput(msg) => write!(f, "malformed input: {msg}"),
            Error::DataUnavailable { path, reason } => {
                write!(f, "data unavailable at {path}: {reason}")
            }
            Error::DataCorrupt { path, reason } => {
                write!(f, "data corrupt at {path}: {reason}")
            }
            Error::DuplicateInsert { dataset, id } => {
                write!(f, "duplicate insert into dataset {dataset:?}: {id}")
            }
            Error::IndexInconsistency { segment, reason } => {
                write!(f, "index inconsistency in segment {segment:?}: {reason}")
            }
            Error::TransientIo(e) => write!(f, "transient I/O error: {e}"),
            Error::FatalIo(e) => write!(f, "fatal I/O error: {e}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Reentrancy(msg) => write!(f, "illegal re-entrant call: {msg}"),
            Error::Merged(errs) => {
                write!(f, "{} producer(s) failed:", errs.len())?;
                for e in errs {
                    write!(f, " [{e}]")?;
                }
                Ok(())
            }
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Sql(e) => write!(f, "index error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::TransientIo(e) | Error::FatalIo(e) | Error::Io(e) => Some(e),
            Error::Sql(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match value.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock => Error::TransientIo(value),
            ErrorKind::OutOfMemory => Error::FatalIo(value),
            _ => Error::Io(value),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Error::Sql(value)
    }
}
