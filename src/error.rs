use std::{io, path::PathBuf, process::ExitStatus};

use crate::range::{format_epoch, TimeRange};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
}

/// Invalid or empty time window. Always raised before anything is written.
#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("invalid time expression `{0}`")]
    InvalidExpression(String),
    #[error("begin {} is after end {}", format_epoch(.begin), format_epoch(.end))]
    Inverted { begin: u64, end: u64 },
    #[error("no samples found in {0}")]
    NoData(TimeRange),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("below binary `{0}` not found")]
    MissingBinary(PathBuf),
    #[error("snapshot `{0}` does not exist")]
    MissingSnapshot(PathBuf),
    #[error("unknown dump category `{0}`")]
    UnknownCategory(String),
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("failed to decode {category} dump")]
    Decode {
        category: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{category} dump row has no usable Timestamp")]
    MissingTimestamp { category: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("prefix `{0}` is not a valid metric name prefix")]
    InvalidPrefix(String),
    #[error("no sink configured, set a sink url or an output file")]
    NoSink,
    #[error("both a sink url and an output file are configured")]
    ConflictingSinks,
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("invalid duration `{value}`")]
    InvalidDuration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to open output file {}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    /// The sink refused the payload. Not retried: it points at a conversion bug.
    #[error("sink rejected batch covering {window}: {reason}")]
    Rejected { window: TimeRange, reason: String },
    #[error("gave up on batch covering {window} after {attempts} attempts: {reason}")]
    RetriesExhausted {
        window: TimeRange,
        attempts: u32,
        reason: String,
    },
    #[error("failed to finalize sink output")]
    Finish(#[source] io::Error),
}
impl IngestionError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}
