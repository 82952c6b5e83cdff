// Error taxonomy for indexing, reconciliation and watching.

use std::io;
use std::path::PathBuf;

use folio_common::path::PathError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("`{0}` is not a Markdown file")]
    NotMarkdown(PathBuf),

    #[error("cannot read `{path}`: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{0}` has a header block that is never closed")]
    MalformedHeader(PathBuf),

    #[error("index file `{path}` is corrupt: {source}")]
    CorruptIndex {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("identifier `{identifier}` in `{duplicate}` already belongs to `{existing}`")]
    DuplicateIdentifier { identifier: String, existing: String, duplicate: String },

    #[error("file watching is unavailable: {0}")]
    WatchSubsystemUnavailable(#[source] notify::Error),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("cannot write `{path}`: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl IndexError {
    pub fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::UnreadableFile { path: path.into(), source }
    }

    pub fn write_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailed { path: path.into(), source }
    }

    /// Short stable code for machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotMarkdown(_) => "NOT_MARKDOWN",
            Self::UnreadableFile { .. } => "UNREADABLE_FILE",
            Self::MalformedHeader(_) => "MALFORMED_HEADER",
            Self::CorruptIndex { .. } => "CORRUPT_INDEX",
            Self::DuplicateIdentifier { .. } => "DUPLICATE_IDENTIFIER",
            Self::WatchSubsystemUnavailable(_) => "WATCH_UNAVAILABLE",
            Self::Path(_) => "OUTSIDE_WORKSPACE",
            Self::WriteFailed { .. } => "WRITE_FAILED",
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
