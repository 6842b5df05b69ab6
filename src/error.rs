//! Error taxonomy for indexing and querying.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("corrupt archive {archive}: {source}")]
    CorruptArchive {
        archive: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("entry {entry} not found in {archive}")]
    EntryNotFound { archive: String, entry: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index store error: {0}")]
    StoreIo(#[from] heed::Error),

    #[error("failed to (de)serialize index record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that only affect a single archive; the orchestrator counts these
    /// and moves on.
    pub fn is_per_file(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}
