use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("chunk index must start at 1")]
    ZeroChunkIndex,

    #[error("chunk index {index} is above the limit of {max}")]
    ChunkIndexTooLarge { index: usize, max: usize },

    #[error("payload needs {count} chunks, more than the limit of {max}")]
    TooManyChunks { count: usize, max: usize },

    #[error("chunk length must be at least 1")]
    ZeroChunkLength,

    #[error("missing chunks: {missing:?}")]
    MissingChunks { missing: Vec<usize> },
}

/// Failure to turn transported text back into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("malformed document at byte {offset}: {reason}")]
    MalformedDocument { offset: usize, reason: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

impl CodecError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>) -> Self {
        Self::ValidationFailed(field.into())
    }
}
