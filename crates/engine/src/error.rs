use raidsync_core::{CodecError, CoreError};
use raidsync_storage::StorageError;
use thiserror::Error;

use crate::liveness::Liveness;

/// How many missing part indices an incomplete import reports.
pub const MISSING_PREVIEW: usize = 5;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("{0}")]
    Codec(#[from] CodecError),

    #[error("no import in progress")]
    NoPendingImport,

    /// `first` holds at most [`MISSING_PREVIEW`] of the `count` missing indices.
    #[error("import is missing {count} part(s), starting with {first:?}")]
    IncompleteImport { count: usize, first: Vec<usize> },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("bridge is not active ({0})")]
    BridgeInactive(Liveness),

    #[error("source of truth error: {0}")]
    Source(String),

    #[error("config error: {0}")]
    Config(String),
}

/// Stable result codes exposed to callers of the sync core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidEncoding,
    MalformedDocument,
    ValidationFailed,
    NoPendingImport,
    IncompleteImport,
    PermissionDenied,
    BridgeInactive,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Document,
    Permission,
    Liveness,
    Storage,
}

impl ErrorCategory {
    /// What the user can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Transport => "Copy the import text again and re-stage the missing parts",
            Self::Document => "The event data was rejected; request a fresh export",
            Self::Permission => "Only the event owner can do that",
            Self::Liveness => {
                "The companion app is not running; use a manual import to refresh events"
            }
            Self::Storage => "The local event cache could not be updated",
        }
    }
}

impl EngineError {
    pub fn incomplete_import(missing: &[usize]) -> Self {
        Self::IncompleteImport {
            count: missing.len(),
            first: missing.iter().take(MISSING_PREVIEW).copied().collect(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Codec(CodecError::InvalidEncoding(_)) => ErrorCode::InvalidEncoding,
            Self::Codec(CodecError::MalformedDocument { .. }) => ErrorCode::MalformedDocument,
            Self::Codec(CodecError::ValidationFailed(_)) => ErrorCode::ValidationFailed,
            Self::NoPendingImport => ErrorCode::NoPendingImport,
            Self::IncompleteImport { .. } | Self::Core(CoreError::MissingChunks { .. }) => {
                ErrorCode::IncompleteImport
            }
            Self::Core(
                CoreError::ZeroChunkIndex
                | CoreError::ZeroChunkLength
                | CoreError::ChunkIndexTooLarge { .. }
                | CoreError::TooManyChunks { .. },
            ) => {
                ErrorCode::InvalidEncoding
            }
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::BridgeInactive(_) => ErrorCode::BridgeInactive,
            Self::Storage(_)
            | Self::Core(_)
            | Self::Source(_)
            | Self::Config(_) => ErrorCode::Storage,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            ErrorCode::InvalidEncoding | ErrorCode::NoPendingImport | ErrorCode::IncompleteImport => {
                ErrorCategory::Transport
            }
            ErrorCode::MalformedDocument | ErrorCode::ValidationFailed => ErrorCategory::Document,
            ErrorCode::PermissionDenied => ErrorCategory::Permission,
            ErrorCode::BridgeInactive => ErrorCategory::Liveness,
            ErrorCode::Storage => ErrorCategory::Storage,
        }
    }
}
