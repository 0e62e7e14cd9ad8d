//! Error taxonomy for bundle operations.
//!
//! Failures fall into three classes (see [`ErrorKind`]): validation problems the
//! caller can fix and retry, missing documents or files, and everything else.
//! Conditions the engine recovers from on its own (include cycles, missing
//! include targets, citations without a bibliography entry) never show up here.

use crate::assets::MissingAsset;
use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, BundleError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; fixable by the caller, carries full detail.
    Validation,
    /// The document, its entry file or a requested file does not exist.
    NotFound,
    /// Anything unexpected.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("invalid manifest: {0}")]
    ManifestInvalid(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("entry file not found: {path}")]
    EntryNotFound { path: String },

    #[error("bundle file not found: {path}")]
    FileNotFound { path: String },

    #[error("path traversal rejected: {path}")]
    TraversalAttempt { path: String },

    #[error("{} referenced file(s) missing or invalid", .0.len())]
    MissingAssets(Vec<MissingAsset>),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BundleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ManifestInvalid(_) | Self::TraversalAttempt { .. } | Self::MissingAssets(_) => {
                ErrorKind::Validation
            }
            Self::DocumentNotFound(_) | Self::EntryNotFound { .. } | Self::FileNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::Storage(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Validation failures can be retried once the caller fixes the input.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// The batched diagnostics of a packaging failure, if this is one.
    pub fn missing_assets(&self) -> Option<&[MissingAsset]> {
        match self {
            Self::MissingAssets(missing) => Some(missing),
            _ => None,
        }
    }
}
