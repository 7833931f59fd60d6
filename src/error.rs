use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while planning or executing an upload run.
///
/// `NotFound`, `DepthExceeded` and `Authentication` are structural and abort
/// the run. `MetadataExtraction` and `RemoteOperation` are scoped to a single
/// file or request and are logged and aggregated instead.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("local path not found: {0}")]
    NotFound(PathBuf),

    #[error("folder plan violates platform constraints: {0}")]
    DepthExceeded(String),

    #[error("could not read metadata from {path}: {message}")]
    MetadataExtraction { path: PathBuf, message: String },

    #[error("{what} failed: {message}")]
    RemoteOperation { what: String, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn remote(what: impl AsRef<str>, message: impl ToString) -> Self {
        UploadError::RemoteOperation {
            what: what.as_ref().to_string(),
            message: message.to_string(),
        }
    }
}
