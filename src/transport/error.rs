//! Error types for the transport module

use std::io;
use thiserror::Error;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while talking to the host backend
#[derive(Error, Debug)]
pub enum TransportError {
    /// Request could not be sent or the body could not be decoded
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint URL could not be built
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Backend answered with a non-success status
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Upload finished without a staged file
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// Local file could not be read for upload
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
