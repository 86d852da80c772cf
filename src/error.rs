//! Global error handling for mastersd
//!
//! This module provides a centralized error type covering the SD card
//! listing, the session and the transport to the host backend.

use std::io;
use thiserror::Error;

use crate::transport::TransportError;

/// Global error type for mastersd operations
#[derive(Error, Debug)]
pub enum MasterSdError {
    /// Server snapshot references a missing folder or repeats a folder
    #[error("Malformed listing: {0}")]
    MalformedListing(String),

    /// Folder path is not part of the current listing
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// File path is not part of the current listing
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Folder name is empty, contains a separator or already exists
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Free/used counters would go negative, the listing no longer matches the card
    #[error("Space counters out of sync with the SD card: {0}")]
    SpaceDesync(String),

    /// No listing is loaded
    #[error("No SD card listing loaded")]
    NoListing,

    /// Operation needs an open connection to the controller
    #[error("Not connected to MasterSD")]
    NotConnected,

    /// No MasterSD serial port to try
    #[error("No MasterSD serial port available")]
    NoPorts,

    /// A connection is already open or being opened
    #[error("Already connected to MasterSD")]
    AlreadyConnected,

    /// The printer holds the SD card
    #[error("MasterSD does not hold the SD card")]
    NotInControl,

    /// Controller state is unknown, control cannot be switched
    #[error("SD card control state is unknown")]
    ControlUnavailable,

    /// File is larger than the host accepts for staging
    #[error("File is {size} bytes, uploads are limited to {limit} bytes")]
    UploadTooLarge { size: u64, limit: u64 },

    /// Host backend call failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON processing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MasterSdError {
    /// Caller errors against the current state. The listing is left untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FolderNotFound(_)
                | Self::FileNotFound(_)
                | Self::InvalidName(_)
                | Self::NoListing
                | Self::NotConnected
                | Self::NoPorts
                | Self::AlreadyConnected
                | Self::NotInControl
                | Self::ControlUnavailable
                | Self::UploadTooLarge { .. }
                | Self::Transport(_)
        )
    }

    /// Errors after which the listing has been discarded and must be re-fetched
    pub fn is_consistency_error(&self) -> bool {
        matches!(self, Self::MalformedListing(_) | Self::SpaceDesync(_))
    }
}

/// Specialized Result type for mastersd operations
pub type Result<T> = std::result::Result<T, MasterSdError>;

/// Creates a MasterSdError with a formatted message
#[macro_export]
macro_rules! error {
    ($error_type:ident, $($arg:tt)*) => {
        $crate::error::MasterSdError::$error_type(format!($($arg)*))
    };
}

/// Returns an error result with a formatted message
#[macro_export]
macro_rules! bail {
    ($error_type:ident, $($arg:tt)*) => {
        return Err($crate::error!($error_type, $($arg)*))
    };
}

/// Ensures a condition is true, otherwise returns an error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $error_type:ident, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($error_type, $($arg)*)
        }
    };
}

// Lets the binary return io::Result like any other CLI step
impl From<MasterSdError> for io::Error {
    fn from(err: MasterSdError) -> Self {
        io::Error::new(io::ErrorKind::Other, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_name(name: &str) -> Result<()> {
        ensure!(!name.is_empty(), InvalidName, "empty name in {}", "/sdcard");
        Ok(())
    }

    #[test]
    fn test_ensure_macro() {
        assert!(check_name("prints").is_ok());
        match check_name("") {
            Err(MasterSdError::InvalidName(msg)) => assert_eq!(msg, "empty name in /sdcard"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_error_classes() {
        assert!(error!(FileNotFound, "/sdcard/a.gcode").is_recoverable());
        assert!(!error!(SpaceDesync, "free").is_recoverable());
        assert!(error!(MalformedListing, "dup").is_consistency_error());
        assert!(!MasterSdError::NoListing.is_consistency_error());
    }
}
