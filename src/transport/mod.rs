//! Transport to the host backend
//!
//! The SD card controller is only reachable through the host application's
//! plugin endpoints. [`Transport`] is the seam between the client and those
//! endpoints; [`HttpTransport`] is the real implementation.

mod error;
mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod wire;

pub use error::{TransportError, TransportResult};
pub use http::{HttpTransport, DEFAULT_UPLOAD_TIMEOUT};
pub use wire::{RawFile, RawListing, WriteRequest, WriteResponse};

use std::path::Path;

/// Largest file the host accepts for staging, in bytes
pub const MAX_UPLOAD_BYTES: u64 = 250_000_000;

/// Calls offered by the host backend
///
/// Controller flags are `Some(true)` when MasterSD holds the card,
/// `Some(false)` when the printer does and `None` when the device has not
/// said yet.
pub trait Transport {
    /// Serial ports known to the host
    fn serial_ports(&self) -> TransportResult<Vec<String>>;

    /// Open the controller connection, trying each port in order
    fn connect(&self, ports: &[String]) -> TransportResult<Option<bool>>;

    /// Close the controller connection
    fn disconnect(&self) -> TransportResult<()>;

    /// Hand the card to the other side
    fn switch_control(&self) -> TransportResult<Option<bool>>;

    /// Full listing snapshot
    fn get_info(&self) -> TransportResult<RawListing>;

    fn mkdir(&self, path: &str) -> TransportResult<()>;

    /// Recursively delete a folder
    fn rmdir(&self, path: &str) -> TransportResult<()>;

    fn delete(&self, path: &str) -> TransportResult<()>;

    /// Stage a local file on the host, returning the staged name
    fn upload(&self, file: &Path) -> TransportResult<String>;

    /// Copy a staged file onto the card
    fn write_sd(&self, request: &WriteRequest) -> TransportResult<WriteResponse>;
}
