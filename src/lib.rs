/*!
 * mastersd - manage the SD card behind a MasterSD controller board
 *
 * A MasterSD board sits between a 3D printer and its SD card. This library
 * talks to the host backend that drives the board, takes the card over from
 * the printer, keeps a client-side copy of the card's listing in step with
 * confirmed changes, and hands the card back.
 */

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod report;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;
pub mod utils;


// Re-export main components for easier access
pub use client::{MasterSd, Outcome};
pub use config::Config;
pub use error::{MasterSdError, Result};
pub use session::{Controller, Session, SessionState, Ticket};
pub use store::SdTreeStore;
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{Crumb, FileRecord, FolderEntry, FolderView, Listing, Space, ROOT};
pub use utils::format_file_size;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
