/*!
 * Core types and data structures for the SD card listing
 */

use serde::Serialize;

/// Absolute path of the SD card root
pub const ROOT: &str = "/sdcard";

/// A file on the SD card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// File name without folder
    pub name: String,
    /// Size as reported by the device
    pub size: u64,
    /// Position of the containing folder in [`Listing::folders`]
    pub folder_index: usize,
}

/// Snapshot of one SD card
///
/// Files point at folders by position, so `folders` is append-only except
/// for recursive folder deletion, which renumbers every surviving file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// Absolute folder paths in insertion order
    pub folders: Vec<String>,
    /// Every file on the card
    pub files: Vec<FileRecord>,
    /// Free bytes on the device
    pub free_bytes: u64,
    /// Used bytes on the device
    pub used_bytes: u64,
}

impl Listing {
    /// Position of a folder path, if present
    pub fn folder_index(&self, path: &str) -> Option<usize> {
        self.folders.iter().position(|folder| folder == path)
    }

    /// Position of a file record within a folder, if present
    pub fn file_position(&self, folder_index: usize, name: &str) -> Option<usize> {
        self.files
            .iter()
            .position(|file| file.folder_index == folder_index && file.name == name)
    }

    /// Current space counters
    pub fn space(&self) -> Space {
        Space {
            free_bytes: self.free_bytes,
            used_bytes: self.used_bytes,
        }
    }
}

/// Free and used space on the card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Space {
    pub free_bytes: u64,
    pub used_bytes: u64,
}

impl Space {
    /// Total device size known to the client
    pub fn total_bytes(&self) -> u64 {
        self.free_bytes.saturating_add(self.used_bytes)
    }
}

/// A sub-folder shown inside a folder view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    /// Position in [`Listing::folders`]
    pub index: usize,
    /// Last path segment
    pub name: String,
    /// Absolute path
    pub path: String,
}

/// Immediate children of one folder, derived from a [`Listing`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderView {
    /// Absolute path of the viewed folder
    pub path: String,
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileRecord>,
}

impl FolderView {
    /// Whether the folder has no children at all
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }
}

/// One segment of the breadcrumb trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub name: String,
    pub path: String,
}
