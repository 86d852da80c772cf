//! Request and response bodies exchanged with the host backend

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Counters arrive as decimal strings, plain numbers or not at all
#[derive(Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Int(u64),
    Text(String),
    Null,
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match WireNumber::deserialize(deserializer)? {
        WireNumber::Int(n) => Ok(n),
        WireNumber::Text(text) if text.trim().is_empty() => Ok(0),
        WireNumber::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("not a byte count: {:?}", text))),
        WireNumber::Null => Ok(0),
    }
}

/// Full listing snapshot as sent by `get_info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub files: Vec<RawFile>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub free_size: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub taken_size: u64,
}

/// File entry of a [`RawListing`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFile {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: u64,
    /// Index into `folders`; signed because the device can report -1
    pub folder: i64,
}

/// Body of `connect`
#[derive(Debug, Clone, Serialize)]
pub struct ConnectRequest<'a> {
    pub ports: &'a [String],
}

/// Body of `mkdir`, `rmdir` and `delete`
#[derive(Debug, Clone, Serialize)]
pub struct PathRequest<'a> {
    pub path: &'a str,
}

/// Body of `write_sd`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRequest {
    /// Name of the file staged on the host
    pub name: String,
    /// Destination folder on the SD card
    pub path: String,
    /// Start the file right after writing
    pub run: bool,
}

/// Response of `write_sd`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteResponse {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: u64,
    /// The device released the card to run the file
    #[serde(default)]
    pub autorun: bool,
}

/// Response of the generic files upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub done: bool,
    pub files: Option<UploadedFiles>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFiles {
    pub local: Option<UploadedFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub path: Option<String>,
}

impl UploadResponse {
    /// Name under which the host stored the upload, once it is complete
    pub fn staged_name(&self) -> Option<&str> {
        if !self.done {
            return None;
        }
        self.files
            .as_ref()?
            .local
            .as_ref()?
            .path
            .as_deref()
            .filter(|path| !path.is_empty())
    }
}

/// Host printer connection settings, only the port list is used
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub options: ConnectionOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionOptions {
    #[serde(default)]
    pub ports: Vec<String>,
}
