/*!
 * Configuration handling for mastersd
 */

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use url::Url;

use crate::error::{MasterSdError, Result};
use crate::transport::MAX_UPLOAD_BYTES;
use crate::types::ROOT;
use crate::utils::AUTO_PORT;
use crate::{bail, ensure};

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Command-line arguments for mastersd
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "mastersd",
    version = env!("CARGO_PKG_VERSION"),
    about = "Manage the SD card behind a MasterSD controller board",
    long_about = "Takes control of the SD card shared between a 3D printer and a MasterSD board, lists, uploads and deletes files on it through the host backend, and hands the card back to the printer."
)]
pub struct Args {
    /// Base URL of the host application
    #[clap(long, env = "MASTERSD_URL", default_value = "http://localhost:5000")]
    pub url: String,

    /// API key sent with every request
    #[clap(long, env = "MASTERSD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Serial port to try, repeatable; AUTO tries every MasterSD candidate
    #[clap(long = "port", value_name = "PORT")]
    pub ports: Vec<String>,

    /// Timeout for each backend call in seconds
    #[clap(long, default_value = "30")]
    pub timeout: u64,

    /// Timeout for staging a file on the host in seconds
    #[clap(long, default_value = "600")]
    pub upload_timeout: u64,

    /// Log level used when RUST_LOG is not set
    #[clap(long, default_value = "warn")]
    pub log_level: String,

    /// Log output format
    #[clap(long, value_enum, default_value_t = LogFormat::default())]
    pub log_format: LogFormat,

    /// Print listings as JSON
    #[clap(long)]
    pub json: bool,

    /// Leave the SD card with MasterSD when done
    #[clap(long)]
    pub keep_control: bool,

    /// Generate shell completions
    #[clap(long = "generate", value_enum)]
    pub generate: Option<Shell>,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

/// What to do with the card
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show who holds the card and how much space is left
    Status,
    /// List a folder
    Ls {
        #[clap(default_value = ROOT)]
        path: String,
    },
    /// Create a folder
    Mkdir { parent: String, name: String },
    /// Delete a file
    Rm { path: String },
    /// Delete a folder and everything in it
    Rmdir { path: String },
    /// Upload a local file onto the card
    Put {
        file: PathBuf,
        /// Destination folder on the card
        #[clap(long, default_value = ROOT)]
        to: String,
        /// Start printing the file right after writing it
        #[clap(long)]
        run: bool,
    },
    /// Hand the card to the other side
    Switch,
    /// Close the connection to the board
    Disconnect,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Host base URL
    pub base_url: String,

    /// API key for the host
    pub api_key: Option<String>,

    /// Ports to try on connect
    pub ports: Vec<String>,

    /// Per-call timeout
    pub timeout: Duration,

    /// Timeout for the upload call alone
    pub upload_timeout: Duration,

    pub log: LogConfig,

    /// Print listings as JSON
    pub json: bool,

    /// Leave the card with MasterSD on exit
    pub keep_control: bool,

    pub command: Command,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args(args: Args) -> Self {
        let ports = if args.ports.is_empty() {
            vec![AUTO_PORT.to_string()]
        } else {
            args.ports
        };

        Self {
            base_url: args.url,
            api_key: args.api_key.filter(|key| !key.is_empty()),
            ports,
            timeout: Duration::from_secs(args.timeout),
            upload_timeout: Duration::from_secs(args.upload_timeout),
            log: LogConfig {
                level: args.log_level,
                format: args.log_format,
            },
            json: args.json,
            keep_control: args.keep_control,
            command: args.command.unwrap_or(Command::Status),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| MasterSdError::Config(format!("invalid URL {}: {}", self.base_url, e)))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            Config,
            "unsupported URL scheme: {}",
            url.scheme()
        );
        ensure!(!self.timeout.is_zero(), Config, "timeout must be positive");
        ensure!(
            !self.upload_timeout.is_zero(),
            Config,
            "upload timeout must be positive"
        );

        if let Command::Put { file, .. } = &self.command {
            if !file.is_file() {
                bail!(Config, "file not found: {}", file.display());
            }
            let size = file.metadata()?.len();
            if size > MAX_UPLOAD_BYTES {
                return Err(MasterSdError::UploadTooLarge {
                    size,
                    limit: MAX_UPLOAD_BYTES,
                });
            }
        }

        Ok(())
    }

    /// Whether the command changes the card or lists it
    pub fn needs_card(&self) -> bool {
        !matches!(
            self.command,
            Command::Status | Command::Switch | Command::Disconnect
        )
    }
}
