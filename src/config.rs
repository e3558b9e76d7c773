//! Configuration management for the log viewer
//!
//! A [`Config`] is built once at startup from the command line, validated, and
//! then shared read-only with every request handler.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::encoding::SourceEncoding;
use crate::preview::PreviewConfig;

/// Default preview ceiling (1 MiB)
pub const DEFAULT_PREVIEW_SIZE_LIMIT: u64 = 1024 * 1024;

/// Default listening port
pub const DEFAULT_PORT: u16 = 7424;

/// Default ceiling on a single request, headers to last body byte
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// How long in-flight requests may keep running after a shutdown signal
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration errors, all fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unsupported encoding: {name} (supported: {supported})")]
    UnsupportedEncoding { name: String, supported: String },
    #[error("preview size limit must be greater than zero")]
    ZeroPreviewLimit,
    #[error("cannot prepare log directory {}: {source}", path.display())]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory whose files are listed and served
    pub log_directory: PathBuf,
    /// Preview ceiling and source encoding
    pub preview: PreviewConfig,
    /// TCP port the HTTP server binds to
    pub port: u16,
    /// Requests still running after this long are answered with 408
    pub request_timeout: Duration,
    /// Grace period for in-flight requests once shutdown starts
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            preview: PreviewConfig::new(DEFAULT_PREVIEW_SIZE_LIMIT, SourceEncoding::Utf8),
            port: DEFAULT_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl Config {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log directory
    pub fn with_log_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_directory = path.into();
        self
    }

    /// Set the preview size limit in bytes
    pub fn with_preview_size_limit(mut self, bytes: u64) -> Self {
        self.preview.size_limit = bytes;
        self
    }

    /// Set the source encoding of the log files
    pub fn with_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.preview.encoding = encoding;
        self
    }

    /// Set the listening port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Checks the invariants request handlers rely on.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.preview.size_limit == 0 {
            return Err(ConfigError::ZeroPreviewLimit);
        }
        Ok(self)
    }

    /// Creates the log directory if it does not exist yet.
    ///
    /// Returns `true` when the directory had to be created.
    pub fn ensure_log_directory(&self) -> Result<bool, ConfigError> {
        if self.log_directory.exists() {
            return Ok(false);
        }

        tracing::warn!(path = %self.log_directory.display(), "log directory does not exist, creating it");
        std::fs::create_dir_all(&self.log_directory).map_err(|source| ConfigError::LogDirectory {
            path: self.log_directory.clone(),
            source,
        })?;
        tracing::info!(path = %self.log_directory.display(), "log directory created");
        Ok(true)
    }

    /// Preview limit expressed in mebibytes, for display
    pub fn preview_size_mb(&self) -> f64 {
        bytes_to_mb(self.preview.size_limit)
    }
}

/// `logs/` next to the running executable, or under the working directory
/// when the executable path is unavailable.
pub fn default_log_directory() -> PathBuf {
    match std::env::current_exe() {
        Ok(exe) => exe
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("logs"),
        Err(_) => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("logs"),
    }
}

pub(crate) fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
