//! logview - Web viewer for local log files
//!
//! Lists the files under a log directory, serves UTF-8 previews (only the tail
//! of files over the size limit) and full downloads over HTTP.

pub mod config;
pub mod encoding;
pub mod fs;
pub mod preview;
pub mod security;
pub mod server;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use encoding::{DecodeError, SourceEncoding};
pub use fs::{list_files, stat_file, FileDescriptor, FileEntry};
pub use preview::{build_preview, PreviewConfig, PreviewError, PreviewResult};
pub use security::{resolve_within, SecurityError};
pub use server::{create_router, AppState};

/// Current version of the application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
