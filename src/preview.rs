//! Preview builder
//!
//! Produces the text shown for a log file: the whole file when it fits under
//! the configured ceiling, otherwise only its tail behind a notice line. The
//! selected bytes are converted from the source encoding to UTF-8.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use thiserror::Error;

use crate::config::bytes_to_mb;
use crate::encoding::SourceEncoding;
use crate::fs::FileDescriptor;

/// Size ceiling and source encoding applied to every preview
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewConfig {
    /// Largest number of file bytes returned in a preview
    pub size_limit: u64,
    pub encoding: SourceEncoding,
}

impl PreviewConfig {
    pub fn new(size_limit: u64, encoding: SourceEncoding) -> Self {
        Self {
            size_limit,
            encoding,
        }
    }
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("failed to read file: {0}")]
    Io(#[from] io::Error),
}

/// Preview of a single file, ready to become a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewResult {
    /// Only the tail of the file was read
    pub truncated: bool,
    /// Banner explaining the truncation; `Some` iff `truncated`
    pub notice: Option<String>,
    /// File bytes converted to UTF-8, or the raw bytes if conversion failed
    pub content: Vec<u8>,
}

impl PreviewResult {
    /// Notice (if any) followed by the converted content.
    pub fn into_body(self) -> Vec<u8> {
        match self.notice {
            Some(notice) => {
                let mut body = Vec::with_capacity(notice.len() + self.content.len());
                body.extend_from_slice(notice.as_bytes());
                body.extend_from_slice(&self.content);
                body
            }
            None => self.content,
        }
    }
}

/// Offset of the first byte of the tail window, clamped at zero.
pub fn tail_offset(file_size: u64, size_limit: u64) -> u64 {
    file_size.saturating_sub(size_limit)
}

/// Banner placed in front of a truncated preview.
pub fn truncation_notice(file_size: u64, size_limit: u64) -> String {
    format!(
        "⚠️ File too large ({:.2} MB). Showing the last {} bytes ({:.2} MB). The complete file is available for download.\n",
        bytes_to_mb(file_size),
        size_limit,
        bytes_to_mb(size_limit),
    )
}

/// Builds the preview for an open file.
///
/// `reader` must be positioned at the start of the file and `file_size` must
/// come from a stat of the same file. If the file shrank in between, the tail
/// read returns whatever is left instead of failing.
pub fn build_preview<R>(
    reader: &mut R,
    file_size: u64,
    config: &PreviewConfig,
) -> Result<PreviewResult, PreviewError>
where
    R: Read + Seek,
{
    let (raw, notice) = if file_size <= config.size_limit {
        let mut raw = Vec::with_capacity(file_size as usize);
        reader.read_to_end(&mut raw)?;
        (raw, None)
    } else {
        let offset = tail_offset(file_size, config.size_limit);
        reader.seek(SeekFrom::Start(offset))?;

        let mut raw = Vec::with_capacity(config.size_limit as usize);
        reader.take(config.size_limit).read_to_end(&mut raw)?;
        (raw, Some(truncation_notice(file_size, config.size_limit)))
    };

    Ok(PreviewResult {
        truncated: notice.is_some(),
        notice,
        content: transcode(raw, config.encoding),
    })
}

/// Opens the described file and builds its preview.
pub fn preview_file(
    file: &FileDescriptor,
    config: &PreviewConfig,
) -> Result<PreviewResult, PreviewError> {
    let mut handle = File::open(&file.absolute_path)?;
    let result = build_preview(&mut handle, file.size_bytes, config)?;

    tracing::debug!(
        file = %file.name,
        size = file.size_bytes,
        truncated = result.truncated,
        "built preview"
    );
    Ok(result)
}

fn transcode(raw: Vec<u8>, encoding: SourceEncoding) -> Vec<u8> {
    if encoding.is_utf8() {
        return raw;
    }
    let decoded = encoding.decode(&raw).map(|text| text.into_owned());
    recover(raw, decoded)
}

/// Keeps the request alive when conversion fails: the raw bytes are served
/// instead and the failure only shows up in the log.
fn recover(
    raw: Vec<u8>,
    decoded: Result<Vec<u8>, crate::encoding::DecodeError>,
) -> Vec<u8> {
    match decoded {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %err, bytes = raw.len(), "cannot convert preview to UTF-8, serving raw bytes");
            raw
        }
    }
}
