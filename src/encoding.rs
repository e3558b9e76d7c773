//! Source character encodings for log files
//!
//! Log files are read as raw bytes and converted to UTF-8 before they are
//! served. The set of supported encodings is closed and validated once at
//! startup, so request handlers never see an unknown name.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config::ConfigError;

/// Character encoding the log files on disk are written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Windows1251,
    Koi8R,
    Iso8859_1,
    Cp866,
}

/// Accepted names (lowercase) and the encoding each one selects.
const NAMES: &[(&str, SourceEncoding)] = &[
    ("utf-8", SourceEncoding::Utf8),
    ("utf8", SourceEncoding::Utf8),
    ("windows-1251", SourceEncoding::Windows1251),
    ("cp1251", SourceEncoding::Windows1251),
    ("win1251", SourceEncoding::Windows1251),
    ("koi8-r", SourceEncoding::Koi8R),
    ("iso-8859-1", SourceEncoding::Iso8859_1),
    ("cp866", SourceEncoding::Cp866),
];

/// Bytes could not be mapped from the source encoding to UTF-8
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("input is not valid {encoding}")]
pub struct DecodeError {
    pub encoding: SourceEncoding,
}

impl SourceEncoding {
    /// Canonical name, as reported by the health and config endpoints
    pub fn label(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Windows1251 => "windows-1251",
            SourceEncoding::Koi8R => "koi8-r",
            SourceEncoding::Iso8859_1 => "iso-8859-1",
            SourceEncoding::Cp866 => "cp866",
        }
    }

    /// Every name accepted by [`FromStr`], in table order
    pub fn supported_names() -> Vec<&'static str> {
        NAMES.iter().map(|(name, _)| *name).collect()
    }

    pub fn is_utf8(self) -> bool {
        self == SourceEncoding::Utf8
    }

    /// Converts `bytes` from this encoding to UTF-8.
    ///
    /// UTF-8 input is borrowed back untouched and is not validated. The other
    /// encodings decode without replacement characters: a byte with no mapping
    /// yields a [`DecodeError`] rather than a lossy result.
    pub fn decode(self, bytes: &[u8]) -> Result<Cow<'_, [u8]>, DecodeError> {
        let table = match self {
            SourceEncoding::Utf8 => return Ok(Cow::Borrowed(bytes)),
            // Latin-1 bytes are their own code points.
            SourceEncoding::Iso8859_1 => {
                return Ok(text_bytes(encoding_rs::mem::decode_latin1(bytes)));
            }
            SourceEncoding::Windows1251 => encoding_rs::WINDOWS_1251,
            SourceEncoding::Koi8R => encoding_rs::KOI8_R,
            SourceEncoding::Cp866 => encoding_rs::IBM866,
        };

        table
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(text_bytes)
            .ok_or(DecodeError { encoding: self })
    }
}

fn text_bytes(text: Cow<'_, str>) -> Cow<'_, [u8]> {
    match text {
        Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
        Cow::Owned(text) => Cow::Owned(text.into_bytes()),
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SourceEncoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, encoding)| *encoding)
            .ok_or_else(|| ConfigError::UnsupportedEncoding {
                name: s.to_string(),
                supported: Self::supported_names().join(", "),
            })
    }
}
