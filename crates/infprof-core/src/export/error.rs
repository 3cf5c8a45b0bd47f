use std::fmt;
use std::io;

use crate::record::ValueKind;

/// Errors raised while persisting or reading back records.
#[derive(Debug)]
pub enum ExportError {
    Io(io::Error),
    Json(serde_json::Error),
    Encode(postcard::Error),
    /// No registered format matches the requested name.
    UnsupportedFormat(String),
    /// `write`/`flush` called before `init` or after `close`.
    NotInitialized,
    /// A value cannot be stored in the column type fixed by the first record.
    SchemaMismatch {
        column: String,
        expected: ValueKind,
        found: ValueKind,
    },
    /// File content does not match the expected layout.
    Corrupt(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "I/O error: {}", e),
            ExportError::Json(e) => write!(f, "JSON error: {}", e),
            ExportError::Encode(e) => write!(f, "encoding error: {}", e),
            ExportError::UnsupportedFormat(name) => write!(f, "unsupported format: {}", name),
            ExportError::NotInitialized => write!(f, "writer is not initialized"),
            ExportError::SchemaMismatch {
                column,
                expected,
                found,
            } => write!(
                f,
                "schema mismatch in column '{}': expected {}, found {}",
                column, expected, found
            ),
            ExportError::Corrupt(msg) => write!(f, "corrupt file: {}", msg),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::Json(e) => Some(e),
            ExportError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ExportError {
    fn from(e: io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Json(e)
    }
}

impl From<postcard::Error> for ExportError {
    fn from(e: postcard::Error) -> Self {
        ExportError::Encode(e)
    }
}
