use thiserror::Error;

use crate::types::MediaKind;

/// Main error type for a conversion request
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The request was rejected before any resource was allocated
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A temp allocation, filesystem operation or subprocess spawn failed
    #[error("Resource error: {context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A compressed audio frame header or body could not be decoded
    #[error("Corrupt stream at byte offset {offset}: {reason}")]
    CorruptStream { offset: u64, reason: String },

    /// The decoded audio could not be wrapped into a container
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// An external tool exited unsuccessfully or produced no output
    #[error("{tool} failed with exit code {exit_code}")]
    ExternalTool {
        tool: String,
        exit_code: i32,
        last_output_lines: Vec<String>,
    },

    /// The caller aborted the request
    #[error("Conversion cancelled")]
    Cancelled,
}

/// Reasons a request is rejected up front
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unsupported target format '{format}' for {kind} conversion. Supported formats are: {supported}")]
    UnsupportedFormat {
        kind: MediaKind,
        format: String,
        supported: String,
    },

    #[error("Input of {size} bytes exceeds the {kind} limit of {limit} bytes")]
    TooLarge {
        kind: MediaKind,
        size: u64,
        limit: u64,
    },
}

impl ConversionError {
    /// Build a `Resource` error from an I/O failure and a short description
    pub fn resource(context: impl Into<String>, source: std::io::Error) -> Self {
        ConversionError::Resource {
            context: context.into(),
            source,
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::Validation(_) => "validation",
            ConversionError::Resource { .. } => "resource",
            ConversionError::CorruptStream { .. } => "corrupt_stream",
            ConversionError::Encoding(_) => "encoding",
            ConversionError::ExternalTool { .. } => "external_tool",
            ConversionError::Cancelled => "cancelled",
        }
    }

    /// Whether the caller is at fault (maps to a client error at the HTTP edge)
    pub fn is_client_error(&self) -> bool {
        matches!(self, ConversionError::Validation(_))
    }
}

impl From<hound::Error> for ConversionError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => ConversionError::resource("WAVE container I/O", e),
            other => ConversionError::Encoding(other.to_string()),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ConversionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = ConversionError::CorruptStream {
            offset: 417,
            reason: "bad sync".into(),
        };
        assert_eq!(err.kind(), "corrupt_stream");
        assert_eq!(err.to_string(), "Corrupt stream at byte offset 417: bad sync");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_validation_is_client_error() {
        let err: ConversionError = ValidationError::TooLarge {
            kind: MediaKind::Video,
            size: 10,
            limit: 5,
        }
        .into();
        assert!(err.is_client_error());
        assert_eq!(err.kind(), "validation");
    }
}
