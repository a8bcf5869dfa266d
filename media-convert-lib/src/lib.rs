//! Conversion orchestration for uploaded media
//!
//! This library provides:
//! - MPEG audio (layers I/II/III) frame decoding to 16-bit PCM, wrapped in WAV
//! - Delegation of image, video and document conversion to external tools
//! - Scoped temp files that are removed on every exit path
//! - A single policy table of supported formats per media kind
//!
//! [`Converter::convert`] is the entry point.

pub mod audio;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod policy;
pub mod process;
pub mod temp;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ConversionError, Result, ValidationError};
pub use observer::{ConversionObserver, ConversionState, RequestContext, TracingObserver};
pub use orchestrator::{cancel_after, Converter, ConverterConfig, ToolCommands, UploadLimits};
pub use policy::Strategy;
pub use types::{AudioFormatDescriptor, ConversionRequest, ConversionResult, MediaKind};

// Re-export so callers can build tokens without a direct dependency
pub use tokio_util::sync::CancellationToken;
