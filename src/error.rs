//! Error types for texture conversion.
//!
//! Every failure inside a single conversion job is a [`ConvertError`]. The batch
//! driver reports them per input and keeps going, so the variants carry enough
//! context (path, stage) to be useful in a log line on their own.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::textures::{Stage, ToolOutputError};

/// Coarse classification used for reporting and exit summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input: odd/oversize dimensions, undecodable image, unknown extension
    InputValidation,
    /// Embedded ICC profile could not be converted
    ColorProfile,
    /// The external encoder misbehaved (no output, short output, bad magic, timeout)
    ExternalTool,
    /// Filesystem failure
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InputValidation => "input validation",
            ErrorKind::ColorProfile => "color profile",
            ErrorKind::ExternalTool => "external tool",
            ErrorKind::Io => "I/O",
        };
        f.write_str(name)
    }
}

/// Errors raised while converting one image into a `.ckd` container.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Invalid dimensions {width}x{height}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: &'static str,
    },

    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Unknown output extension: {0} (expected tga or png)")]
    UnsupportedExtension(String),

    #[error("Color profile conversion failed: {0}")]
    ColorProfile(String),

    #[error("Encoder failed on {stage}: {reason}")]
    ExternalTool { stage: Stage, reason: String },

    #[error("Encoder output for {stage} rejected: {source}")]
    InvalidToolOutput {
        stage: Stage,
        #[source]
        source: ToolOutputError,
    },

    #[error("Encoder timed out on {stage} after {timeout:?}")]
    EncoderTimeout { stage: Stage, timeout: Duration },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    /// Which of the four reporting buckets this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InvalidDimensions { .. }
            | ConvertError::Decode { .. }
            | ConvertError::UnsupportedExtension(_) => ErrorKind::InputValidation,
            ConvertError::ColorProfile(_) => ErrorKind::ColorProfile,
            ConvertError::ExternalTool { .. }
            | ConvertError::InvalidToolOutput { .. }
            | ConvertError::EncoderTimeout { .. } => ErrorKind::ExternalTool,
            ConvertError::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn tool(stage: Stage, reason: impl Into<String>) -> Self {
        ConvertError::ExternalTool {
            stage,
            reason: reason.into(),
        }
    }
}

/// Attach a human-readable context to `io::Result`, in the spirit of
/// `anyhow::Context` but producing a typed [`ConvertError::Io`].
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T, ConvertError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T, ConvertError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| ConvertError::Io {
            context: f().into(),
            source,
        })
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
