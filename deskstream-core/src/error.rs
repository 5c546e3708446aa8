//! Error types for Deskstream

use thiserror::Error;

/// Result type alias using DeskstreamError
pub type Result<T> = std::result::Result<T, DeskstreamError>;

/// Main error type for Deskstream operations
///
/// Capture backends and the encoder never surface these to their callers;
/// they are produced by the platform layers and absorbed by the recovery
/// state machines, which log them and degrade output instead.
#[derive(Debug, Error)]
pub enum DeskstreamError {
    /// A capture resource could not be acquired or a capture call failed
    #[error("Capture error: {0}")]
    Capture(String),

    /// The whole capture resource chain is stale and must be recreated
    #[error("Capture resources invalidated: {0}")]
    ResourcesInvalidated(String),

    /// Pixel conversion or encoder resource error
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// The H.264 compressor rejected its settings or input
    #[error("Compressor error: {0}")]
    Compressor(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unsupported operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DeskstreamError>,
    },
}

impl DeskstreamError {
    /// Create a capture error
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Create a resources-invalidated error
    pub fn invalidated(msg: impl Into<String>) -> Self {
        Self::ResourcesInvalidated(msg.into())
    }

    /// Create an encoder error
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Create a compressor error
    pub fn compressor(msg: impl Into<String>) -> Self {
        Self::Compressor(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error means the capture resource chain must be torn down
    pub fn is_invalidating(&self) -> bool {
        match self {
            Self::ResourcesInvalidated(_) => true,
            Self::WithContext { source, .. } => source.is_invalidating(),
            _ => false,
        }
    }

    /// A short hint for the user on how to resolve the error, if one exists
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Capture(_) | Self::ResourcesInvalidated(_) => Some(
                "The capture backend recovers on its own; if it keeps failing try --backend legacy or --backend null",
            ),
            Self::Encoder(_) | Self::Compressor(_) => {
                Some("Make sure FFmpeg is built with libx264 (run `deskstream info`)")
            }
            Self::Config(_) => {
                Some("Check ~/.config/deskstream/config.toml or run `deskstream config sample`")
            }
            Self::Unsupported(_) => Some("Use --backend null on platforms without a screen capture API"),
            Self::Io(_) => None,
            Self::WithContext { source, .. } => source.user_hint(),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

// Conversions from external error types

impl From<ffmpeg_next::Error> for DeskstreamError {
    fn from(err: ffmpeg_next::Error) -> Self {
        Self::Encoder(err.to_string())
    }
}

impl From<toml::de::Error> for DeskstreamError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse config file: {}", err))
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for DeskstreamError {
    fn from(err: windows::core::Error) -> Self {
        Self::Capture(format!("{} (0x{:08x})", err.message(), err.code().0))
    }
}
