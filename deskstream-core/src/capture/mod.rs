//! Desktop capture backends
//!
//! This module handles:
//! - The [`FrameSource`] contract shared by all backends
//! - Backend selection from configuration
//! - Lazy resource creation with timeout-gated recovery
//!
//! Backends never fail outward: when capture is impossible they return a
//! blank frame of the current screen size.

pub mod cursor;
pub mod hardware;
pub mod legacy;
pub mod null;

#[cfg(windows)]
pub mod d3d9;
#[cfg(windows)]
pub mod gdi;

pub use cursor::{Cursor, CursorApi};
pub use hardware::{HardwareApi, HardwareCapturer, LockedSurface};
pub use legacy::{BitmapMemory, LegacyApi, LegacyCapturer};
pub use null::NullCapturer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::config::{BackendKind, StreamConfig};
use crate::error::Result;
use crate::frame::Frame;
use crate::geometry::FrameSize;

/// Anything that produces desktop frames on demand
pub trait FrameSource {
    /// Capture the current desktop
    ///
    /// The returned frame borrows the source and is valid until the next call.
    fn frame(&mut self) -> Frame<'_>;
}

/// Source of the current screen dimensions
pub trait DisplayMetrics {
    /// Size of the primary screen in pixels
    fn screen_size(&self) -> FrameSize;
}

/// Display with a fixed, configured size
#[derive(Debug, Clone, Copy)]
pub struct FixedDisplay {
    size: FrameSize,
}

impl FixedDisplay {
    pub fn new(size: FrameSize) -> Self {
        Self { size }
    }
}

impl DisplayMetrics for FixedDisplay {
    fn screen_size(&self) -> FrameSize {
        self.size
    }
}

/// Process-wide interrupt notification
///
/// Raised by the host when the process is being torn down abruptly.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process as interrupted
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Backends available on this platform
pub fn available_backends() -> Vec<BackendKind> {
    let mut backends = vec![BackendKind::Null];
    if cfg!(windows) {
        backends.push(BackendKind::Legacy);
        backends.push(BackendKind::Hardware);
    }
    backends
}

/// Size of the primary screen, falling back to `fallback` where the platform
/// has no system metrics
pub fn screen_size(fallback: FrameSize) -> FrameSize {
    #[cfg(windows)]
    {
        let _ = fallback;
        gdi::SystemMetrics.screen_size()
    }
    #[cfg(not(windows))]
    {
        fallback
    }
}

/// One of the capture backends, selected at construction
pub enum CaptureBackend {
    Null(NullCapturer),
    #[cfg(windows)]
    Legacy(LegacyCapturer<gdi::GdiScreen>),
    #[cfg(windows)]
    Hardware(HardwareCapturer<d3d9::D3d9Screen>),
}

impl CaptureBackend {
    /// Build the backend named by `config`
    #[cfg_attr(not(windows), allow(unused_variables))]
    pub fn from_config(config: &StreamConfig, interrupt: InterruptFlag) -> Result<Self> {
        info!("Using {} capture backend", config.backend);

        match config.backend {
            BackendKind::Null => {
                #[cfg(windows)]
                let display = gdi::SystemMetrics;
                #[cfg(not(windows))]
                let display = FixedDisplay::new(config.screen_size);
                Ok(Self::Null(NullCapturer::new(display)))
            }
            #[cfg(windows)]
            BackendKind::Legacy => Ok(Self::Legacy(LegacyCapturer::new(
                gdi::GdiScreen::new(),
                config.recovery_interval(),
            ))),
            #[cfg(windows)]
            BackendKind::Hardware => Ok(Self::Hardware(HardwareCapturer::new(
                d3d9::D3d9Screen::new(),
                config.recovery_interval(),
                interrupt,
            ))),
            #[cfg(not(windows))]
            kind => Err(crate::error::DeskstreamError::Unsupported(format!(
                "{} capture backend requires Windows",
                kind
            ))),
        }
    }

    /// Which backend this is
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Null(_) => BackendKind::Null,
            #[cfg(windows)]
            Self::Legacy(_) => BackendKind::Legacy,
            #[cfg(windows)]
            Self::Hardware(_) => BackendKind::Hardware,
        }
    }
}

impl FrameSource for CaptureBackend {
    fn frame(&mut self) -> Frame<'_> {
        match self {
            Self::Null(capturer) => capturer.frame(),
            #[cfg(windows)]
            Self::Legacy(capturer) => capturer.frame(),
            #[cfg(windows)]
            Self::Hardware(capturer) => capturer.frame(),
        }
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame(&mut self) -> Frame<'_> {
        (**self).frame()
    }
}
