//! Legacy screen-copy capture backend
//!
//! Resource chain: screen device context, memory device context, bitmap
//! bound to raw memory. Each frame block-copies the visible desktop into the
//! bitmap and overlays the cursor on top.

use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::cursor::{overlay_cursor, CursorApi};
use super::{DisplayMetrics, FrameSource};
use crate::error::{DeskstreamError, Result};
use crate::frame::{BlankFrame, Frame};
use crate::geometry::FrameSize;
use crate::timing::RecoveryTimeout;

/// Memory backing a capture bitmap
pub trait BitmapMemory {
    /// Tightly packed BGRA rows, top-down
    fn pixels(&self) -> &[u8];
}

/// Platform operations the legacy backend is built from
///
/// The memory device context doubles as the cursor canvas. Dropping a
/// resource releases it.
pub trait LegacyApi: DisplayMetrics + CursorApi {
    /// Device context of the visible desktop
    type ScreenDc;
    /// Off-screen bitmap, selected into the memory context for its lifetime
    type Bitmap: BitmapMemory;

    /// Obtain the desktop device context
    fn screen_dc(&self) -> Result<Self::ScreenDc>;

    /// Create a memory device context compatible with `screen`
    fn memory_dc(&self, screen: &Self::ScreenDc) -> Result<Self::Canvas>;

    /// Create a 32-bit top-down bitmap of `size` and select it into `canvas`
    fn bitmap(&self, canvas: &Self::Canvas, size: FrameSize) -> Result<Self::Bitmap>;

    /// Block-copy the desktop into the bitmap selected into `canvas`
    ///
    /// Fails with [`DeskstreamError::ResourcesInvalidated`] when the whole
    /// context chain has gone stale.
    fn copy_screen(&self, screen: &Self::ScreenDc, canvas: &Self::Canvas, size: FrameSize)
        -> Result<()>;
}

/// How a capture attempt failed
enum Failure {
    /// A resource could not be created; wait for the recovery timeout
    Acquisition(DeskstreamError),
    /// The copy failed but the resources are still good
    Transient(DeskstreamError),
    /// The resource chain is stale and must be rebuilt
    Invalidated(DeskstreamError),
}

/// Legacy screen-copy capturer
pub struct LegacyCapturer<A: LegacyApi> {
    api: A,
    timeout: RecoveryTimeout,
    // Release order matters: bitmap, then memory DC, then screen DC
    bitmap: Option<A::Bitmap>,
    memory_dc: Option<A::Canvas>,
    screen_dc: Option<A::ScreenDc>,
    size: FrameSize,
    blank: BlankFrame,
}

impl<A: LegacyApi> LegacyCapturer<A> {
    /// Create a capturer with the given recovery cooldown
    pub fn new(api: A, recovery_interval: Duration) -> Self {
        Self {
            api,
            timeout: RecoveryTimeout::new(recovery_interval),
            bitmap: None,
            memory_dc: None,
            screen_dc: None,
            size: FrameSize::default(),
            blank: BlankFrame::new(),
        }
    }

    /// Platform layer
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Whether the full resource chain is currently held
    pub fn has_resources(&self) -> bool {
        self.screen_dc.is_some() && self.memory_dc.is_some() && self.bitmap.is_some()
    }

    fn release_size_dependent(&mut self) {
        self.bitmap = None;
        self.memory_dc = None;
    }

    fn release_all(&mut self) {
        self.release_size_dependent();
        self.screen_dc = None;
    }

    fn capture(&mut self, size: FrameSize) -> std::result::Result<(), Failure> {
        if self.screen_dc.is_none() {
            debug!("Obtaining screen DC");
            let dc = self.api.screen_dc().map_err(|e| {
                Failure::Acquisition(e.with_context("Could not obtain screen DC"))
            })?;
            self.screen_dc = Some(dc);
        }

        if self.size != size {
            debug!("New frame size {}, recreating capturer resources", size);
            self.release_size_dependent();
            self.size = size;
        }

        let Some(screen_dc) = self.screen_dc.as_ref() else {
            return Err(Failure::Acquisition(DeskstreamError::capture("Screen DC missing")));
        };

        if self.memory_dc.is_none() {
            debug!("Creating bitmap DC");
            let dc = self.api.memory_dc(screen_dc).map_err(|e| {
                Failure::Acquisition(e.with_context("Could not create bitmap DC"))
            })?;
            self.memory_dc = Some(dc);
        }
        let Some(memory_dc) = self.memory_dc.as_ref() else {
            return Err(Failure::Acquisition(DeskstreamError::capture("Bitmap DC missing")));
        };

        if self.bitmap.is_none() {
            debug!("Creating bitmap");
            let bitmap = self
                .api
                .bitmap(memory_dc, size)
                .map_err(|e| Failure::Acquisition(e.with_context("Could not create bitmap")))?;
            self.bitmap = Some(bitmap);
        }

        trace!("Capturing screen image");
        self.api
            .copy_screen(screen_dc, memory_dc, size)
            .map_err(|e| {
                if e.is_invalidating() {
                    Failure::Invalidated(e)
                } else {
                    Failure::Transient(e)
                }
            })?;

        overlay_cursor(&self.api, memory_dc);
        Ok(())
    }
}

impl<A: LegacyApi> FrameSource for LegacyCapturer<A> {
    fn frame(&mut self) -> Frame<'_> {
        let size = self.api.screen_size();

        if size.is_empty() || !self.timeout.is_elapsed() {
            return self.blank.frame(size);
        }

        let mut restored = false;
        loop {
            match self.capture(size) {
                Ok(()) => break,
                Err(Failure::Invalidated(e)) if !restored => {
                    info!("Restoring capturer resources after: {}", e);
                    self.release_all();
                    restored = true;
                }
                Err(Failure::Invalidated(e)) => {
                    warn!("Capturer resources invalidated again: {}", e);
                    self.release_all();
                    return self.blank.frame(size);
                }
                Err(Failure::Transient(e)) => {
                    // Normal under some circumstances, e.g. a secure desktop
                    trace!("Could not capture screen image: {}", e);
                    return self.blank.frame(size);
                }
                Err(Failure::Acquisition(e)) => {
                    warn!("{}", e);
                    self.timeout.start();
                    return self.blank.frame(size);
                }
            }
        }

        match self.bitmap.as_ref() {
            Some(bitmap) => Frame::packed(size, bitmap.pixels()),
            None => self.blank.frame(size),
        }
    }
}
