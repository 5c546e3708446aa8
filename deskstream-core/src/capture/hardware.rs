//! Hardware front-buffer capture backend
//!
//! Resource chain: graphics interface, device sized to the screen, offscreen
//! system-memory surface. Each frame reads the front buffer into the
//! surface, draws the cursor through a temporary surface DC, then locks the
//! surface and copies its rows into an owned buffer.

use std::ops::Deref;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::cursor::{overlay_cursor, CursorApi};
use super::{DisplayMetrics, FrameSource, InterruptFlag};
use crate::error::{DeskstreamError, Result};
use crate::frame::{min_pitch, BlankFrame, Frame, FrameBuffer};
use crate::geometry::FrameSize;
use crate::timing::RecoveryTimeout;

/// Pixel rows of a locked surface
pub trait LockedSurface {
    /// Bytes per row
    fn pitch(&self) -> usize;
    /// Locked bytes, at least `pitch * height` long
    fn bits(&self) -> &[u8];
}

/// Platform operations the hardware backend is built from
///
/// Dropping a resource releases it. Surface DCs and locks are scoped: they
/// are released when the returned guard drops.
pub trait HardwareApi: DisplayMetrics + CursorApi {
    /// Graphics API entry point
    type Interface;
    /// Device bound to the primary adapter
    type Device;
    /// Offscreen surface in system memory
    type Surface;
    /// Device context obtained from a surface
    type SurfaceDc<'a>: Deref<Target = Self::Canvas>
    where
        Self: 'a;
    /// Lock over a surface's pixels
    type Locked<'a>: LockedSurface
    where
        Self: 'a;

    /// Create the graphics interface
    fn create_interface(&self) -> Result<Self::Interface>;

    /// Create a device with a back buffer of `size`
    fn create_device(&self, interface: &Self::Interface, size: FrameSize) -> Result<Self::Device>;

    /// Create an offscreen 32-bit surface of `size`
    fn create_surface(&self, device: &Self::Device, size: FrameSize) -> Result<Self::Surface>;

    /// Copy the front buffer into `surface`
    fn capture(&self, device: &Self::Device, surface: &Self::Surface) -> Result<()>;

    /// Obtain a device context for drawing onto `surface`
    fn surface_dc<'a>(&'a self, surface: &'a Self::Surface) -> Result<Self::SurfaceDc<'a>>;

    /// Lock `surface` for reading
    fn lock<'a>(&'a self, surface: &'a Self::Surface) -> Result<Self::Locked<'a>>;
}

/// Hardware front-buffer capturer
pub struct HardwareCapturer<A: HardwareApi> {
    api: A,
    timeout: RecoveryTimeout,
    interrupt: InterruptFlag,
    // Release order matters: surface, then device, then interface
    surface: Option<A::Surface>,
    device: Option<A::Device>,
    interface: Option<A::Interface>,
    size: FrameSize,
    buffer: FrameBuffer,
    blank: BlankFrame,
}

impl<A: HardwareApi> HardwareCapturer<A> {
    /// Create a capturer with the given recovery cooldown
    ///
    /// When `interrupt` is raised at drop time, graphics resources are leaked
    /// instead of released.
    pub fn new(api: A, recovery_interval: Duration, interrupt: InterruptFlag) -> Self {
        Self {
            api,
            timeout: RecoveryTimeout::new(recovery_interval),
            interrupt,
            surface: None,
            device: None,
            interface: None,
            size: FrameSize::default(),
            buffer: FrameBuffer::default(),
            blank: BlankFrame::new(),
        }
    }

    /// Platform layer
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Whether the full resource chain is currently held
    pub fn has_resources(&self) -> bool {
        self.interface.is_some() && self.device.is_some() && self.surface.is_some()
    }

    fn release_size_dependent(&mut self) {
        self.surface = None;
        self.device = None;
    }

    fn release_all(&mut self) {
        self.release_size_dependent();
        self.interface = None;
    }

    fn acquire(&mut self, size: FrameSize) -> Result<()> {
        if self.interface.is_none() {
            debug!("Creating D3D interface");
            let interface = self
                .api
                .create_interface()
                .map_err(|e| e.with_context("Could not create D3D interface"))?;
            self.interface = Some(interface);
        }

        if self.size != size {
            debug!("New frame size {}, recreating capturer resources", size);
            self.release_size_dependent();
            self.size = size;
        }

        let interface = self
            .interface
            .as_ref()
            .ok_or_else(|| DeskstreamError::capture("D3D interface missing"))?;

        if self.device.is_none() {
            debug!("Creating D3D device");
            let device = self
                .api
                .create_device(interface, size)
                .map_err(|e| e.with_context("Could not create D3D device"))?;
            self.device = Some(device);
        }
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| DeskstreamError::capture("D3D device missing"))?;

        if self.surface.is_none() {
            debug!("Creating D3D surface");
            let surface = self
                .api
                .create_surface(device, size)
                .map_err(|e| e.with_context("Could not create D3D surface"))?;
            self.surface = Some(surface);
        }
        Ok(())
    }

    /// Lock the surface and copy its rows into the owned buffer
    fn read_surface(&mut self, size: FrameSize) -> Result<()> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| DeskstreamError::capture("D3D surface missing"))?;

        trace!("Locking D3D surface");
        let locked = self
            .api
            .lock(surface)
            .map_err(|e| e.with_context("Could not lock D3D surface"))?;

        let pitch = locked.pitch();
        let len = pitch * size.height as usize;
        if pitch < min_pitch(size) || locked.bits().len() < len {
            return Err(DeskstreamError::capture(format!(
                "Locked surface too small for {} (pitch {}, {} bytes)",
                size,
                pitch,
                locked.bits().len()
            )));
        }

        self.buffer.reshape(size, pitch);
        self.buffer.data_mut()[..len].copy_from_slice(&locked.bits()[..len]);
        Ok(())
    }
}

impl<A: HardwareApi> FrameSource for HardwareCapturer<A> {
    fn frame(&mut self) -> Frame<'_> {
        let size = self.api.screen_size();

        if size.is_empty() || !self.timeout.is_elapsed() {
            return self.blank.frame(size);
        }

        if let Err(e) = self.acquire(size) {
            warn!("{}", e);
            self.timeout.start();
            return self.blank.frame(size);
        }

        let (Some(device), Some(surface)) = (self.device.as_ref(), self.surface.as_ref()) else {
            return self.blank.frame(size);
        };

        trace!("Capturing front buffer");
        if let Err(e) = self.api.capture(device, surface) {
            if e.is_invalidating() {
                info!("Releasing D3D resources after: {}", e);
                self.release_all();
            } else {
                // Normal under some circumstances, e.g. a secure desktop
                trace!("Could not capture front buffer: {}", e);
            }
            return self.blank.frame(size);
        }

        match self.api.surface_dc(surface) {
            Ok(dc) => {
                overlay_cursor(&self.api, &*dc);
            }
            Err(e) => warn!("Could not obtain surface DC: {}", e),
        }

        if let Err(e) = self.read_surface(size) {
            warn!("{}", e);
            self.timeout.start();
            return self.blank.frame(size);
        }

        self.buffer.as_frame()
    }
}

impl<A: HardwareApi> Drop for HardwareCapturer<A> {
    fn drop(&mut self) {
        if self.interrupt.is_raised() {
            // Releasing graphics objects can hang once the process is being
            // interrupted, so hand them to the OS instead.
            debug!("Interrupted, leaking D3D resources");
            std::mem::forget(self.surface.take());
            std::mem::forget(self.device.take());
            std::mem::forget(self.interface.take());
        } else {
            self.release_all();
        }
    }
}
