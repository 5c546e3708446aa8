//! Direct3D 9 platform layer for the hardware backend

use std::ops::Deref;

use windows::Win32::Foundation::HANDLE;
use windows::Win32::Graphics::Direct3D9::{
    Direct3DCreate9, IDirect3D9, IDirect3DDevice9, IDirect3DSurface9, D3DADAPTER_DEFAULT,
    D3DCREATE_SOFTWARE_VERTEXPROCESSING, D3DDEVTYPE_HAL, D3DERR_DEVICELOST, D3DFMT_A8R8G8B8,
    D3DLOCKED_RECT, D3DLOCK_READONLY, D3DPOOL_SYSTEMMEM, D3DPRESENT_PARAMETERS,
    D3DSURFACE_DESC, D3DSWAPEFFECT_DISCARD, D3D_SDK_VERSION,
};
use windows::Win32::Graphics::Gdi::HDC;
use windows::Win32::UI::WindowsAndMessaging::{GetDesktopWindow, HCURSOR};

use super::cursor::{Cursor, CursorApi};
use super::gdi::{self, SystemMetrics};
use super::hardware::{HardwareApi, LockedSurface};
use super::DisplayMetrics;
use crate::error::{DeskstreamError, Result};
use crate::geometry::{FramePos, FrameSize};

/// DC borrowed from a surface, released on drop
pub struct SurfaceDc<'a> {
    surface: &'a IDirect3DSurface9,
    hdc: HDC,
}

impl Deref for SurfaceDc<'_> {
    type Target = HDC;

    fn deref(&self) -> &HDC {
        &self.hdc
    }
}

impl Drop for SurfaceDc<'_> {
    fn drop(&mut self) {
        unsafe {
            let _ = self.surface.ReleaseDC(self.hdc);
        }
    }
}

/// Read lock over a surface, unlocked on drop
pub struct SurfaceLock<'a> {
    surface: &'a IDirect3DSurface9,
    pitch: usize,
    bits: &'a [u8],
}

impl LockedSurface for SurfaceLock<'_> {
    fn pitch(&self) -> usize {
        self.pitch
    }

    fn bits(&self) -> &[u8] {
        self.bits
    }
}

impl Drop for SurfaceLock<'_> {
    fn drop(&mut self) {
        unsafe {
            let _ = self.surface.UnlockRect();
        }
    }
}

/// Direct3D 9 screen access
#[derive(Debug, Default)]
pub struct D3d9Screen {
    metrics: SystemMetrics,
}

impl D3d9Screen {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplayMetrics for D3d9Screen {
    fn screen_size(&self) -> FrameSize {
        self.metrics.screen_size()
    }
}

impl CursorApi for D3d9Screen {
    type Shape = HCURSOR;
    type Canvas = HDC;

    fn query_cursor(&self) -> Result<Option<Cursor<HCURSOR>>> {
        gdi::query_cursor()
    }

    fn draw_cursor(&self, canvas: &HDC, shape: &HCURSOR, origin: FramePos) -> Result<()> {
        gdi::draw_cursor(*canvas, *shape, origin)
    }
}

impl HardwareApi for D3d9Screen {
    type Interface = IDirect3D9;
    type Device = IDirect3DDevice9;
    type Surface = IDirect3DSurface9;
    type SurfaceDc<'a>
        = SurfaceDc<'a>
    where
        Self: 'a;
    type Locked<'a>
        = SurfaceLock<'a>
    where
        Self: 'a;

    fn create_interface(&self) -> Result<IDirect3D9> {
        unsafe { Direct3DCreate9(D3D_SDK_VERSION) }
            .ok_or_else(|| DeskstreamError::capture("Direct3DCreate9 returned no interface"))
    }

    fn create_device(&self, interface: &IDirect3D9, size: FrameSize) -> Result<IDirect3DDevice9> {
        let window = unsafe { GetDesktopWindow() };
        let mut params = D3DPRESENT_PARAMETERS {
            BackBufferWidth: size.width,
            BackBufferHeight: size.height,
            BackBufferFormat: D3DFMT_A8R8G8B8,
            BackBufferCount: 1,
            SwapEffect: D3DSWAPEFFECT_DISCARD,
            hDeviceWindow: window,
            Windowed: true.into(),
            ..Default::default()
        };

        let mut device = None;
        unsafe {
            interface.CreateDevice(
                D3DADAPTER_DEFAULT,
                D3DDEVTYPE_HAL,
                window,
                D3DCREATE_SOFTWARE_VERTEXPROCESSING as u32,
                &mut params,
                &mut device,
            )
        }?;
        device.ok_or_else(|| DeskstreamError::capture("CreateDevice returned no device"))
    }

    fn create_surface(
        &self,
        device: &IDirect3DDevice9,
        size: FrameSize,
    ) -> Result<IDirect3DSurface9> {
        let mut surface = None;
        unsafe {
            device.CreateOffscreenPlainSurface(
                size.width,
                size.height,
                D3DFMT_A8R8G8B8,
                D3DPOOL_SYSTEMMEM,
                &mut surface,
                std::ptr::null_mut::<HANDLE>(),
            )
        }?;
        surface.ok_or_else(|| {
            DeskstreamError::capture("CreateOffscreenPlainSurface returned no surface")
        })
    }

    fn capture(&self, device: &IDirect3DDevice9, surface: &IDirect3DSurface9) -> Result<()> {
        unsafe { device.GetFrontBufferData(0, surface) }.map_err(|e| {
            if e.code() == D3DERR_DEVICELOST {
                DeskstreamError::invalidated(format!("GetFrontBufferData: {}", e.message()))
            } else {
                DeskstreamError::from(e)
            }
        })
    }

    fn surface_dc<'a>(&'a self, surface: &'a IDirect3DSurface9) -> Result<SurfaceDc<'a>> {
        let mut hdc = HDC::default();
        unsafe { surface.GetDC(&mut hdc) }?;
        Ok(SurfaceDc { surface, hdc })
    }

    fn lock<'a>(&'a self, surface: &'a IDirect3DSurface9) -> Result<SurfaceLock<'a>> {
        let mut desc = D3DSURFACE_DESC::default();
        unsafe { surface.GetDesc(&mut desc) }?;

        let mut rect = D3DLOCKED_RECT::default();
        unsafe { surface.LockRect(&mut rect, std::ptr::null(), D3DLOCK_READONLY as u32) }?;

        if rect.pBits.is_null() || rect.Pitch <= 0 {
            unsafe {
                let _ = surface.UnlockRect();
            }
            return Err(DeskstreamError::capture("LockRect returned no pixel memory"));
        }

        let pitch = rect.Pitch as usize;
        let len = pitch * desc.Height as usize;
        // Valid until UnlockRect, which only runs when the lock drops
        let bits = unsafe { std::slice::from_raw_parts(rect.pBits as *const u8, len) };
        Ok(SurfaceLock {
            surface,
            pitch,
            bits,
        })
    }
}
