//! GDI platform layer for the legacy backend
//!
//! Every handle is owned by a wrapper that releases it on drop.

use std::ffi::c_void;
use std::ptr;

use windows::Win32::Foundation::{ERROR_INVALID_HANDLE, HANDLE, HWND, POINT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GdiFlush, GetDC,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, CAPTUREBLT, DIB_RGB_COLORS,
    HBITMAP, HDC, HGDIOBJ, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DrawIcon, GetCursorInfo, GetIconInfo, GetSystemMetrics, CURSORINFO, CURSOR_SHOWING, HCURSOR,
    HICON, ICONINFO, SM_CXSCREEN, SM_CYSCREEN,
};

use super::cursor::{Cursor, CursorApi};
use super::legacy::{BitmapMemory, LegacyApi};
use super::DisplayMetrics;
use crate::error::{DeskstreamError, Result};
use crate::frame::min_pitch;
use crate::geometry::{FramePos, FrameSize};

/// Primary screen size from system metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMetrics;

impl DisplayMetrics for SystemMetrics {
    fn screen_size(&self) -> FrameSize {
        let (width, height) =
            unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        FrameSize::new(width.max(0) as u32, height.max(0) as u32)
    }
}

/// Desktop device context
pub struct ScreenDc(HDC);

impl Drop for ScreenDc {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(HWND::default(), self.0);
        }
    }
}

/// Memory device context compatible with the screen
pub struct MemoryDc(HDC);

impl MemoryDc {
    pub fn hdc(&self) -> HDC {
        self.0
    }
}

impl Drop for MemoryDc {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteDC(self.0);
        }
    }
}

/// DIB section selected into a memory DC
///
/// Restores the DC's previous object before deleting the bitmap.
pub struct DibBitmap {
    dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    bits: *const u8,
    len: usize,
}

impl BitmapMemory for DibBitmap {
    fn pixels(&self) -> &[u8] {
        unsafe {
            // Pending GDI calls may still target the bitmap
            let _ = GdiFlush();
            std::slice::from_raw_parts(self.bits, self.len)
        }
    }
}

impl Drop for DibBitmap {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
            let _ = DeleteObject(HGDIOBJ(self.bitmap.0));
        }
    }
}

/// Query the visible cursor
pub(crate) fn query_cursor() -> Result<Option<Cursor<HCURSOR>>> {
    let mut info = CURSORINFO {
        cbSize: std::mem::size_of::<CURSORINFO>() as u32,
        ..Default::default()
    };
    unsafe { GetCursorInfo(&mut info) }
        .map_err(|e| DeskstreamError::from(e).with_context("Could not get cursor info"))?;

    if info.flags != CURSOR_SHOWING || info.hCursor.is_invalid() {
        return Ok(None);
    }

    let mut icon = ICONINFO::default();
    unsafe { GetIconInfo(HICON(info.hCursor.0), &mut icon) }
        .map_err(|e| DeskstreamError::from(e).with_context("Could not get cursor icon info"))?;

    // GetIconInfo hands us copies of the icon bitmaps
    unsafe {
        if !icon.hbmMask.is_invalid() {
            let _ = DeleteObject(HGDIOBJ(icon.hbmMask.0));
        }
        if !icon.hbmColor.is_invalid() {
            let _ = DeleteObject(HGDIOBJ(icon.hbmColor.0));
        }
    }

    let POINT { x, y } = info.ptScreenPos;
    Ok(Some(Cursor {
        shape: info.hCursor,
        position: FramePos::new(x, y),
        hotspot: FramePos::new(icon.xHotspot as i32, icon.yHotspot as i32),
    }))
}

/// Draw a cursor shape onto `hdc`
pub(crate) fn draw_cursor(hdc: HDC, shape: HCURSOR, origin: FramePos) -> Result<()> {
    unsafe { DrawIcon(hdc, origin.x, origin.y, HICON(shape.0)) }
        .map_err(|e| DeskstreamError::from(e).with_context("Could not draw cursor"))
}

/// GDI screen access
#[derive(Debug, Default)]
pub struct GdiScreen {
    metrics: SystemMetrics,
}

impl GdiScreen {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplayMetrics for GdiScreen {
    fn screen_size(&self) -> FrameSize {
        self.metrics.screen_size()
    }
}

impl CursorApi for GdiScreen {
    type Shape = HCURSOR;
    type Canvas = MemoryDc;

    fn query_cursor(&self) -> Result<Option<Cursor<HCURSOR>>> {
        query_cursor()
    }

    fn draw_cursor(&self, canvas: &MemoryDc, shape: &HCURSOR, origin: FramePos) -> Result<()> {
        draw_cursor(canvas.hdc(), *shape, origin)
    }
}

impl LegacyApi for GdiScreen {
    type ScreenDc = ScreenDc;
    type Bitmap = DibBitmap;

    fn screen_dc(&self) -> Result<ScreenDc> {
        let hdc = unsafe { GetDC(HWND::default()) };
        if hdc.is_invalid() {
            return Err(DeskstreamError::capture("GetDC returned no screen DC"));
        }
        Ok(ScreenDc(hdc))
    }

    fn memory_dc(&self, screen: &ScreenDc) -> Result<MemoryDc> {
        let hdc = unsafe { CreateCompatibleDC(screen.0) };
        if hdc.is_invalid() {
            return Err(DeskstreamError::capture("CreateCompatibleDC failed"));
        }
        Ok(MemoryDc(hdc))
    }

    fn bitmap(&self, canvas: &MemoryDc, size: FrameSize) -> Result<DibBitmap> {
        let info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: size.width as i32,
                // Negative height = top-down rows
                biHeight: -(size.height as i32),
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut bits: *mut c_void = ptr::null_mut();
        let bitmap = unsafe {
            CreateDIBSection(canvas.hdc(), &info, DIB_RGB_COLORS, &mut bits, HANDLE::default(), 0)
        }?;
        if bits.is_null() {
            unsafe {
                let _ = DeleteObject(HGDIOBJ(bitmap.0));
            }
            return Err(DeskstreamError::capture("CreateDIBSection returned no pixel memory"));
        }

        let previous = unsafe { SelectObject(canvas.hdc(), HGDIOBJ(bitmap.0)) };
        if previous.is_invalid() {
            unsafe {
                let _ = DeleteObject(HGDIOBJ(bitmap.0));
            }
            return Err(DeskstreamError::capture("Could not select bitmap into DC"));
        }

        Ok(DibBitmap {
            dc: canvas.hdc(),
            bitmap,
            previous,
            bits: bits as *const u8,
            len: min_pitch(size) * size.height as usize,
        })
    }

    fn copy_screen(&self, screen: &ScreenDc, canvas: &MemoryDc, size: FrameSize) -> Result<()> {
        unsafe {
            BitBlt(
                canvas.hdc(),
                0,
                0,
                size.width as i32,
                size.height as i32,
                screen.0,
                0,
                0,
                SRCCOPY | CAPTUREBLT,
            )
        }
        .map_err(|e| {
            if e.code() == ERROR_INVALID_HANDLE.to_hresult() {
                DeskstreamError::invalidated(format!("BitBlt: {}", e.message()))
            } else {
                DeskstreamError::from(e).with_context("BitBlt failed")
            }
        })
    }
}
