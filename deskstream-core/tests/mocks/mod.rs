//! Mock infrastructure for testing
//!
//! Fake platform layers for the capture state machines, a fake codec for the
//! encoder, and frame helpers. Fakes count resource creation and release
//! through shared cells so tests can inspect them after handing the fake to
//! its owner.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::ops::Deref;
use std::rc::Rc;

use deskstream_core::capture::{
    BitmapMemory, Cursor, CursorApi, DisplayMetrics, HardwareApi, LegacyApi, LockedSurface,
};
use deskstream_core::encode::{
    Codec, CompressorSettings, Compressor, Converter, EncodedPacket,
};
use deskstream_core::error::{DeskstreamError, Result};
use deskstream_core::frame::{min_pitch, Frame, FrameBuffer};
use deskstream_core::geometry::{FramePos, FrameSize};
use deskstream_core::sink::Sink;

/// Fill byte of fake captured pixels
pub const CAPTURED_FILL: u8 = 0xC3;

/// Create a test frame with solid color
///
/// # Arguments
/// * `width` - Frame width in pixels
/// * `height` - Frame height in pixels
/// * `color` - BGRA color values [B, G, R, A]
pub fn create_test_frame(width: u32, height: u32, color: [u8; 4]) -> FrameBuffer {
    let size = FrameSize::new(width, height);
    let mut buffer = FrameBuffer::new(size, min_pitch(size));
    for pixel in buffer.data_mut().chunks_exact_mut(4) {
        pixel.copy_from_slice(&color);
    }
    buffer
}

/// Sink recording every delivery
pub fn recording_sink() -> (Rc<RefCell<Vec<Vec<u8>>>>, impl Sink + 'static) {
    let deliveries = Rc::new(RefCell::new(Vec::new()));
    let recorder = deliveries.clone();
    (deliveries, move |data: &[u8]| {
        recorder.borrow_mut().push(data.to_vec())
    })
}

/// A fake OS handle that counts its release
pub struct Token {
    released: Rc<Cell<u32>>,
}

impl Token {
    fn new(released: &Rc<Cell<u32>>) -> Self {
        Self {
            released: released.clone(),
        }
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

/// How the fake block copy behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyBehavior {
    Succeed,
    /// Fails without affecting resources
    Transient,
    /// Reports the resource chain as stale
    Invalidate,
}

/// Fake GDI layer
pub struct FakeLegacy {
    pub size: Cell<FrameSize>,
    pub fail_screen_dc: Cell<bool>,
    pub fail_bitmap: Cell<bool>,
    pub copy: Cell<CopyBehavior>,
    /// Invalidations to report before copies succeed again
    pub invalidations_left: Cell<u32>,
    pub cursor_visible: Cell<bool>,
    pub cursor_query_fails: Cell<bool>,
    pub cursor_draw_fails: Cell<bool>,
    pub screen_dc_attempts: Cell<u32>,
    pub screen_dcs: Cell<u32>,
    pub memory_dcs: Cell<u32>,
    pub bitmaps: Cell<u32>,
    pub copies: Cell<u32>,
    pub cursor_draws: RefCell<Vec<FramePos>>,
    pub released: Rc<Cell<u32>>,
}

impl FakeLegacy {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size: Cell::new(size),
            fail_screen_dc: Cell::new(false),
            fail_bitmap: Cell::new(false),
            copy: Cell::new(CopyBehavior::Succeed),
            invalidations_left: Cell::new(0),
            cursor_visible: Cell::new(false),
            cursor_query_fails: Cell::new(false),
            cursor_draw_fails: Cell::new(false),
            screen_dc_attempts: Cell::new(0),
            screen_dcs: Cell::new(0),
            memory_dcs: Cell::new(0),
            bitmaps: Cell::new(0),
            copies: Cell::new(0),
            cursor_draws: RefCell::new(Vec::new()),
            released: Rc::new(Cell::new(0)),
        }
    }
}

pub struct FakeBitmap {
    pixels: Vec<u8>,
    _token: Token,
}

impl BitmapMemory for FakeBitmap {
    fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl DisplayMetrics for FakeLegacy {
    fn screen_size(&self) -> FrameSize {
        self.size.get()
    }
}

impl CursorApi for FakeLegacy {
    type Shape = ();
    type Canvas = Token;

    fn query_cursor(&self) -> Result<Option<Cursor<()>>> {
        if self.cursor_query_fails.get() {
            return Err(DeskstreamError::capture("GetCursorInfo failed"));
        }
        Ok(self.cursor_visible.get().then(|| Cursor {
            shape: (),
            position: FramePos::new(10, 10),
            hotspot: FramePos::new(2, 3),
        }))
    }

    fn draw_cursor(&self, _canvas: &Token, _shape: &(), origin: FramePos) -> Result<()> {
        if self.cursor_draw_fails.get() {
            return Err(DeskstreamError::capture("DrawIconEx failed"));
        }
        self.cursor_draws.borrow_mut().push(origin);
        Ok(())
    }
}

impl LegacyApi for FakeLegacy {
    type ScreenDc = Token;
    type Bitmap = FakeBitmap;

    fn screen_dc(&self) -> Result<Token> {
        self.screen_dc_attempts.set(self.screen_dc_attempts.get() + 1);
        if self.fail_screen_dc.get() {
            return Err(DeskstreamError::capture("no screen DC"));
        }
        self.screen_dcs.set(self.screen_dcs.get() + 1);
        Ok(Token::new(&self.released))
    }

    fn memory_dc(&self, _screen: &Token) -> Result<Token> {
        self.memory_dcs.set(self.memory_dcs.get() + 1);
        Ok(Token::new(&self.released))
    }

    fn bitmap(&self, _canvas: &Token, size: FrameSize) -> Result<FakeBitmap> {
        if self.fail_bitmap.get() {
            return Err(DeskstreamError::capture("out of GDI objects"));
        }
        self.bitmaps.set(self.bitmaps.get() + 1);
        Ok(FakeBitmap {
            pixels: vec![CAPTURED_FILL; min_pitch(size) * size.height as usize],
            _token: Token::new(&self.released),
        })
    }

    fn copy_screen(&self, _screen: &Token, _canvas: &Token, _size: FrameSize) -> Result<()> {
        self.copies.set(self.copies.get() + 1);
        if self.invalidations_left.get() > 0 {
            self.invalidations_left.set(self.invalidations_left.get() - 1);
            return Err(DeskstreamError::invalidated("error 6"));
        }
        match self.copy.get() {
            CopyBehavior::Succeed => Ok(()),
            CopyBehavior::Transient => Err(DeskstreamError::capture("secure desktop")),
            CopyBehavior::Invalidate => Err(DeskstreamError::invalidated("error 6")),
        }
    }
}

/// Fake Direct3D layer
pub struct FakeHardware {
    pub size: Cell<FrameSize>,
    /// Extra bytes at the end of each surface row
    pub row_padding: usize,
    pub fail_interface: Cell<bool>,
    pub capture_fails: Cell<bool>,
    pub capture_invalidates: Cell<bool>,
    pub lock_fails: Cell<bool>,
    pub surface_dc_fails: Cell<bool>,
    pub cursor_query_fails: Cell<bool>,
    pub cursor_draw_fails: Cell<bool>,
    pub interfaces: Cell<u32>,
    pub devices: Cell<u32>,
    pub surfaces: Cell<u32>,
    pub captures: Cell<u32>,
    pub dcs_released: Cell<u32>,
    pub unlocks: Cell<u32>,
    pub cursor_draws: Cell<u32>,
    pub released: Rc<Cell<u32>>,
}

impl FakeHardware {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size: Cell::new(size),
            row_padding: 16,
            fail_interface: Cell::new(false),
            capture_fails: Cell::new(false),
            capture_invalidates: Cell::new(false),
            lock_fails: Cell::new(false),
            surface_dc_fails: Cell::new(false),
            cursor_query_fails: Cell::new(false),
            cursor_draw_fails: Cell::new(false),
            interfaces: Cell::new(0),
            devices: Cell::new(0),
            surfaces: Cell::new(0),
            captures: Cell::new(0),
            dcs_released: Cell::new(0),
            unlocks: Cell::new(0),
            cursor_draws: Cell::new(0),
            released: Rc::new(Cell::new(0)),
        }
    }
}

pub struct FakeSurface {
    size: FrameSize,
    pitch: usize,
    pixels: Vec<u8>,
    _token: Token,
}

pub struct FakeSurfaceDc<'a> {
    released: &'a Cell<u32>,
}

impl Deref for FakeSurfaceDc<'_> {
    type Target = ();

    fn deref(&self) -> &() {
        &()
    }
}

impl Drop for FakeSurfaceDc<'_> {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

pub struct FakeLock<'a> {
    surface: &'a FakeSurface,
    unlocks: &'a Cell<u32>,
}

impl LockedSurface for FakeLock<'_> {
    fn pitch(&self) -> usize {
        self.surface.pitch
    }

    fn bits(&self) -> &[u8] {
        &self.surface.pixels
    }
}

impl Drop for FakeLock<'_> {
    fn drop(&mut self) {
        self.unlocks.set(self.unlocks.get() + 1);
    }
}

impl DisplayMetrics for FakeHardware {
    fn screen_size(&self) -> FrameSize {
        self.size.get()
    }
}

impl CursorApi for FakeHardware {
    type Shape = ();
    type Canvas = ();

    fn query_cursor(&self) -> Result<Option<Cursor<()>>> {
        if self.cursor_query_fails.get() {
            return Err(DeskstreamError::capture("GetCursorInfo failed"));
        }
        Ok(Some(Cursor {
            shape: (),
            position: FramePos::new(0, 0),
            hotspot: FramePos::new(0, 0),
        }))
    }

    fn draw_cursor(&self, _canvas: &(), _shape: &(), _origin: FramePos) -> Result<()> {
        if self.cursor_draw_fails.get() {
            return Err(DeskstreamError::capture("DrawIconEx failed"));
        }
        self.cursor_draws.set(self.cursor_draws.get() + 1);
        Ok(())
    }
}

impl HardwareApi for FakeHardware {
    type Interface = Token;
    type Device = Token;
    type Surface = FakeSurface;
    type SurfaceDc<'a>
        = FakeSurfaceDc<'a>
    where
        Self: 'a;
    type Locked<'a>
        = FakeLock<'a>
    where
        Self: 'a;

    fn create_interface(&self) -> Result<Token> {
        if self.fail_interface.get() {
            return Err(DeskstreamError::capture("no D3D9 runtime"));
        }
        self.interfaces.set(self.interfaces.get() + 1);
        Ok(Token::new(&self.released))
    }

    fn create_device(&self, _interface: &Token, _size: FrameSize) -> Result<Token> {
        self.devices.set(self.devices.get() + 1);
        Ok(Token::new(&self.released))
    }

    fn create_surface(&self, _device: &Token, size: FrameSize) -> Result<FakeSurface> {
        self.surfaces.set(self.surfaces.get() + 1);
        let pitch = min_pitch(size) + self.row_padding;
        Ok(FakeSurface {
            size,
            pitch,
            pixels: vec![CAPTURED_FILL; pitch * size.height as usize],
            _token: Token::new(&self.released),
        })
    }

    fn capture(&self, _device: &Token, _surface: &FakeSurface) -> Result<()> {
        self.captures.set(self.captures.get() + 1);
        if self.capture_invalidates.get() {
            return Err(DeskstreamError::invalidated("device lost"));
        }
        if self.capture_fails.get() {
            return Err(DeskstreamError::capture("front buffer unavailable"));
        }
        Ok(())
    }

    fn surface_dc<'a>(&'a self, _surface: &'a FakeSurface) -> Result<FakeSurfaceDc<'a>> {
        if self.surface_dc_fails.get() {
            return Err(DeskstreamError::capture("GetDC on surface failed"));
        }
        Ok(FakeSurfaceDc {
            released: &self.dcs_released,
        })
    }

    fn lock<'a>(&'a self, surface: &'a FakeSurface) -> Result<FakeLock<'a>> {
        if self.lock_fails.get() {
            return Err(DeskstreamError::capture("surface busy"));
        }
        Ok(FakeLock {
            surface,
            unlocks: &self.unlocks,
        })
    }
}

/// Counters and switches shared between a fake codec and its resources
#[derive(Default)]
pub struct CodecLog {
    pub converters: Cell<u32>,
    pub pictures: Cell<u32>,
    pub compressors: Cell<u32>,
    pub fail_converter: Cell<bool>,
    pub fail_compressor: Cell<bool>,
    pub fail_compress: Cell<bool>,
    pub fail_drain: Cell<bool>,
    pub converted_sizes: RefCell<Vec<FrameSize>>,
    pub pts: RefCell<Vec<i64>>,
    pub settings: RefCell<Vec<CompressorSettings>>,
}

/// Fake codec emitting one access unit per frame
///
/// The compressor holds back up to `delay` frames, like a lookahead.
#[derive(Clone)]
pub struct FakeCodec {
    pub log: Rc<CodecLog>,
    pub delay: usize,
}

impl FakeCodec {
    pub fn new() -> Self {
        Self::with_delay(0)
    }

    pub fn with_delay(delay: usize) -> Self {
        Self {
            log: Rc::new(CodecLog::default()),
            delay,
        }
    }
}

/// Access unit for `pts`: an SPS-like and a slice-like NAL unit
pub fn access_unit(pts: i64) -> Vec<u8> {
    vec![0, 0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x65, pts as u8]
}

pub struct FakeConverter {
    log: Rc<CodecLog>,
    target: FrameSize,
}

impl Converter for FakeConverter {
    type Picture = FrameSize;

    fn convert(&mut self, frame: &Frame<'_>, picture: &mut FrameSize) -> Result<()> {
        self.log.converted_sizes.borrow_mut().push(frame.size);
        *picture = self.target;
        Ok(())
    }
}

pub struct FakeCompressor {
    log: Rc<CodecLog>,
    delay: usize,
    held: Vec<i64>,
}

impl FakeCompressor {
    fn packet(pts: i64) -> EncodedPacket {
        EncodedPacket {
            data: access_unit(pts),
            pts,
            dts: pts,
            keyframe: pts == 0,
        }
    }
}

impl Compressor for FakeCompressor {
    type Picture = FrameSize;

    fn compress(&mut self, _picture: &mut FrameSize, pts: i64) -> Result<Vec<EncodedPacket>> {
        if self.log.fail_compress.get() {
            return Err(DeskstreamError::compressor("x264_encoder_encode failed"));
        }
        self.log.pts.borrow_mut().push(pts);
        self.held.push(pts);
        if self.held.len() > self.delay {
            let pts = self.held.remove(0);
            Ok(vec![Self::packet(pts)])
        } else {
            Ok(Vec::new())
        }
    }

    fn drain(&mut self) -> Result<Vec<EncodedPacket>> {
        if self.log.fail_drain.get() {
            return Err(DeskstreamError::compressor("x264_encoder_encode failed"));
        }
        if self.held.is_empty() {
            return Ok(Vec::new());
        }
        let pts = self.held.remove(0);
        Ok(vec![Self::packet(pts)])
    }

    fn delayed_frames(&self) -> usize {
        self.held.len()
    }
}

impl Codec for FakeCodec {
    type Picture = FrameSize;
    type Converter = FakeConverter;
    type Compressor = FakeCompressor;

    fn converter(&self, _source: FrameSize, target: FrameSize) -> Result<FakeConverter> {
        if self.log.fail_converter.get() {
            return Err(DeskstreamError::encoder("sws_getContext failed"));
        }
        self.log.converters.set(self.log.converters.get() + 1);
        Ok(FakeConverter {
            log: self.log.clone(),
            target,
        })
    }

    fn picture(&self, size: FrameSize) -> Result<FrameSize> {
        self.log.pictures.set(self.log.pictures.get() + 1);
        Ok(size)
    }

    fn compressor(&self, settings: &CompressorSettings) -> Result<FakeCompressor> {
        if self.log.fail_compressor.get() {
            return Err(DeskstreamError::compressor("x264_encoder_open failed"));
        }
        self.log.compressors.set(self.log.compressors.get() + 1);
        self.log.settings.borrow_mut().push(settings.clone());
        Ok(FakeCompressor {
            log: self.log.clone(),
            delay: self.delay,
            held: Vec::new(),
        })
    }
}
