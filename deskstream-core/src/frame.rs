//! Frame data types
//!
//! A [`Frame`] is a borrowed, pitch-aware view over BGRA pixels. Whoever
//! produced it keeps the memory: a capture backend hands out frames that
//! borrow from itself, so a frame cannot outlive the next `frame()` call.

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::geometry::FrameSize;

/// Bytes per BGRA pixel
pub const BYTES_PER_PIXEL: usize = std::mem::size_of::<Pixel>();

/// Fill byte of blank frames
pub const BLANK_FILL: u8 = 64;

/// One BGRA pixel
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Pixel {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

/// Borrowed view of a captured frame
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Dimensions in pixels
    pub size: FrameSize,
    /// Bytes per row
    pub pitch: usize,
    /// Pixel bytes, at least `pitch * height` long for a valid frame
    pub data: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Create a frame view over `data`
    pub fn new(size: FrameSize, pitch: usize, data: &'a [u8]) -> Self {
        Self { size, pitch, data }
    }

    /// Create a frame view with a tightly packed pitch
    pub fn packed(size: FrameSize, data: &'a [u8]) -> Self {
        Self::new(size, min_pitch(size), data)
    }

    /// Size of the pixel data in bytes
    pub fn data_size(&self) -> usize {
        self.pitch * self.size.height as usize
    }

    /// Whether the frame can be read safely
    pub fn valid(&self) -> bool {
        !self.size.is_empty()
            && self.pitch >= min_pitch(self.size)
            && self.data.len() >= self.data_size()
    }

    /// Row `y` as pixels
    ///
    /// Returns `None` for rows outside the frame.
    pub fn line(&self, y: u32) -> Option<&'a [Pixel]> {
        if y >= self.size.height {
            return None;
        }
        let start = self.pitch * y as usize;
        let row = self.data.get(start..start + min_pitch(self.size))?;
        bytemuck::try_cast_slice(row).ok()
    }
}

/// Minimum pitch for a BGRA row of `size.width` pixels
pub fn min_pitch(size: FrameSize) -> usize {
    size.width as usize * BYTES_PER_PIXEL
}

/// Owned, pitch-aware pixel storage
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    size: FrameSize,
    pitch: usize,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer
    pub fn new(size: FrameSize, pitch: usize) -> Self {
        let pitch = pitch.max(min_pitch(size));
        Self {
            size,
            pitch,
            data: vec![0; pitch * size.height as usize],
        }
    }

    /// Dimensions in pixels
    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Bytes per row
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Resize the buffer, reallocating only when the byte size changes
    ///
    /// Returns true if the storage was reallocated.
    pub fn reshape(&mut self, size: FrameSize, pitch: usize) -> bool {
        let pitch = pitch.max(min_pitch(size));
        let len = pitch * size.height as usize;
        self.size = size;
        self.pitch = pitch;
        if self.data.len() == len {
            return false;
        }
        self.data = vec![0; len];
        true
    }

    /// Mutable pixel bytes
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Borrow as a frame
    pub fn as_frame(&self) -> Frame<'_> {
        Frame::new(self.size, self.pitch, &self.data)
    }
}

/// Reusable solid-color stand-in frame
///
/// Served whenever a backend cannot produce a real image.
#[derive(Debug, Default)]
pub struct BlankFrame {
    buffer: FrameBuffer,
}

impl BlankFrame {
    /// Create an empty blank frame holder
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a blank frame of `size`
    pub fn frame(&mut self, size: FrameSize) -> Frame<'_> {
        if self.buffer.size() != size || self.buffer.data.len() != size.area() * BYTES_PER_PIXEL {
            debug!("(Re)creating blank frame buffer: {}", size);
            self.buffer.reshape(size, min_pitch(size));
            self.buffer.data_mut().fill(BLANK_FILL);
        }
        self.buffer.as_frame()
    }
}
