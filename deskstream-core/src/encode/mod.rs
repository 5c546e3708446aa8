//! H.264 encoding via FFmpeg/libx264
//!
//! This module provides:
//! - The [`Encoder`] contract frames are pushed through
//! - Encode-size negotiation from the capture size
//! - [`H264Encoder`], a recovery state machine over a pluggable [`Codec`]
//! - NAL unit framing for the sink

pub mod nal;
mod x264;

pub use nal::NalMode;
pub use x264::{x264_available, X264Codec};

use tracing::{debug, info, trace, warn};

use crate::config::{Crf, Preset, StreamConfig};
use crate::error::{DeskstreamError, Result};
use crate::frame::Frame;
use crate::geometry::{FrameRate, FrameScale, FrameSize};
use crate::sink::Sink;
use crate::timing::RecoveryTimeout;

/// Smallest encode size
pub const MIN_ENCODE_SIZE: FrameSize = FrameSize::new(320, 200);

/// Largest encode size
pub const MAX_ENCODE_SIZE: FrameSize = FrameSize::new(1920, 1080);

/// Encode dimensions are rounded down to a multiple of this
pub const ENCODE_ALIGNMENT: u32 = 4;

/// Encode size for a capture of `raw` pixels
pub fn negotiate_encode_size(raw: FrameSize, scale: &FrameScale) -> FrameSize {
    raw.scaled(scale)
        .aligned(ENCODE_ALIGNMENT)
        .bounded(MIN_ENCODE_SIZE, MAX_ENCODE_SIZE)
}

/// Consumer of captured frames
pub trait Encoder {
    /// Compress one frame and deliver whatever output it produces
    fn encode(&mut self, frame: &Frame<'_>);

    /// Drain frames still held by the compressor
    fn flush(&mut self);
}

/// Encoded video packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    /// Encoded data, Annex B
    pub data: Vec<u8>,
    /// Presentation timestamp
    pub pts: i64,
    /// Decode timestamp
    pub dts: i64,
    /// Is this a keyframe?
    pub keyframe: bool,
}

/// Parameters a compressor is opened with
#[derive(Debug, Clone, PartialEq)]
pub struct CompressorSettings {
    /// Encode size
    pub size: FrameSize,
    /// Constant input rate
    pub fps: FrameRate,
    /// x264 preset
    pub preset: Preset,
    /// Rate factor and ceiling
    pub crf: Crf,
    /// VBV cap in kbps, 0 for none
    pub bitrate: u32,
    /// Maximum keyframe interval
    pub keyint: u32,
    /// Rolling intra refresh
    pub intra_refresh: bool,
}

impl CompressorSettings {
    /// x264 tune
    pub const TUNE: &'static str = "animation+zerolatency";
    /// H.264 profile
    pub const PROFILE: &'static str = "main";

    /// Settings for `config` at the given encode size
    pub fn from_config(config: &StreamConfig, size: FrameSize) -> Self {
        Self {
            size,
            fps: config.fps,
            preset: config.preset,
            crf: config.crf,
            bitrate: config.bitrate,
            keyint: config.keyint,
            intra_refresh: config.intra_refresh,
        }
    }

    /// VBV buffer size in kbit
    pub fn vbv_buffer_size(&self) -> u32 {
        self.bitrate * 2
    }
}

/// BGRA to planar YUV 4:2:0 conversion with scaling
pub trait Converter {
    /// Destination image
    type Picture;

    /// Convert `frame` into `picture`
    fn convert(&mut self, frame: &Frame<'_>, picture: &mut Self::Picture) -> Result<()>;
}

/// H.264 compressor
pub trait Compressor {
    /// Source image
    type Picture;

    /// Compress `picture` stamped with `pts`
    fn compress(&mut self, picture: &mut Self::Picture, pts: i64) -> Result<Vec<EncodedPacket>>;

    /// Drain one step of delayed output
    fn drain(&mut self) -> Result<Vec<EncodedPacket>>;

    /// Frames accepted but not yet emitted
    fn delayed_frames(&self) -> usize;
}

/// Factory for the encoder's resources
pub trait Codec {
    /// Scratch image type
    type Picture;
    type Converter: Converter<Picture = Self::Picture>;
    type Compressor: Compressor<Picture = Self::Picture>;

    /// Converter from `source` BGRA frames to `target` YUV images
    fn converter(&self, source: FrameSize, target: FrameSize) -> Result<Self::Converter>;

    /// Scratch image of `size`
    fn picture(&self, size: FrameSize) -> Result<Self::Picture>;

    /// Open a compressor
    fn compressor(&self, settings: &CompressorSettings) -> Result<Self::Compressor>;
}

/// Running totals of an encoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    /// Frames handed to the compressor
    pub frames: u64,
    /// Packets produced
    pub packets: u64,
    /// Bytes produced
    pub bytes: u64,
    /// Sink deliveries
    pub deliveries: u64,
    /// Calls abandoned after a failure
    pub failures: u64,
}

/// H.264 encoder with timeout-gated recovery
///
/// Resources are created on first use and recreated when the negotiated
/// encode size changes. A failure arms the recovery timeout; until it
/// elapses `encode` does nothing.
pub struct H264Encoder<C: Codec> {
    codec: C,
    settings: CompressorSettings,
    scale: FrameScale,
    nal_mode: NalMode,
    sink: Box<dyn Sink>,
    timeout: RecoveryTimeout,
    source_size: FrameSize,
    encode_size: FrameSize,
    converter: Option<C::Converter>,
    picture: Option<C::Picture>,
    compressor: Option<C::Compressor>,
    frame_count: i64,
    stats: EncoderStats,
}

impl<C: Codec> H264Encoder<C> {
    /// Create an encoder delivering to `sink`
    pub fn new(codec: C, config: &StreamConfig, sink: impl Sink + 'static) -> Self {
        Self::with_boxed_sink(codec, config, Box::new(sink))
    }

    /// Create an encoder delivering to an already boxed sink
    pub fn with_boxed_sink(codec: C, config: &StreamConfig, sink: Box<dyn Sink>) -> Self {
        Self {
            codec,
            settings: CompressorSettings::from_config(config, FrameSize::default()),
            scale: config.scale,
            nal_mode: config.nal_mode,
            sink,
            timeout: RecoveryTimeout::new(config.recovery_interval()),
            source_size: FrameSize::default(),
            encode_size: FrameSize::default(),
            converter: None,
            picture: None,
            compressor: None,
            frame_count: 0,
            stats: EncoderStats::default(),
        }
    }

    /// Current negotiated encode size
    pub fn encode_size(&self) -> FrameSize {
        self.encode_size
    }

    /// Timestamp the next frame will get
    pub fn frame_count(&self) -> i64 {
        self.frame_count
    }

    pub fn stats(&self) -> EncoderStats {
        self.stats
    }

    /// Codec resources, for inspection
    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn release(&mut self) {
        self.compressor = None;
        self.picture = None;
        self.converter = None;
    }

    fn acquire(&mut self, source: FrameSize) -> Result<()> {
        if self.converter.is_none() {
            debug!("Obtaining image converter {} -> {}", source, self.encode_size);
            self.converter = Some(
                self.codec
                    .converter(source, self.encode_size)
                    .map_err(|e| e.with_context("Could not obtain image converter"))?,
            );
        }

        if self.picture.is_none() {
            debug!("Allocating YUV image");
            self.picture = Some(
                self.codec
                    .picture(self.encode_size)
                    .map_err(|e| e.with_context("Could not allocate YUV image"))?,
            );
        }

        if self.compressor.is_none() {
            self.settings.size = self.encode_size;
            debug!("Opening compressor: {:?}", self.settings);
            self.compressor = Some(
                self.codec
                    .compressor(&self.settings)
                    .map_err(|e| e.with_context("Could not open compressor"))?,
            );
        }
        Ok(())
    }

    fn compress(&mut self, frame: &Frame<'_>) -> Result<Vec<EncodedPacket>> {
        self.acquire(frame.size)?;

        let (Some(converter), Some(picture), Some(compressor)) = (
            self.converter.as_mut(),
            self.picture.as_mut(),
            self.compressor.as_mut(),
        ) else {
            return Err(DeskstreamError::encoder("Encoder resources missing"));
        };

        trace!("Converting and scaling image");
        converter.convert(frame, picture)?;

        let pts = self.frame_count;
        self.frame_count += 1;
        trace!("Encoding image data, pts {}", pts);
        compressor.compress(picture, pts)
    }

    /// Deliver everything the compressor still holds, then close it
    fn drain(&mut self) -> Result<()> {
        let Some(compressor) = self.compressor.as_mut() else {
            return Ok(());
        };

        debug!("Flushing pending encoded data");
        let mut drained = Vec::new();
        let mut result = Ok(());
        while compressor.delayed_frames() > 0 {
            match compressor.drain() {
                Ok(packets) if packets.is_empty() => break,
                Ok(packets) => drained.push(packets),
                Err(e) => {
                    result = Err(e.with_context("Could not drain compressor"));
                    break;
                }
            }
        }

        for packets in drained {
            self.deliver(&packets);
        }

        // A drained compressor cannot take more input
        self.compressor = None;
        result
    }

    fn fail(&mut self, e: DeskstreamError) {
        warn!("{}", e);
        self.stats.failures += 1;
        self.timeout.start();
    }

    fn deliver(&mut self, packets: &[EncodedPacket]) {
        self.stats.packets += packets.len() as u64;
        self.stats.bytes += packets.iter().map(|p| p.data.len() as u64).sum::<u64>();
        self.stats.deliveries += nal::deliver(self.nal_mode, packets, self.sink.as_mut()) as u64;
    }
}

impl<C: Codec> Encoder for H264Encoder<C> {
    fn encode(&mut self, frame: &Frame<'_>) {
        if !frame.valid() {
            trace!("Skipping invalid frame of size {}", frame.size);
            return;
        }

        if !self.timeout.is_elapsed() {
            return;
        }

        let encode_size = negotiate_encode_size(frame.size, &self.scale);
        if encode_size != self.encode_size {
            info!("New frame size, encoder resources will be recreated: {}", encode_size);
            let drained = self.drain();
            self.release();
            self.frame_count = 0;
            self.encode_size = encode_size;
            if let Err(e) = drained {
                self.fail(e);
                return;
            }
        }

        if frame.size != self.source_size {
            self.converter = None;
            self.source_size = frame.size;
        }

        match self.compress(frame) {
            Ok(packets) => {
                self.stats.frames += 1;
                self.deliver(&packets);
            }
            Err(e) => self.fail(e),
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.drain() {
            self.fail(e);
        }
    }
}

impl<C: Codec> Drop for H264Encoder<C> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Names of the available x264 presets
pub fn x264_presets() -> Vec<&'static str> {
    Preset::ALL.iter().map(Preset::as_str).collect()
}
