//! libx264 encoder implementation via FFmpeg
//!
//! Conversion goes through swscale (BGRA to YUV 4:2:0 with fast bilinear
//! scaling); compression through FFmpeg's libx264 wrapper.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::{self, encoder};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{self, Flags};
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::{Dictionary, Rational};
use tracing::{debug, info, trace};

use super::{Codec, CompressorSettings, Compressor, Converter, EncodedPacket};
use crate::error::{DeskstreamError, Result};
use crate::frame::{min_pitch, Frame};
use crate::geometry::FrameSize;

const ENCODER_NAME: &str = "libx264";

/// FFmpeg-backed H.264 codec
#[derive(Debug)]
pub struct X264Codec {
    _private: (),
}

impl X264Codec {
    /// Initialize FFmpeg and check that libx264 is present
    pub fn new() -> Result<Self> {
        ffmpeg::init().map_err(|e| DeskstreamError::encoder(format!("FFmpeg init failed: {}", e)))?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

        if encoder::find_by_name(ENCODER_NAME).is_none() {
            return Err(DeskstreamError::encoder(format!("Encoder {} not found", ENCODER_NAME)));
        }
        Ok(Self { _private: () })
    }
}

impl Codec for X264Codec {
    type Picture = Video;
    type Converter = SwsConverter;
    type Compressor = X264Compressor;

    fn converter(&self, source: FrameSize, target: FrameSize) -> Result<SwsConverter> {
        SwsConverter::new(source, target)
    }

    fn picture(&self, size: FrameSize) -> Result<Video> {
        let picture = Video::new(Pixel::YUV420P, size.width, size.height);
        if picture.planes() == 0 {
            return Err(DeskstreamError::encoder(format!("Could not allocate {} YUV image", size)));
        }
        Ok(picture)
    }

    fn compressor(&self, settings: &CompressorSettings) -> Result<X264Compressor> {
        X264Compressor::open(settings)
    }
}

/// swscale context plus a staging frame for the BGRA input
pub struct SwsConverter {
    context: scaling::Context,
    source: Video,
}

impl SwsConverter {
    fn new(source: FrameSize, target: FrameSize) -> Result<Self> {
        debug!(
            "Creating scaler: BGRA {} -> YUV420P {}",
            source, target
        );

        let context = scaling::Context::get(
            Pixel::BGRA,
            source.width,
            source.height,
            Pixel::YUV420P,
            target.width,
            target.height,
            Flags::FAST_BILINEAR,
        )
        .map_err(|e| DeskstreamError::encoder(format!("Failed to create scaler: {}", e)))?;

        Ok(Self {
            context,
            source: Video::new(Pixel::BGRA, source.width, source.height),
        })
    }
}

impl Converter for SwsConverter {
    type Picture = Video;

    fn convert(&mut self, frame: &Frame<'_>, picture: &mut Video) -> Result<()> {
        if frame.size.width != self.source.width() || frame.size.height != self.source.height() {
            return Err(DeskstreamError::encoder(format!(
                "Frame size {} does not match converter input {}x{}",
                frame.size,
                self.source.width(),
                self.source.height()
            )));
        }

        // Staging rows may be padded differently from the capture pitch
        let row = min_pitch(frame.size);
        let stride = self.source.stride(0);
        let staging = self.source.data_mut(0);
        for y in 0..frame.size.height as usize {
            let src = &frame.data[y * frame.pitch..y * frame.pitch + row];
            staging[y * stride..y * stride + row].copy_from_slice(src);
        }

        self.context
            .run(&self.source, picture)
            .map_err(|e| DeskstreamError::encoder(format!("Scaling failed: {}", e)))
    }
}

/// Opened libx264 encoder
pub struct X264Compressor {
    encoder: encoder::Video,
    packet: ffmpeg::Packet,
    pending: usize,
    eof_sent: bool,
}

impl X264Compressor {
    fn open(settings: &CompressorSettings) -> Result<Self> {
        let codec = encoder::find_by_name(ENCODER_NAME)
            .ok_or_else(|| DeskstreamError::compressor(format!("Encoder {} not found", ENCODER_NAME)))?;

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| {
                DeskstreamError::compressor(format!("Failed to create encoder context: {}", e))
            })?;

        let FrameSize { width, height } = settings.size;
        let (num, den) = (settings.fps.num() as i32, settings.fps.den() as i32);

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(Rational::new(den, num));
        encoder.set_frame_rate(Some(Rational::new(num, den)));
        if settings.bitrate > 0 {
            encoder.set_max_bit_rate(settings.bitrate as usize * 1000);
        }

        let mut opts = Dictionary::new();
        opts.set("preset", settings.preset.as_str());
        opts.set("tune", CompressorSettings::TUNE);
        opts.set("profile", CompressorSettings::PROFILE);
        opts.set("crf", &settings.crf.crf.to_string());
        opts.set("crf_max", &settings.crf.max.to_string());
        opts.set("threads", "1");
        if settings.intra_refresh {
            opts.set("intra-refresh", "1");
        }
        opts.set("x264-params", &x264_params(settings));

        let encoder = encoder
            .open_with(opts)
            .map_err(|e| DeskstreamError::compressor(format!("Failed to open encoder: {}", e)))?;

        info!(
            "x264 encoder opened: {} @ {} fps, preset {}, crf {}",
            settings.size, settings.fps, settings.preset, settings.crf
        );

        Ok(Self {
            encoder,
            packet: ffmpeg::Packet::empty(),
            pending: 0,
            eof_sent: false,
        })
    }

    /// Collect every packet the encoder has ready
    fn receive_packets(&mut self) -> Result<Vec<EncodedPacket>> {
        let mut packets = Vec::new();
        loop {
            match self.encoder.receive_packet(&mut self.packet) {
                Ok(()) => {
                    let packet = EncodedPacket {
                        data: self.packet.data().map(|d| d.to_vec()).unwrap_or_default(),
                        pts: self.packet.pts().unwrap_or(0),
                        dts: self.packet.dts().unwrap_or(0),
                        keyframe: self.packet.is_key(),
                    };

                    trace!(
                        "Encoded packet: pts={}, size={}, keyframe={}",
                        packet.pts,
                        packet.data.len(),
                        packet.keyframe
                    );

                    self.pending = self.pending.saturating_sub(1);
                    packets.push(packet);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(ffmpeg::Error::Eof) => {
                    self.pending = 0;
                    break;
                }
                Err(e) => {
                    return Err(DeskstreamError::compressor(format!(
                        "Failed to receive packet: {}",
                        e
                    )));
                }
            }
        }
        Ok(packets)
    }
}

impl Compressor for X264Compressor {
    type Picture = Video;

    fn compress(&mut self, picture: &mut Video, pts: i64) -> Result<Vec<EncodedPacket>> {
        picture.set_pts(Some(pts));
        self.encoder
            .send_frame(&*picture)
            .map_err(|e| DeskstreamError::compressor(format!("Failed to send frame: {}", e)))?;
        self.pending += 1;
        self.receive_packets()
    }

    fn drain(&mut self) -> Result<Vec<EncodedPacket>> {
        if !self.eof_sent {
            self.encoder
                .send_eof()
                .map_err(|e| DeskstreamError::compressor(format!("Failed to send EOF: {}", e)))?;
            self.eof_sent = true;
        }
        self.receive_packets()
    }

    fn delayed_frames(&self) -> usize {
        self.pending
    }
}

/// Raw x264 parameters FFmpeg has no dedicated option for
fn x264_params(settings: &CompressorSettings) -> String {
    let mut params = vec![
        "repeat-headers=1".to_string(),
        "annexb=1".to_string(),
        "force-cfr=1".to_string(),
    ];
    if settings.keyint > 0 {
        params.push(format!("keyint={}", settings.keyint));
    }
    if settings.bitrate > 0 {
        params.push(format!("vbv-maxrate={}", settings.bitrate));
        params.push(format!("vbv-bufsize={}", settings.vbv_buffer_size()));
        params.push("vbv-init=1.0".to_string());
    }
    params.join(":")
}

/// Check if FFmpeg was built with libx264
pub fn x264_available() -> bool {
    ffmpeg::init().ok();
    encoder::find_by_name(ENCODER_NAME).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;

    #[test]
    fn test_x264_params_without_vbv() {
        let settings = CompressorSettings::from_config(&StreamConfig::default(), FrameSize::new(640, 480));
        let params = x264_params(&settings);
        assert!(params.contains("keyint=5"));
        assert!(params.contains("annexb=1"));
        assert!(!params.contains("vbv"));
    }

    #[test]
    fn test_x264_params_with_vbv() {
        let config = StreamConfig::default().with_bitrate(500);
        let settings = CompressorSettings::from_config(&config, FrameSize::new(640, 480));
        let params = x264_params(&settings);
        assert!(params.contains("vbv-maxrate=500"));
        assert!(params.contains("vbv-bufsize=1000"));
    }
}
