//! Deskstream Core Library
//!
//! Desktop capture to H.264 elementary stream.
//!
//! This library provides:
//! - Capture backends (blank, GDI screen copy, Direct3D 9 front buffer) with
//!   timeout-gated recovery from resource failures
//! - H.264 encoding through FFmpeg/libx264 with encode-size negotiation
//! - NAL unit framing and pluggable sinks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────┐    ┌─────────────────┐
//! │ Capture backend │───▶│ x264 encode  │───▶│ Sink            │
//! │ (BGRA frames)   │    │ (FFmpeg)     │    │ (NAL units)     │
//! └─────────────────┘    └──────────────┘    └─────────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod encode;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod sink;
pub mod timing;

pub use capture::{CaptureBackend, FrameSource, InterruptFlag};
pub use config::{BackendKind, ConfigFile, StreamConfig};
pub use encode::{Encoder, H264Encoder, NalMode, X264Codec};
pub use error::{DeskstreamError, Result};
pub use frame::Frame;
pub use geometry::{FramePos, FrameRate, FrameScale, FrameSize};
pub use pipeline::Pipeline;
pub use sink::{MethodSink, Sink, WriterSink};
