//! Run command - capture the desktop and write an H.264 stream

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use deskstream_core::config::{BackendKind, ConfigFile, CrfArg, LogConfig, Preset, StreamConfig};
use deskstream_core::encode::{H264Encoder, NalMode, X264Codec};
use deskstream_core::geometry::{FrameRate, FrameScale, FrameSize};
use deskstream_core::pipeline::Pipeline;
use deskstream_core::sink::{Sink, WriterSink};
use deskstream_core::{CaptureBackend, InterruptFlag};
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::with_hint;

/// Arguments for the run command
///
/// Every option overrides the matching config file setting.
#[derive(Args)]
pub struct RunArgs {
    /// Capture backend (null, legacy, hardware)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Frames per second, N or N/D (1 to 50)
    #[arg(short, long)]
    fps: Option<FrameRate>,

    /// Scale before encoding: N/D or WxH
    #[arg(short, long)]
    scale: Option<FrameScale>,

    /// x264 preset (ultrafast ... placebo)
    #[arg(short, long)]
    preset: Option<Preset>,

    /// VBV bitrate cap in kbps (0 = uncapped)
    #[arg(long)]
    bitrate: Option<u32>,

    /// Rate factor and ceiling, crf[-crfmax]; without a ceiling the
    /// configured one is kept, raised to crf if lower
    #[arg(long)]
    crf: Option<CrfArg>,

    /// Maximum keyframe interval in frames
    #[arg(long)]
    keyint: Option<u32>,

    /// Use rolling intra refresh instead of keyframes
    #[arg(long)]
    intra_refresh: bool,

    /// NAL delivery (whole-bulk, with-start-codes, without-start-codes)
    #[arg(long)]
    nal_mode: Option<NalMode>,

    /// Screen size to assume where there are no system metrics, WxH
    #[arg(long)]
    screen_size: Option<FrameSize>,

    /// Output file, `-` for stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Prefix log lines with a timestamp
    #[arg(long)]
    timestamps: bool,

    /// Include source file and line in log lines
    #[arg(long)]
    trace_source: bool,
}

impl RunArgs {
    /// Apply the logging flags
    pub fn apply_log(&self, log: &mut LogConfig) {
        log.timestamps |= self.timestamps;
        log.source_location |= self.trace_source;
    }

    fn apply(&self, mut config: StreamConfig) -> StreamConfig {
        if let Some(backend) = self.backend {
            config = config.with_backend(backend);
        }
        if let Some(fps) = self.fps {
            config = config.with_fps(fps);
        }
        if let Some(scale) = self.scale {
            config = config.with_scale(scale);
        }
        if let Some(preset) = self.preset {
            config = config.with_preset(preset);
        }
        if let Some(bitrate) = self.bitrate {
            config = config.with_bitrate(bitrate);
        }
        if let Some(crf) = self.crf {
            let resolved = crf.apply(config.crf);
            config = config.with_crf(resolved);
        }
        if let Some(keyint) = self.keyint {
            config = config.with_keyint(keyint);
        }
        if self.intra_refresh {
            config = config.with_intra_refresh(true);
        }
        if let Some(mode) = self.nal_mode {
            config = config.with_nal_mode(mode);
        }
        if let Some(size) = self.screen_size {
            config = config.with_screen_size(size);
        }
        if let Some(path) = &self.output {
            config = config.with_output(path.clone());
        }
        let mut log = config.log.clone();
        self.apply_log(&mut log);
        config.with_log(log)
    }
}

/// Open the encoded output, stdout when no path (or `-`) is given
fn open_sink(path: Option<&Path>) -> Result<Box<dyn Sink>> {
    let writer: Box<dyn Write> = match path {
        Some(path) if path != Path::new("-") => {
            info!("Writing H.264 stream to {}", path.display());
            Box::new(
                File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?,
            )
        }
        _ => Box::new(std::io::stdout()),
    };
    Ok(Box::new(WriterSink::new(writer)))
}

/// Capture and encode until interrupted or the frame limit is reached
pub async fn run(args: RunArgs, file: ConfigFile) -> Result<()> {
    let config = args.apply(file.to_stream_config());
    config.validate().map_err(with_hint)?;
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    let interrupt = InterruptFlag::new();
    let source = CaptureBackend::from_config(&config, interrupt.clone()).map_err(with_hint)?;
    let codec = X264Codec::new()
        .map_err(with_hint)
        .context("Failed to initialize encoder")?;
    let sink = open_sink(config.output.as_deref())?;
    let encoder = H264Encoder::with_boxed_sink(codec, &config, sink);
    let mut pipeline = Pipeline::new(source, encoder);

    eprintln!("Deskstream - Capturing\n");
    eprintln!("Configuration:");
    eprintln!("  Backend:     {}", config.backend);
    eprintln!("  Framerate:   {} fps", config.fps);
    eprintln!("  Scale:       {}", config.scale);
    eprintln!("  Preset:      {}", config.preset);
    eprintln!("  CRF:         {}", config.crf);
    if config.has_bitrate_cap() {
        eprintln!("  Bitrate cap: {} kbps", config.bitrate);
    }
    eprintln!("  Keyint:      {}", config.keyint);
    eprintln!("  NAL mode:    {}", config.nal_mode);
    eprintln!();
    eprintln!("Press Ctrl+C to stop...\n");

    let mut ticker = interval(config.fps.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        if args.frames.is_some_and(|limit| pipeline.frames_processed() >= limit) {
            info!("Frame limit reached");
            break;
        }

        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                eprintln!("\nReceived interrupt signal...");
                interrupt.raise();
                break;
            }
            _ = ticker.tick() => pipeline.tick(),
        }
    }

    pipeline.finish();

    let stats = pipeline.stats();
    let encoded = pipeline.encoder().stats();
    eprintln!("Capture stopped.");
    eprintln!("  {}", stats);
    eprintln!(
        "  Encoded {} frames into {} packets ({} bytes, {} deliveries)",
        encoded.frames, encoded.packets, encoded.bytes, encoded.deliveries
    );
    if encoded.failures > 0 {
        eprintln!("  {} encode calls failed, see the log for details", encoded.failures);
    }

    Ok(())
}
