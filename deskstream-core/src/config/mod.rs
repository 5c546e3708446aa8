//! Configuration types for Deskstream
//!
//! Provides backend selection, compressor settings, and logging options.

mod file;

pub use file::{sample_config, ConfigFile};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::encode::NalMode;
use crate::error::{DeskstreamError, Result};
use crate::geometry::{FrameRate, FrameScale, FrameSize};
use crate::timing::DEFAULT_RECOVERY_INTERVAL;

/// Capture backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Blank frames only
    Null,
    /// Screen DC block copy (GDI)
    #[default]
    #[serde(alias = "gdi")]
    Legacy,
    /// Front-buffer read through the graphics device (Direct3D 9)
    #[serde(alias = "dx")]
    Hardware,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Null, Self::Legacy, Self::Hardware];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Legacy => "legacy",
            Self::Hardware => "hardware",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "null" | "none" => Ok(Self::Null),
            "legacy" | "gdi" => Ok(Self::Legacy),
            "hardware" | "dx" | "d3d9" => Ok(Self::Hardware),
            _ => Err(format!("Unknown capture backend: {}", s)),
        }
    }
}

/// x264 speed/quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Ultrafast,
    Superfast,
    #[default]
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl Preset {
    /// All presets, fastest first
    pub const ALL: [Preset; 10] = [
        Self::Ultrafast,
        Self::Superfast,
        Self::Veryfast,
        Self::Faster,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::Slower,
        Self::Veryslow,
        Self::Placebo,
    ];

    /// x264 preset name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
            Self::Placebo => "placebo",
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == lower)
            .ok_or_else(|| format!("Unknown preset: {}", s))
    }
}

/// Constant rate factor with an upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crf {
    pub crf: u8,
    pub max: u8,
}

impl Crf {
    /// Highest CRF value x264 accepts
    pub const LIMIT: u8 = 51;

    pub fn new(crf: u8, max: u8) -> Self {
        Self { crf, max }
    }
}

impl Default for Crf {
    fn default() -> Self {
        Self { crf: 35, max: 40 }
    }
}

impl std::fmt::Display for Crf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.crf, self.max)
    }
}

impl std::str::FromStr for Crf {
    type Err = String;

    /// Parses `crf` or `crf-crfmax`; a lone value keeps the default ceiling
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<CrfArg>().map(|arg| arg.apply(Self::default()))
    }
}

/// Rate factor update, `crf` or `crf-crfmax`
///
/// Without an explicit ceiling the current one is kept, raised to `crf`
/// when it is lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrfArg {
    pub crf: u8,
    pub max: Option<u8>,
}

impl CrfArg {
    /// Resolve against the current setting
    pub fn apply(self, current: Crf) -> Crf {
        let max = self.max.unwrap_or(current.max.max(self.crf));
        Crf::new(self.crf, max)
    }
}

impl std::str::FromStr for CrfArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u8>()
                .map_err(|_| format!("Invalid CRF '{}' in format crf[-crfmax]", s))
        };
        let arg = match s.split_once('-') {
            Some((crf, max)) => Self {
                crf: parse(crf)?,
                max: Some(parse(max)?),
            },
            None => Self {
                crf: parse(s)?,
                max: None,
            },
        };
        let max = arg.max.unwrap_or(arg.crf);
        if arg.crf > Crf::LIMIT || max > Crf::LIMIT || max < arg.crf {
            return Err(format!(
                "CRF '{}' out of range, need crf <= crfmax <= {}",
                s,
                Crf::LIMIT
            ));
        }
        Ok(arg)
    }
}

/// Logging options for the host's subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Maximum level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Prefix events with a timestamp
    #[serde(default)]
    pub timestamps: bool,
    /// Include file and line of the event source
    #[serde(default)]
    pub source_location: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: false,
            source_location: false,
        }
    }
}

impl LogConfig {
    /// Parsed maximum level
    pub fn level(&self) -> Result<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| DeskstreamError::config(format!("Unknown log level: {}", self.level)))
    }
}

/// Bitrate bounds in kbps when VBV capping is on
pub const BITRATE_RANGE: std::ops::RangeInclusive<u32> = 100..=10_000;

/// Keyframe interval bounds in frames
pub const KEYINT_RANGE: std::ops::RangeInclusive<u32> = 1..=250;

/// Complete streaming configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Capture backend
    pub backend: BackendKind,
    /// Capture and encode rate
    pub fps: FrameRate,
    /// Capture-to-encode scaling
    pub scale: FrameScale,
    /// x264 preset
    pub preset: Preset,
    /// VBV bitrate cap in kbps (0 = uncapped)
    pub bitrate: u32,
    /// Rate factor and ceiling
    pub crf: Crf,
    /// Maximum keyframe interval in frames
    pub keyint: u32,
    /// Rolling intra refresh instead of keyframes
    pub intra_refresh: bool,
    /// How compressed output reaches the sink
    pub nal_mode: NalMode,
    /// Screen size reported where the platform has no system metrics
    pub screen_size: FrameSize,
    /// Cooldown after a failed resource acquisition, in milliseconds
    pub recovery_interval_ms: u64,
    /// Optional output file path (stdout if unset)
    pub output: Option<PathBuf>,
    /// Logging options
    pub log: LogConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            fps: FrameRate::default(),
            scale: FrameScale::default(),
            preset: Preset::default(),
            bitrate: 0,
            crf: Crf::default(),
            keyint: 5,
            intra_refresh: false,
            nal_mode: NalMode::default(),
            screen_size: FrameSize::new(1920, 1080),
            recovery_interval_ms: DEFAULT_RECOVERY_INTERVAL.as_millis() as u64,
            output: None,
            log: LogConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Set the capture backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the frame rate
    pub fn with_fps(mut self, fps: FrameRate) -> Self {
        self.fps = fps;
        self
    }

    /// Set the capture-to-encode scale
    pub fn with_scale(mut self, scale: FrameScale) -> Self {
        self.scale = scale;
        self
    }

    /// Set the x264 preset
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    /// Set the VBV bitrate cap in kbps
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the rate factor and its ceiling
    pub fn with_crf(mut self, crf: Crf) -> Self {
        self.crf = crf;
        self
    }

    /// Set the keyframe interval
    pub fn with_keyint(mut self, keyint: u32) -> Self {
        self.keyint = keyint;
        self
    }

    /// Enable or disable intra refresh
    pub fn with_intra_refresh(mut self, enabled: bool) -> Self {
        self.intra_refresh = enabled;
        self
    }

    /// Set the NAL delivery mode
    pub fn with_nal_mode(mut self, mode: NalMode) -> Self {
        self.nal_mode = mode;
        self
    }

    /// Set the fallback screen size
    pub fn with_screen_size(mut self, size: FrameSize) -> Self {
        self.screen_size = size;
        self
    }

    /// Set the recovery cooldown
    pub fn with_recovery_interval(mut self, interval: Duration) -> Self {
        self.recovery_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the output file path
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Set the logging options
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Recovery cooldown
    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }

    /// Whether VBV bitrate capping is on
    pub fn has_bitrate_cap(&self) -> bool {
        self.bitrate > 0
    }

    /// Validate the configuration and return any warnings
    ///
    /// Returns a list of warning messages for settings that work but are
    /// probably not what the user wants.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.intra_refresh && self.keyint < 2 {
            warnings.push(
                "Intra refresh with a keyframe interval of 1 refreshes the whole picture every frame."
                    .to_string(),
            );
        }

        if matches!(self.preset, Preset::Slower | Preset::Veryslow | Preset::Placebo)
            && self.fps.as_f64() > 10.0
        {
            warnings.push(format!(
                "Preset {} at {} fps may not keep up in real time.",
                self.preset, self.fps
            ));
        }

        if self.backend == BackendKind::Null {
            warnings.push("Null backend only produces blank frames.".to_string());
        }

        if self.recovery_interval_ms == 0 {
            warnings.push("Recovery interval of 0 ms retries failed resources every frame.".to_string());
        }

        warnings
    }

    /// Validate and return an error if configuration is invalid
    ///
    /// Unlike `warnings()`, this returns hard errors for configurations that
    /// cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.bitrate != 0 && !BITRATE_RANGE.contains(&self.bitrate) {
            return Err(DeskstreamError::config(format!(
                "Bitrate {} kbps out of range, use 0 or {}..={}",
                self.bitrate,
                BITRATE_RANGE.start(),
                BITRATE_RANGE.end()
            )));
        }

        if self.crf.crf > Crf::LIMIT || self.crf.max > Crf::LIMIT {
            return Err(DeskstreamError::config(format!(
                "CRF {} exceeds maximum {}",
                self.crf,
                Crf::LIMIT
            )));
        }
        if self.crf.max < self.crf.crf {
            return Err(DeskstreamError::config(format!(
                "CRF ceiling {} is below CRF {}",
                self.crf.max, self.crf.crf
            )));
        }

        if !KEYINT_RANGE.contains(&self.keyint) {
            return Err(DeskstreamError::config(format!(
                "Keyframe interval {} out of range {}..={}",
                self.keyint,
                KEYINT_RANGE.start(),
                KEYINT_RANGE.end()
            )));
        }

        if self.screen_size.is_empty() {
            return Err(DeskstreamError::config("Screen size cannot be zero"));
        }

        self.log.level()?;
        Ok(())
    }
}
