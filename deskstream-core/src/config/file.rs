//! Configuration file loading and merging
//!
//! Loads user configuration from `~/.config/deskstream/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{BackendKind, Crf, LogConfig, Preset, StreamConfig};
use crate::encode::NalMode;
use crate::error::{DeskstreamError, Result};
use crate::geometry::{FrameRate, FrameScale, FrameSize};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Capture settings
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Encoder settings
    #[serde(default)]
    pub encoder: EncoderSettings,

    /// Output settings
    #[serde(default)]
    pub output: OutputSettings,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Capture backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Backend: null, legacy (gdi), hardware (dx)
    #[serde(default)]
    pub backend: BackendKind,

    /// Frames per second, `N` or `N/D`
    #[serde(default)]
    pub fps: FrameRate,

    /// Fallback screen size where there are no system metrics
    #[serde(default = "default_screen_size")]
    pub screen_size: FrameSize,

    /// Cooldown after a failed resource acquisition
    #[serde(default = "default_recovery_interval_ms")]
    pub recovery_interval_ms: u64,
}

/// H.264 encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Scale: "none", "N/D" or "WxH"
    #[serde(default)]
    pub scale: FrameScale,

    /// x264 preset
    #[serde(default)]
    pub preset: Preset,

    /// VBV bitrate cap in kbps (0 = uncapped)
    #[serde(default)]
    pub bitrate: u32,

    /// Constant rate factor
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Rate factor ceiling
    #[serde(default = "default_crf_max")]
    pub crf_max: u8,

    /// Keyframe interval in frames
    #[serde(default = "default_keyint")]
    pub keyint: u32,

    /// Rolling intra refresh
    #[serde(default)]
    pub intra_refresh: bool,
}

/// Output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// NAL delivery: whole-bulk, with-start-codes, without-start-codes
    #[serde(default)]
    pub nal_mode: NalMode,

    /// Output file (stdout if unset)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_screen_size() -> FrameSize {
    StreamConfig::default().screen_size
}

fn default_recovery_interval_ms() -> u64 {
    StreamConfig::default().recovery_interval_ms
}

fn default_crf() -> u8 {
    Crf::default().crf
}

fn default_crf_max() -> u8 {
    Crf::default().max
}

fn default_keyint() -> u32 {
    StreamConfig::default().keyint
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            fps: FrameRate::default(),
            screen_size: default_screen_size(),
            recovery_interval_ms: default_recovery_interval_ms(),
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            scale: FrameScale::default(),
            preset: Preset::default(),
            bitrate: 0,
            crf: default_crf(),
            crf_max: default_crf_max(),
            keyint: default_keyint(),
            intra_refresh: false,
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("deskstream").join("config.toml")
        } else if let Some(home) = dirs::home_dir() {
            home.join(".config").join("deskstream").join("config.toml")
        } else {
            PathBuf::from("deskstream.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DeskstreamError::config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DeskstreamError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DeskstreamError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DeskstreamError::config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Build the runtime configuration this file describes
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            backend: self.capture.backend,
            fps: self.capture.fps,
            scale: self.encoder.scale,
            preset: self.encoder.preset,
            bitrate: self.encoder.bitrate,
            crf: Crf::new(self.encoder.crf, self.encoder.crf_max),
            keyint: self.encoder.keyint,
            intra_refresh: self.encoder.intra_refresh,
            nal_mode: self.output.nal_mode,
            screen_size: self.capture.screen_size,
            recovery_interval_ms: self.capture.recovery_interval_ms,
            output: self.output.path.clone(),
            log: self.log.clone(),
        }
    }
}

impl From<&StreamConfig> for ConfigFile {
    fn from(config: &StreamConfig) -> Self {
        Self {
            capture: CaptureSettings {
                backend: config.backend,
                fps: config.fps,
                screen_size: config.screen_size,
                recovery_interval_ms: config.recovery_interval_ms,
            },
            encoder: EncoderSettings {
                scale: config.scale,
                preset: config.preset,
                bitrate: config.bitrate,
                crf: config.crf.crf,
                crf_max: config.crf.max,
                keyint: config.keyint,
                intra_refresh: config.intra_refresh,
            },
            output: OutputSettings {
                nal_mode: config.nal_mode,
                path: config.output.clone(),
            },
            log: config.log.clone(),
        }
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# Deskstream Configuration

[capture]
# Capture backend: null, legacy (alias gdi), hardware (alias dx)
backend = "legacy"

# Frames per second, N or N/D, between 1 and 50
fps = 5

# Screen size reported where the platform has no system metrics
screen_size = { width = 1920, height = 1080 }

# Cooldown in milliseconds after a capture or encoder resource fails
recovery_interval_ms = 3000

[encoder]
# Scale the capture before encoding: "none", a ratio "N/D", or a size "WxH".
# The encode size is then rounded down to a multiple of 4 and kept
# within 320x200..1920x1080.
scale = "none"

# x264 preset: ultrafast, superfast, veryfast, faster, fast, medium,
# slow, slower, veryslow, placebo
preset = "veryfast"

# VBV bitrate cap in kbps (0 = uncapped, otherwise 100..10000)
bitrate = 0

# Constant rate factor and its ceiling (0..51)
crf = 35
crf_max = 40

# Maximum keyframe interval in frames (1..250)
keyint = 5

# Rolling intra refresh instead of periodic keyframes
intra_refresh = false

[output]
# NAL delivery: whole-bulk, with-start-codes, without-start-codes
nal_mode = "whole-bulk"

# Output file; stdout when unset
# path = "capture.h264"

[log]
# Level: error, warn, info, debug, trace
level = "warn"
timestamps = false
source_location = false
"#
    .to_string()
}
