//! Config command - inspect, check and create the configuration file

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use deskstream_core::capture;
use deskstream_core::config::{sample_config, ConfigFile, StreamConfig};
use deskstream_core::encode::negotiate_encode_size;
use deskstream_core::geometry::FrameSize;

use super::with_hint;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective stream settings
    Show,

    /// Load a config file and report whether it is usable
    Check {
        /// File to check instead of the default one
        file: Option<PathBuf>,
    },

    /// Write the sample config to the default path
    Init {
        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Effective settings as label/value rows
///
/// `screen` is the capture size the encode size is negotiated from.
fn describe(config: &StreamConfig, screen: FrameSize) -> Vec<(&'static str, String)> {
    let bitrate = if config.has_bitrate_cap() {
        format!("{} kbps (VBV buffer {} kb)", config.bitrate, config.bitrate * 2)
    } else {
        "uncapped".to_string()
    };
    let refresh = if config.intra_refresh {
        "intra refresh"
    } else {
        "keyframes"
    };
    let output = match &config.output {
        Some(path) => path.display().to_string(),
        None => "stdout".to_string(),
    };

    vec![
        ("Backend", config.backend.to_string()),
        ("Framerate", format!("{} fps", config.fps)),
        ("Screen size", screen.to_string()),
        ("Scale", config.scale.to_string()),
        ("Encode size", negotiate_encode_size(screen, &config.scale).to_string()),
        ("Preset", config.preset.to_string()),
        ("CRF", format!("{} (ceiling {})", config.crf.crf, config.crf.max)),
        ("Bitrate", bitrate),
        ("Keyint", format!("{} frames, {}", config.keyint, refresh)),
        ("NAL mode", config.nal_mode.to_string()),
        ("Recovery", format!("{} ms", config.recovery_interval_ms)),
        ("Log level", config.log.level.clone()),
        ("Output", output),
    ]
}

fn print_settings(config: &StreamConfig) {
    let screen = capture::screen_size(config.screen_size);
    for (label, value) in describe(config, screen) {
        println!("  {:<12} {}", format!("{}:", label), value);
    }
}

/// Validate `config`, printing warnings; hard errors are returned
fn check(config: &StreamConfig) -> Result<()> {
    config.validate().map_err(with_hint)?;
    for warning in config.warnings() {
        println!("Warning: {}", warning);
    }
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration file already exists: {}\nUse --force to overwrite, or edit the existing file.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    std::fs::write(path, sample_config()).context("Failed to write config file")?;

    // The sample must load back to a valid config
    let written = ConfigFile::load_from(path).map_err(with_hint)?;
    written.to_stream_config().validate().map_err(with_hint)?;
    Ok(())
}

/// Run config subcommand
///
/// `file` is the configuration already loaded from the default path.
pub async fn config(args: ConfigArgs, file: &ConfigFile) -> Result<()> {
    let path = ConfigFile::default_path();

    match args.command {
        ConfigCommand::Path => {
            let state = if path.exists() { "exists" } else { "not created" };
            println!("{} ({})", path.display(), state);
        }
        ConfigCommand::Show => {
            if path.exists() {
                println!("Settings from {}\n", path.display());
            } else {
                println!("Default settings, no file at {}\n", path.display());
            }
            let stream = file.to_stream_config();
            print_settings(&stream);
            println!();
            if let Err(e) = check(&stream) {
                println!("Invalid: {:#}", e);
            }
        }
        ConfigCommand::Check { file: target } => {
            let target = target.unwrap_or(path);
            let stream = ConfigFile::load_from(&target)
                .map_err(with_hint)
                .with_context(|| format!("Failed to load {}", target.display()))?
                .to_stream_config();
            check(&stream)?;
            println!("{} is valid", target.display());
        }
        ConfigCommand::Init { force } => {
            init(&path, force)?;
            println!("Created configuration file: {}", path.display());
            println!("Run `deskstream config show` to see the effective settings.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskstream_core::config::{BackendKind, Crf};
    use deskstream_core::encode::NalMode;
    use deskstream_core::geometry::FrameScale;
    use tempfile::TempDir;

    fn value(rows: &[(&'static str, String)], label: &str) -> String {
        rows.iter()
            .find(|(l, _)| *l == label)
            .map(|(_, v)| v.clone())
            .unwrap()
    }

    #[test]
    fn test_describe_defaults() {
        let rows = describe(&StreamConfig::default(), FrameSize::new(1920, 1080));
        assert_eq!(value(&rows, "Backend"), "legacy");
        assert_eq!(value(&rows, "Encode size"), "1920x1080");
        assert_eq!(value(&rows, "CRF"), "35 (ceiling 40)");
        assert_eq!(value(&rows, "Bitrate"), "uncapped");
        assert_eq!(value(&rows, "Keyint"), "5 frames, keyframes");
        assert_eq!(value(&rows, "Recovery"), "3000 ms");
        assert_eq!(value(&rows, "Output"), "stdout");
    }

    #[test]
    fn test_describe_negotiates_from_screen() {
        let config = StreamConfig::default()
            .with_backend(BackendKind::Hardware)
            .with_scale(FrameScale::Ratio { num: 1, den: 2 })
            .with_crf(Crf::new(20, 28))
            .with_bitrate(800)
            .with_intra_refresh(true)
            .with_nal_mode(NalMode::WithStartCodes);
        let rows = describe(&config, FrameSize::new(2563, 1441));

        assert_eq!(value(&rows, "Screen size"), "2563x1441");
        assert_eq!(value(&rows, "Encode size"), "1280x720");
        assert_eq!(value(&rows, "Bitrate"), "800 kbps (VBV buffer 1600 kb)");
        assert_eq!(value(&rows, "Keyint"), "5 frames, intra refresh");
        assert_eq!(value(&rows, "NAL mode"), "with-start-codes");
    }

    #[test]
    fn test_check_rejects_invalid_config() {
        assert!(check(&StreamConfig::default()).is_ok());
        let err = check(&StreamConfig::default().with_keyint(0)).unwrap_err();
        assert!(err.to_string().contains("Hint:"));
    }

    #[test]
    fn test_init_writes_loadable_sample() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deskstream").join("config.toml");

        init(&path, false).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.to_stream_config(), StreamConfig::default());

        // Existing file is kept unless forced
        std::fs::write(&path, "[capture]\nbackend = \"null\"\n").unwrap();
        assert!(init(&path, false).is_err());
        init(&path, true).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap(), loaded);
    }
}
