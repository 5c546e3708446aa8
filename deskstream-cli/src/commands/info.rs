//! Info command - show encoder and capture capabilities

use anyhow::Result;
use deskstream_core::capture;
use deskstream_core::config::{BackendKind, ConfigFile};
use deskstream_core::encode::{self, CompressorSettings};

/// Show libx264 availability, capture backends and the negotiated encode size
pub async fn info(file: &ConfigFile) -> Result<()> {
    let config = file.to_stream_config();

    println!("Deskstream - System Information\n");

    println!("H.264 Encoding:");
    let x264 = encode::x264_available();
    println!("  libx264 available: {}", if x264 { "yes" } else { "no" });
    if !x264 {
        println!();
        println!("  Make sure FFmpeg is installed and built with --enable-libx264.");
    }
    println!("  Tune:    {}", CompressorSettings::TUNE);
    println!("  Profile: {}", CompressorSettings::PROFILE);
    println!("  Presets: {}", encode::x264_presets().join(", "));

    println!();

    println!("Capture Backends:");
    let available = capture::available_backends();
    for kind in BackendKind::ALL {
        let icon = if available.contains(&kind) { "[OK]" } else { "[--]" };
        let marker = if kind == config.backend { " (configured)" } else { "" };
        println!("  {} {}{}", icon, kind, marker);
    }
    if !available.contains(&config.backend) {
        println!();
        println!("  The configured backend is not available on this platform.");
        println!("  Try: deskstream run --backend null");
    }

    println!();

    println!("Display:");
    let screen = capture::screen_size(config.screen_size);
    if cfg!(windows) {
        println!("  Screen size:  {}", screen);
    } else {
        println!("  Screen size:  {} (configured, no system metrics)", screen);
    }
    println!("  Scale:        {}", config.scale);
    println!(
        "  Encode size:  {}",
        encode::negotiate_encode_size(screen, &config.scale)
    );
    println!(
        "  Encode range: {} .. {}",
        encode::MIN_ENCODE_SIZE,
        encode::MAX_ENCODE_SIZE
    );

    Ok(())
}
