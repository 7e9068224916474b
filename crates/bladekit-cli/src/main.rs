//! bladekit CLI
//!
//! Configuration checks, gesture mask decoding and offline replay of raw
//! driver notifications.

mod replay;

use std::path::{Path, PathBuf};

use bladekit::gesture;
use bladekit_config::{Config, LogLevel};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bladekit")]
#[command(about = "Event decoding toolkit for SwitchBlade devices")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/bladekit/config.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// Decode a raw gesture mask
    Decode {
        /// Mask in decimal or 0x-prefixed hex
        mask: String,
    },

    /// Replay raw driver notifications through a simulated session
    Replay {
        /// JSON-lines file to read; stdin when omitted
        file: Option<PathBuf>,

        /// Print events as JSON instead of one-line summaries
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    init_tracing(configured_log_level(&config_path));

    match cli.command {
        Commands::Validate => cmd_validate(&config_path),
        Commands::Decode { mask } => cmd_decode(&mask),
        Commands::Replay { file, json } => {
            let config = load_config_or_default(&config_path)?;
            replay::run(config, file, json)
                .await
                .map_err(|e| miette::miette!("{:#}", e))
        }
    }
}

/// `RUST_LOG` wins; otherwise the config's log level, then `warn`.
fn init_tracing(level: Option<LogLevel>) {
    let fallback = level.map(LogLevel::as_filter).unwrap_or("warn");
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

/// Log level from the config file, if it exists and parses.
fn configured_log_level(config_path: &Path) -> Option<LogLevel> {
    if !config_path.exists() {
        return None;
    }
    bladekit_config::parse_config(config_path)
        .ok()
        .map(|config| config.global.log_level)
}

fn load_config_or_default(config_path: &Path) -> miette::Result<Config> {
    if !config_path.exists() {
        tracing::warn!(
            "No configuration at {}, using defaults",
            config_path.display()
        );
        return Ok(Config::default());
    }

    tracing::info!("Loading configuration from {}", config_path.display());
    bladekit_config::parse_config(config_path).map_err(miette::Report::new)
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = bladekit_config::parse_config(config_path).map_err(miette::Report::new)?;

    println!("Configuration is valid!");
    println!("  Log level: {:?}", config.global.log_level);
    match &config.global.control_marker {
        Some(path) => println!("  Control marker: {}", path.display()),
        None => println!("  Control marker: disabled"),
    }
    println!("  Disable OS gestures: {}", config.global.disable_os_gestures);
    println!("  Touchpad:");
    if let Some(image) = &config.touchpad.image {
        println!("    Image: {}", image.display());
    }
    println!("    Gestures: {}", config.touchpad.gesture_set());
    println!("    OS gestures: {}", config.touchpad.os_gesture_set());
    println!("  Dynamic keys: {}", config.keys.len());
    for key in &config.keys {
        match &key.down {
            Some(down) => println!(
                "    - {}: {} / {}",
                key.key,
                key.up.display(),
                down.display()
            ),
            None => println!("    - {}: {}", key.key, key.up.display()),
        }
    }

    Ok(())
}

fn parse_mask(value: &str) -> miette::Result<u32> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|e| miette::miette!("Invalid mask '{}': {}", value, e))
}

fn cmd_decode(value: &str) -> miette::Result<()> {
    let mask = parse_mask(value)?;
    let decoded = gesture::decode(mask);

    println!("Mask:    {:#06x}", mask);
    println!("Decoded: {}", decoded);
    println!("Encoded: {:#06x}", gesture::encode(&decoded));

    match bladekit::decode_gesture(mask, 0, 0, 0, 0) {
        Ok((event, _)) => println!("Callback: single {} gesture", event.gesture),
        Err(e) => println!("Callback: rejected ({})", e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mask_formats() {
        assert_eq!(parse_mask("0x1FF").unwrap(), 0x1FF);
        assert_eq!(parse_mask("0X02").unwrap(), 2);
        assert_eq!(parse_mask("64").unwrap(), 64);
        assert!(parse_mask("0xZZ").is_err());
        assert!(parse_mask("-1").is_err());
    }

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from(["bladekit", "replay", "events.jsonl", "--json"]).unwrap();
        match cli.command {
            Commands::Replay { file, json } => {
                assert_eq!(file, Some(PathBuf::from("events.jsonl")));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
