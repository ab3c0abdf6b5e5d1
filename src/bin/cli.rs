//! `iridium-sbd-cli` — a small operator tool around the [`iridium_sbd`]
//! library: run the boot sequence, read status, or send a message from
//! the command line.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use iridium_sbd::config::Config;
use iridium_sbd::driver::IridiumSbd;
use iridium_sbd::session::SessionOptions;

/// Iridium 9602/9603 SBD modem driver CLI.
#[derive(Parser)]
#[command(name = "iridium-sbd-cli", version)]
struct Cli {
    /// Path to a TOML config file. Falls back to compiled defaults and
    /// `IRIDIUM_SBD_PATH`/`IRIDIUM_SBD_BAUD` env var overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the modem boot sequence (echo off, verbose on, clear buffers,
    /// enable registration and ring alerts).
    Init,
    /// Read current signal quality (`AT+CSQ`).
    Signal,
    /// Read MO/MT buffer status (`AT+SBDS`).
    Status,
    /// Compress (optional) and send a text message.
    SendText {
        text: String,
        /// Compress the text before sending.
        #[arg(long)]
        compressed: bool,
    },
    /// Send a binary message given as hex (e.g. `deadbeef`).
    SendBinary { hex: String },
    /// Read `AT+CRIS` ring indication status.
    RingStatus,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(1);
        }
    };

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    if let Err(e) = run(cli.command, &config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(feature = "serial")]
async fn open_driver(config: &Config) -> Result<IridiumSbd, iridium_sbd::IridiumError> {
    let transport = iridium_sbd::transport::serial::open(&config.path, config.baud_rate)?;
    Ok(IridiumSbd::new(transport))
}

#[cfg(not(feature = "serial"))]
async fn open_driver(_config: &Config) -> Result<IridiumSbd, iridium_sbd::IridiumError> {
    Err(iridium_sbd::IridiumError::NotOpen)
}

async fn run(command: Commands, config: &Config) -> Result<(), iridium_sbd::IridiumError> {
    let driver = open_driver(config).await?;

    match command {
        Commands::Init => {
            driver.init().await?;
            info!("modem initialized");
        }
        Commands::Signal => {
            let quality = driver.signal_quality(None).await?;
            println!("signal quality: {quality}/5");
        }
        Commands::Status => {
            let status = driver.sbd_status(None).await?;
            println!("{status:?}");
        }
        Commands::SendText { text, compressed } => {
            let options = SessionOptions {
                compressed,
                timeout: Some(Duration::from_secs(config.session_timeout_ms)),
                ..SessionOptions::default()
            };
            let result = driver.send_text_message(&text, &options).await?;
            println!(
                "moStatus={} ({}) mtStatus={} ({})",
                result.mo_status.0,
                result.mo_status_text(),
                result.mt_status.0,
                result.mt_status_text()
            );
        }
        Commands::SendBinary { hex } => {
            let payload = decode_hex(&hex)?;
            let options = SessionOptions {
                timeout: Some(Duration::from_secs(config.session_timeout_ms)),
                ..SessionOptions::default()
            };
            let result = driver.send_binary_message(&payload, &options).await?;
            println!(
                "moStatus={} ({}) mtStatus={} ({})",
                result.mo_status.0,
                result.mo_status_text(),
                result.mt_status.0,
                result.mt_status_text()
            );
        }
        Commands::RingStatus => {
            let status = driver.ring_indication_status(None).await?;
            println!("{status:?}");
        }
    }

    Ok(())
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, iridium_sbd::IridiumError> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(iridium_sbd::IridiumError::CommandError(
            "hex payload must have an even number of digits".to_string(),
        ));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| {
                iridium_sbd::IridiumError::CommandError(format!("invalid hex byte at offset {i}"))
            })
        })
        .collect()
}
