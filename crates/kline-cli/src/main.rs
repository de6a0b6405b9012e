//! K-Line CLI - Command-line tool for K-Line diagnostics over J2534 adapters
//!
//! Opens a PassThru adapter, negotiates an ISO9141 / ISO14230 channel and
//! monitors or exchanges messages. Every session writes a transaction log.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use kline_passthru::KLineProtocol;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::Preset;
use crate::config::{ArgOverrides, Config};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "kline-cli")]
#[command(author, version, about = "K-Line monitor and diagnostics over J2534 PassThru adapters")]
#[command(propagate_version = true)]
struct Cli {
    /// Adapter name or 1-based index from the adapters list
    #[arg(short, long, env = "KLINE_ADAPTER")]
    adapter: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "KLINE_CONFIG")]
    config: Option<PathBuf>,

    /// K-Line baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// K-Line protocol
    #[arg(short, long, value_enum)]
    protocol: Option<ProtocolArg>,

    /// Directory for transaction logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Use a simulated adapter instead of a driver module
    #[arg(long)]
    mock: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    /// ISO9141
    Iso9141,
    /// ISO14230 (KWP2000)
    Iso14230,
}

impl From<ProtocolArg> for KLineProtocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Iso9141 => KLineProtocol::Iso9141,
            ProtocolArg::Iso14230 => KLineProtocol::Iso14230,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List registered adapters
    Adapters,

    /// Show adapter version information and battery voltage
    Info,

    /// Log all bus traffic until Ctrl+C
    Monitor,

    /// Send one message
    Send {
        /// Payload as hex, e.g. "C1 33 F1 81"
        payload: Option<String>,

        /// Use a named payload instead of hex
        #[arg(long, value_enum, conflicts_with = "payload")]
        preset: Option<Preset>,
    },

    /// Send one message and print the responses
    Listen {
        /// Payload as hex, e.g. "81 11 F1"
        payload: Option<String>,

        /// Use a named payload instead of hex
        #[arg(long, value_enum, conflicts_with = "payload")]
        preset: Option<Preset>,

        /// How long to listen, in milliseconds
        #[arg(short, long, default_value = "5000")]
        duration: u64,
    },

    /// Transmit a keep-alive message periodically while monitoring
    Periodic {
        /// Payload as hex
        payload: Option<String>,

        /// Use a named payload instead of hex
        #[arg(long, value_enum, conflicts_with = "payload")]
        preset: Option<Preset>,

        /// Interval in milliseconds
        #[arg(short, long, default_value = "300")]
        interval: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(&ArgOverrides {
        adapter: cli.adapter.clone(),
        baud_rate: cli.baud,
        protocol: cli.protocol.map(Into::into),
        log_dir: cli.log_dir.clone(),
        output: Some(cli.output.into()),
        no_color: cli.no_color,
    });

    let ctx = OutputContext::new(cli.output, merged.no_color, cli.quiet);

    match &cli.command {
        Commands::Adapters => commands::adapters(&merged, &ctx)?,

        Commands::Info => commands::info(&merged, cli.mock, &ctx)?,

        Commands::Monitor => commands::monitor(&merged, cli.mock, &ctx)?,

        Commands::Send { payload, preset } => {
            commands::send(&merged, cli.mock, payload.as_deref(), *preset, &ctx)?
        }

        Commands::Listen {
            payload,
            preset,
            duration,
        } => commands::listen(
            &merged,
            cli.mock,
            payload.as_deref(),
            *preset,
            *duration,
            &ctx,
        )?,

        Commands::Periodic {
            payload,
            preset,
            interval,
        } => commands::periodic(
            &merged,
            cli.mock,
            payload.as_deref(),
            *preset,
            *interval,
            &ctx,
        )?,
    }

    Ok(())
}
