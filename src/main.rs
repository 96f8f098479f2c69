//! PgRelay - Bridge PostgreSQL NOTIFY events to AMQP message brokers
//!
//! Usage:
//!   pgrelay [OPTIONS] <FILE>...
//!
//! Options:
//!   <FILE>...              Config files (or glob patterns), one bridge each
//!   -p, --persistent       Maintain a constant connection to RabbitMQ
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pgrelay::bridge::BridgeSupervisor;
use pgrelay::config;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// PgRelay - PostgreSQL NOTIFY to AMQP bridge
#[derive(Parser, Debug)]
#[command(name = "pgrelay")]
#[command(author = "PgRelay Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Bridge PostgreSQL NOTIFY events to AMQP message brokers")]
struct Args {
    /// Config files describing one messaging bridge each; glob patterns
    /// are expanded
    #[arg(value_name = "FILE", required = true)]
    config_file: Vec<String>,

    /// Maintain a constant connection to RabbitMQ instead of connecting
    /// per message
    #[arg(short, long)]
    persistent: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = args.log_level.unwrap_or_default();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Configuration errors abort the whole process before any bridge runs.
    let configs = match config::load_all(&args.config_file) {
        Ok(configs) => configs,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Unable to continue; exiting.");
            std::process::exit(1);
        }
    };

    info!("Starting PgRelay");
    info!(
        "  Broker connections: {}",
        if args.persistent {
            "persistent"
        } else {
            "per-message"
        }
    );
    info!("  Bridges: {} configured", configs.len());
    for config in &configs {
        info!(
            "    - {}: {}:{}/{} channel '{}' -> {}:{} exchange '{}' ({})",
            config.name,
            config.postgres.host,
            config.postgres.port,
            config.postgres.database,
            config.postgres.channel,
            config.rabbitmq.host,
            config.rabbitmq.port,
            config.rabbitmq.exchange,
            config.rabbitmq.exchange_type,
        );
    }

    BridgeSupervisor::new(configs, args.persistent).run().await;

    Ok(())
}
