//! Interactive record-intercepting proxy
//!
//! Sits between one client and a set of backend routes, decodes the
//! record framing, and pauses on selected record types so an operator
//! can inspect, forward, or drop them.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                 RECORD INTERCEPTOR                   │
//!                    │                                                      │
//!   Client records   │  ┌──────────┐   record    ┌──────────────┐           │
//!   ─────────────────┼─▶│   net    │───queue────▶│  intercept   │           │
//!                    │  │ acceptor │             │   engine     │◀── operator
//!                    │  └────▲─────┘             └──────┬───────┘   console │
//!                    │       │                          │ forward           │
//!                    │       │ byte queue        ┌──────▼───────┐           │
//!   Backend records  │  ┌────┴─────┐             │   routing    │           │
//!   ◀────────────────┼──│  relay   │◀────────────│ route table  │◀──────────┼── Backends
//!                    │  └──────────┘   default   └──────────────┘           │
//!                    │                  route                               │
//!                    │  ┌────────────────────────────────────────────────┐  │
//!                    │  │  config · observability · lifecycle · codec    │  │
//!                    │  └────────────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use record_interceptor::config::{self, ProxyConfig};
use record_interceptor::intercept::{Operator, HELP};
use record_interceptor::lifecycle::{self, Shutdown};
use record_interceptor::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "record-interceptor")]
#[command(about = "Interactive record-intercepting proxy", long_about = None)]
struct Cli {
    /// Listening address (overrides the config file)
    #[arg(short, long)]
    addr: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(addr) = cli.addr {
        config.listener.bind_address = addr;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    config::validation::validate_config(&config).map_err(config::ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.initial.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validation guarantees the address parses.
        let addr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics endpoint");
        }
    }

    println!("Starting record-interceptor on {}...", config.listener.bind_address);
    println!("{HELP}");

    let shutdown = Shutdown::new();
    let operator = Operator::console()?;
    let startup = lifecycle::start(&config, operator, &shutdown).await?;
    tracing::info!(address = %startup.local_addr(), "Listening for connections");

    let interrupts = lifecycle::spawn_interrupt_listener();
    let exit = startup.run(interrupts).await;

    shutdown.trigger();
    tracing::info!(reason = ?exit, "Shutdown complete");
    Ok(())
}
