//! Caching Proxy (v1)
//!
//! A minimal HTTP/1.1 file server and forward proxy built on Tokio.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ net::listener ──▶ net::connection ──▶ http::parser
//!                (permits)         (read / write)        │
//!                                                        ▼
//!                                              routing::dispatcher
//!                                               │                │
//!                                               ▼                ▼
//!                                            files        proxy::handler
//!                                          (web root)       │        │
//!                                                           ▼        ▼
//!                                                        cache   proxy::origin ──▶ Origin
//! ```

use clap::Parser;
use std::path::PathBuf;

use caching_proxy::config::{read_config, ConfigError, ProxyConfig};
use caching_proxy::lifecycle::{self, wait_for_signal, Shutdown};
use caching_proxy::observability::logging::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "caching-proxy", version, about = "HTTP/1.1 file server and caching forward proxy")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides `listener.host`).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides `listener.port`).
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory served for local targets (overrides `listener.web_root`).
    #[arg(long)]
    web_root: Option<PathBuf>,
}

impl Cli {
    /// Config file (or defaults) with the command-line overrides applied.
    ///
    /// Validation happens afterwards, at startup, so an override can fix a
    /// value the file gets wrong.
    fn into_config(mut self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match self.config.take() {
            Some(path) => read_config(&path)?,
            None => ProxyConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(self, config: &mut ProxyConfig) {
        if let Some(host) = self.host {
            config.listener.host = host;
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(web_root) = self.web_root {
            config.listener.web_root = web_root;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    init_tracing(&config.observability);
    tracing::info!("caching-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => tracing::info!(%signal, "Shutdown requested"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for signals"),
        }
        trigger.trigger();
    });

    lifecycle::run(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
