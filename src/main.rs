mod browser;
mod config;
mod content;
mod entities;
mod export;
mod handler;
mod http_client;
mod logging;
mod metrics;
mod news;
mod tor;

use anyhow::{Context, Result};
use clap::Parser;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::proxy::ProxySettings;
use crate::config::AppConfig;
use crate::handler::state::AppState;
use crate::http_client::{ClientOptions, HttpClients};
use crate::tor::TorRotator;

#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct Args {
    #[arg(long, default_value = "config.toml")]
    config_file: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, action)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(&args)?;

    let config = AppConfig::load(&args.config_file)?;
    config.validate()?;

    let proxy_settings = ProxySettings::from_env(&config.proxy)?;
    tracing::info!(
        source = ?proxy_settings.source,
        url = ?proxy_settings.redacted(),
        "Resolved outbound proxy."
    );

    let loopback_address = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
    let metrics_socket_addr = SocketAddr::new(loopback_address, config.metrics_port);
    metrics::init(metrics_socket_addr)?;

    let tor = proxy_settings
        .is_tor()
        .then(|| Arc::new(TorRotator::new(&config.tor)));
    let clients = HttpClients::build(
        proxy_settings,
        &ClientOptions {
            timeout: config.search.timeout(),
            accept_invalid_certs: config.scrape.accept_invalid_certs,
        },
    )?;

    let server_socket_addr = SocketAddr::new(config.bind_address, config.port);
    let state = AppState {
        config: Arc::new(config),
        clients,
        tor,
    };

    let listener = tokio::net::TcpListener::bind(server_socket_addr)
        .await
        .with_context(|| format!("Couldn't bind {server_socket_addr}"))?;

    tracing::info!("Starting server on {server_socket_addr}...");

    axum::serve(listener, handler::router(state)).await?;

    Ok(())
}
