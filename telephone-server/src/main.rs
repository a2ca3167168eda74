//! Telephone Server
//!
//! Binds the lobby server and serves until Ctrl-C.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use telephone::network::auth::AuthConfig;
use telephone::{GameServer, ServerConfig, TranslatorConfig, VERSION};

/// Broken-telephone lobby server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, env = "TELEPHONE_HOST")]
    host: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum live lobbies
    #[arg(long)]
    max_lobbies: Option<usize>,

    /// Seats per lobby
    #[arg(long)]
    capacity: Option<usize>,

    /// Players needed to start a match
    #[arg(long)]
    min_players: Option<usize>,

    /// JSON file to keep accounts in
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// LibreTranslate endpoint, e.g. http://localhost:5000/translate
    #[arg(long)]
    translate_url: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.bind_addr.set_ip(host);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(n) = self.max_lobbies {
            config.max_lobbies = n;
        }
        if let Some(n) = self.capacity {
            config.lobby_capacity = n;
        }
        if let Some(n) = self.min_players {
            config.min_players = n;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::from_env();
    args.apply(&mut config);

    let mut auth = AuthConfig::from_env();
    if args.credentials.is_some() {
        auth.credentials_path = args.credentials.clone();
    }
    let mut translator = TranslatorConfig::from_env();
    if args.translate_url.is_some() {
        translator.url = args.translate_url.clone();
    }

    info!("Telephone Server v{}", VERSION);
    info!(
        "Lobbies: {} x {} seats, {} players to start",
        config.max_lobbies, config.lobby_capacity, config.min_players
    );
    match &translator.url {
        Some(url) => info!("Translating through {}", url),
        None => warn!("No TRANSLATE_URL set, phrases pass through untranslated"),
    }

    let bind_addr = config.bind_addr;
    let server = Arc::new(
        GameServer::bootstrap(config, &auth, &translator)
            .await
            .context("failed to start server")?,
    );

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = serving => {
            result
                .context("server task panicked")?
                .with_context(|| format!("server on {bind_addr} stopped"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
            // Give workers a moment to send the notice and clean up.
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    }

    Ok(())
}
