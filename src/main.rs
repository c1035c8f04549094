use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use weighboard::config::{Cli, Config};
use weighboard::routes;
use weighboard::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    if config.users.is_empty() {
        tracing::warn!(
            "No [[users]] configured; only existing accounts can sign in. \
             See config.example.toml and copy it to {}",
            data_dir.join("config.toml").display()
        );
    }

    let state = AppState::initialize(config.clone())?;
    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
