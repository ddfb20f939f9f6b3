use anyhow::Result;
use clap::Parser;
use conduct_core::config::OrchestratorConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs the HTTP surface over the orchestration engine.
#[derive(Parser, Debug)]
#[command(name = "conduct-core")]
struct Cli {
    /// Overrides API_HOST from the environment.
    #[arg(long)]
    host: Option<String>,

    /// Overrides API_PORT from the environment.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("starting conduct-core orchestration engine");

    let cli = Cli::parse();
    let mut config = OrchestratorConfig::load()?;
    if let Some(host) = cli.host {
        config.api_host = host;
    }
    if let Some(port) = cli.port {
        config.api_port = port;
    }

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "listening");
    axum::serve(listener, conduct_core::api::router(config)).await?;

    Ok(())
}
