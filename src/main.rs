use clap::Parser;
use lm_broker::{build_router, AppState, BrokerConfig, SharedRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "lm-broker",
    about = "Route OpenAI-style and Anthropic-style LLM requests to any configured backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in lm_broker::config::config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let (mut config, config_path) = BrokerConfig::find_and_load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let registry = SharedRegistry::new(config.to_registry()?);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        models = config.models.len(),
        "Starting lm-broker"
    );
    for model in &config.models {
        info!(
            alias = %model.alias,
            provider_type = %model.protocol,
            target_model = %model.target.model,
            url = %model.target.url,
            "Registered model"
        );
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()?;

    #[cfg(unix)]
    spawn_reload_on_sighup(registry.clone(), config_path.clone())?;

    let state = Arc::new(AppState { registry, client });

    let app = build_router(state);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Reload the config file on SIGHUP. A bad file keeps the current registry.
#[cfg(unix)]
fn spawn_reload_on_sighup(registry: SharedRegistry, path: PathBuf) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match BrokerConfig::load(&path).and_then(|c| c.to_registry()) {
                Ok(next) => {
                    info!(path = %path.display(), models = next.len(), "Reloaded config");
                    registry.replace(next);
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Config reload failed; keeping current models");
                }
            }
        }
    });
    Ok(())
}
