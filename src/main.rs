use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use whatsapp_onboarding_rs::{server, Config, GraphClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(&config)?;

    let graph = GraphClient::new(&config).context("failed to build the Graph API client")?;
    let state = Arc::new(server::AppState { config, graph });

    server::serve(state)
        .await
        .context("onboarding server exited with an error")?;

    Ok(())
}

/// Stdout logging, filtered by `RUST_LOG`, plus an optional append-only
/// file sink when one is configured.
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("whatsapp_onboarding_rs=info"));

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}
