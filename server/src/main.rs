use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use moneymate::config::{load_config, validate_config};
use moneymate::{logging, Config, Pipeline};
use moneymate_server::auth::{CallbackSecret, JwtService};
use moneymate_server::{build_router, AppState};

#[derive(Parser)]
#[command(name = "moneymate-server", about = "Slip upload and OCR result API")]
struct Cli {
    /// JSON config file; defaults plus environment overrides when omitted.
    #[arg(long, env = "MONEYMATE_CONFIG")]
    config: Option<PathBuf>,
}

fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            let mut config = load_config(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            config.apply_env_overrides(|name| std::env::var(name).ok())?;
            validate_config(&config)?;
            config
        }
        None => Config::from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init(config.logging.format)?;

    let jwt_secret = config
        .auth
        .jwt_source()
        .resolve()
        .context("resolving JWT secret")?;
    let callback_secret = config
        .auth
        .callback_source()
        .resolve_optional()
        .context("resolving callback secret")?
        .map(|s| CallbackSecret::new(&s));
    if callback_secret.is_none() {
        log::warn!("No callback secret configured; /api/slips/callback accepts any caller");
    }

    let pipeline = Pipeline::from_config(&config)?;
    let state = Arc::new(AppState::new(
        pipeline.service,
        JwtService::new(&jwt_secret),
        callback_secret,
    ));
    let app = build_router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    log::info!("moneymate-server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received");
}
