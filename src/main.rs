use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use plant_catalog::state::provider_from_config;
use plant_catalog::{config, db, logging, routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Read before logging starts so RUST_LOG may come from the file.
    let env_file = config::load_dotenv().context("invalid .env file")?;
    logging::init();
    match env_file {
        Some(path) => info!(path = %path.display(), "loaded environment file"),
        None => debug!("no .env file found"),
    }

    let config = Config::load().context("invalid configuration")?;
    config.log_summary();
    if !config.has_api_key() {
        warn!("OPENAI_API_KEY not set; suggestions and image generation are disabled");
    }

    let database_url = config.database_url.clone();
    let pool_size = config.pool_size;
    let pool = tokio::task::spawn_blocking(move || db::create_pool(&database_url, pool_size))
        .await
        .context("database setup task panicked")?
        .context("failed to open database")?;

    let provider = provider_from_config(&config).context("failed to build AI client")?;
    let port = config.port;
    let state = AppState::new(config, pool, provider);
    state
        .images
        .storage()
        .ensure_dir()
        .await
        .context("failed to create uploads directory")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let (bound, server) = warp::serve(routes(state.clone()))
        .try_bind_with_graceful_shutdown(addr, shutdown_signal())
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%bound, "server listening");
    server.await;

    info!("server stopped, closing database pool");
    drop(state);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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
}
