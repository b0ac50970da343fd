use anyhow::Context;
use artisan::cache::CaptionCache;
use artisan::cli::{self, Cli};
use artisan::config::Config;
use artisan::shell::{AppState, Shell};
use artisan::{auth, db, generator, handlers};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "artisan=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Some(command) => cli::run(command, &config).await,
        None => serve(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.image_folder)
        .await
        .with_context(|| format!("failed to create {}", config.image_folder.display()))?;

    let conn = db::establish_connection(&config.database_path)
        .context("Failed to establish database connection")?;
    auth::create_admin_if_not_exists(&conn, &config.admin_password, config.bcrypt_cost).await?;

    let describer = generator::describer_from_config(
        &config.models,
        CaptionCache::new(config.captions_file()),
    );
    info!("Generating text with the {} describer", describer.name());

    let addr = config.bind_addr;
    let state: AppState = Arc::new(Shell::new(conn.clone(), config, describer));
    let app = handlers::router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Artisan dashboard running on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db::close(conn);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
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
    info!("Shutting down");
}
