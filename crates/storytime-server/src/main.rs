use std::net::SocketAddr;

use tracing::{info, warn};

use storytime_api::cleanup::{self, SESSION_MAX_AGE_HOURS};
use storytime_api::oauth::OAuthClients;
use storytime_api::session::SessionSigner;
use storytime_api::storage::UploadSet;
use storytime_api::{AppStateInner, router};
use storytime_db::Database;
use storytime_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    storytime_server::init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set STORYTIME_SESSION_SECRET in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;
    let uploads = UploadSet::photos(config.upload_dir.clone(), &config.upload_url).await?;
    let oauth = OAuthClients::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        config.facebook_app_id.clone(),
        config.facebook_app_secret.clone(),
    );
    if !oauth.google.is_configured() && !oauth.facebook.is_configured() {
        warn!("No OAuth provider is configured; nobody will be able to log in");
    }

    let state = AppStateInner::new(db, uploads, SessionSigner::new(&config.session_secret), oauth);

    // Background session cleanup (runs every hour)
    tokio::spawn(cleanup::run_session_cleanup(
        state.clone(),
        3600,
        SESSION_MAX_AGE_HOURS,
    ));

    let app = router(state);

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Story Time listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
