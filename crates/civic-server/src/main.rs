mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use civic_api::auth::{AppState, AppStateInner};
use civic_card::{CardRenderer, CardTemplates};
use civic_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "civic=debug,civic_api=debug,civic_db=info,civic_card=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and card templates
    let db = Database::open_with(&config.db_path, config.db)?;
    let templates =
        CardTemplates::load(config.light_template.as_deref(), config.dark_template.as_deref())?;
    info!(
        "Card format: {} (light template: {}, dark template: {})",
        config.card_format,
        describe(config.light_template.as_deref()),
        describe(config.dark_template.as_deref()),
    );

    let state: AppState = Arc::new(AppStateInner {
        db,
        renderer: CardRenderer::new(templates, config.card_format),
        session_secret: config.session_secret.clone(),
        session_ttl: chrono::Duration::hours(config.session_ttl_hours),
        public_url: config.public_url.clone(),
    });

    let app = civic_api::router(state, config.max_upload_bytes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Civic ID server listening on {}", config.addr);
    info!("Verification links point at {}", config.public_url);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn describe(path: Option<&std::path::Path>) -> String {
    path.map_or_else(|| "built-in".to_string(), |p| p.display().to_string())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
