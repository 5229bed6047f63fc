mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use connect_api::clock::SystemClock;
use connect_api::mailer::{HttpMailer, LogMailer, Mailer};
use connect_api::{ApiSettings, AppState, AppStateInner};
use connect_gateway::Dispatcher;

use crate::config::{Config, DEFAULT_LOG_FILTER};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(connect_db::Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(relay) => {
            info!("Sending mail through {}", relay.url);
            Arc::new(HttpMailer::new(
                relay.url.clone(),
                relay.api_key.clone(),
                relay.from.clone(),
                config.io_timeout,
            )?)
        }
        None => {
            warn!("CONNECT_MAIL_RELAY_URL not set; OTP mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let state: AppState = Arc::new(AppStateInner::new(
        db,
        Dispatcher::new(),
        mailer,
        Arc::new(SystemClock),
        ApiSettings {
            jwt_secret: config.jwt_secret.clone(),
            otp_ttl: config.otp_ttl,
            store_timeout: config.io_timeout,
            mail_timeout: config.io_timeout,
        },
    ));

    let app = connect_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Startup Connect listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
