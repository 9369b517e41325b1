//! core_ledger - Core banking ledger HTTP server
//!
//! Serves the ledger engine over HTTP. Uses PostgreSQL when `DATABASE_URL`
//! is set, otherwise an in-memory store.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use core_ledger::domain::{AccountId, SystemClock};
use core_ledger::{api, db, Config, InMemoryLedgerStore, LedgerEngine, LedgerStore, PgLedgerStore};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "core_ledger=debug,tower_http=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Engine over `store`, with the cash account in place, wrapped in the HTTP app
async fn build_app<S: LedgerStore>(store: S, config: &Config) -> anyhow::Result<Router> {
    let engine = LedgerEngine::with_config(store, config.engine_config(), Arc::new(SystemClock));

    let cash_account_id = match config.cash_account_id {
        Some(id) => id,
        None => {
            let id = AccountId::new();
            tracing::warn!(cash_account_id = %id, "CASH_ACCOUNT_ID not set, generated a new cash account");
            id
        }
    };
    engine
        .ensure_system_account(cash_account_id, config.cash_currency)
        .await?;
    tracing::info!(
        cash_account_id = %cash_account_id,
        currency = %config.cash_currency,
        "Cash account ready"
    );

    let app = api::app(Arc::new(engine));
    if config.is_production() {
        Ok(app)
    } else {
        Ok(app.layer(CorsLayer::permissive()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting core_ledger server");

    let pool = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(config.lock_timeout)
                .connect(url)
                .await?;

            db::verify_connection(&pool).await?;
            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
            None
        }
    };

    let app = match &pool {
        Some(pool) => build_app(PgLedgerStore::new(pool.clone(), config.lock_timeout), &config).await?,
        None => build_app(InMemoryLedgerStore::with_lock_timeout(config.lock_timeout), &config).await?,
    };

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
