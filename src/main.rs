use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use casework_api::config::{AppConfig, Environment};
use casework_api::crypto::Keychain;
use casework_api::database::{DatabaseManager, PgStore, Stores};
use casework_api::permissions::Role;
use casework_api::storage::{LocalStorage, Storage};
use casework_api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, KEYCHAIN_PATH, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    info!("Starting Casework API in {:?} mode", config.environment);

    let database = match config.database.url {
        Some(_) => Some(
            DatabaseManager::connect(&config.database)
                .await
                .context("failed to connect to database")?,
        ),
        None if config.environment == Environment::Development => {
            warn!("DATABASE_URL not set, using in-memory stores");
            None
        }
        None => anyhow::bail!("DATABASE_URL must be set outside development"),
    };
    let stores = match &database {
        Some(db) => Stores::postgres(PgStore::new(db.pool().clone())),
        None => Stores::memory(),
    };

    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(&config.uploads.storage_root)
            .await
            .with_context(|| format!("failed to open storage root {}", config.uploads.storage_root))?,
    );

    // Refuse to start without at least one private key
    let keychain = Keychain::load(storage.as_ref(), &config.keychain.path, &config.keychain.file_suffix)
        .await
        .context("failed to load keychain")?;

    let port = config.api.port;
    let state = AppState::new(config, keychain, storage, stores)?;
    bootstrap_admin(&state).await?;

    let app = casework_api::app(state);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Casework API listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(db) = database {
        db.close().await;
    }
    Ok(())
}

/// Create the first admin from BOOTSTRAP_ADMIN_EMAIL / BOOTSTRAP_ADMIN_PASSWORD
async fn bootstrap_admin(state: &AppState) -> anyhow::Result<()> {
    let (Ok(email), Ok(password)) = (
        std::env::var("BOOTSTRAP_ADMIN_EMAIL"),
        std::env::var("BOOTSTRAP_ADMIN_PASSWORD"),
    ) else {
        return Ok(());
    };

    if state.stores.users.find_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let admin = state.auth.register(&email, &password, Role::Admin)?;
    state.stores.users.insert(&admin).await?;
    info!(user_id = %admin.id, "Bootstrap admin created");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
