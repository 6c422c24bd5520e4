//! Agrinova Server: composition root for the auth core.
//!
//! Loads configuration, connects SurrealDB, wires the auth service and
//! runs housekeeping until shutdown. The API transport mounts on top of
//! the wired [`AuthService`].

mod config;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use agrinova_auth::{AuthService, AuthStores};
use agrinova_core::AgrinovaError;
use agrinova_db::repository::{
    SurrealAssignmentRepository, SurrealDeviceRepository, SurrealSecurityEventRepository,
    SurrealTokenRepository, SurrealUserRepository, SurrealWebSessionRepository,
};
use agrinova_db::{DbError, DbManager};
use surrealdb::engine::remote::ws::Client;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

type Service = AuthService<
    SurrealUserRepository<Client>,
    SurrealAssignmentRepository<Client>,
    SurrealDeviceRepository<Client>,
    SurrealTokenRepository<Client>,
    SurrealWebSessionRepository<Client>,
    SurrealSecurityEventRepository<Client>,
>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Auth(#[from] AgrinovaError),

    #[error("Signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    load_env_file();
    init_tracing()?;

    info!("Starting Agrinova auth server...");

    let config = ServerConfig::from_env()?;
    let housekeeping_every = config.housekeeping_interval_secs;

    let db = DbManager::connect_and_migrate(&config.db).await?;
    let service = Arc::new(build_service(&db, config)?);

    let housekeeper = (housekeeping_every > 0).then(|| {
        tokio::spawn(housekeeping(
            Arc::clone(&service),
            Duration::from_secs(housekeeping_every),
        ))
    });

    info!("Agrinova auth server ready");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Some(task) = housekeeper {
        task.abort();
    }
    info!("Agrinova auth server stopped.");
    Ok(())
}

/// `.env` in the working directory, or the file named by
/// `AGRINOVA_ENV_FILE`. A missing file is not an error.
fn load_env_file() {
    let loaded = match env::var("AGRINOVA_ENV_FILE") {
        Ok(path) => dotenvy::from_filename(path),
        Err(_) => dotenvy::dotenv(),
    };
    // Logging is not up yet.
    if let Err(e) = loaded {
        if !e.not_found() {
            eprintln!("Ignoring unreadable env file: {e}");
        }
    }
}

fn init_tracing() -> Result<(), ServerError> {
    let default_directive = "agrinova=info"
        .parse()
        .map_err(|e| ServerError::Logging(format!("{e}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_directive)
                .from_env_lossy(),
        )
        .json()
        .try_init()
        .map_err(|e| ServerError::Logging(e.to_string()))
}

fn build_service(db: &DbManager, config: ServerConfig) -> Result<Service, ServerError> {
    let client = db.client().clone();
    let users = match config.auth.pepper.clone() {
        Some(pepper) => SurrealUserRepository::with_pepper(client.clone(), pepper),
        None => SurrealUserRepository::new(client.clone()),
    };

    let stores = AuthStores {
        users,
        assignments: SurrealAssignmentRepository::new(client.clone()),
        devices: SurrealDeviceRepository::new(client.clone()),
        tokens: SurrealTokenRepository::new(client.clone()),
        web_sessions: SurrealWebSessionRepository::new(client.clone()),
        security_events: SurrealSecurityEventRepository::new(client),
    };
    Ok(AuthService::new(stores, config.auth)?)
}

/// Expire stale web sessions, drop lapsed rate-limit entries and
/// forget dead QR logins.
async fn housekeeping(service: Arc<Service>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match service.expire_stale_sessions().await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "Housekeeping expired web sessions"),
            Err(e) => error!(error = %e, "Housekeeping failed to expire sessions"),
        }
        service.prune_login_limits();
        let pruned = service.prune_qr_logins();
        if pruned > 0 {
            debug!(pruned, "Housekeeping dropped QR logins");
        }
    }
}
