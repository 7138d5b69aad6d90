use crate::{
    api::{self, handlers::auth::AuthState},
    api::handlers::auth::AuthenticationConfiguration,
    notify::LogNotifier,
    store::UserStore,
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub config: AuthenticationConfiguration,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let users = match &args.dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;
            info!("Using PostgreSQL user store");
            UserStore::Postgres(pool)
        }
        None => {
            warn!("No DSN configured; users are kept in memory and lost on restart");
            UserStore::memory()
        }
    };

    let auth_state = AuthState::new(args.config, users, Arc::new(LogNotifier))
        .context("Invalid authentication configuration")?;

    api::new(args.port, Arc::new(auth_state)).await
}
