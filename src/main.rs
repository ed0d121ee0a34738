//! Enterprise Nexus daemon
//!
//! ## Usage
//!
//! ```bash
//! # Development: fixed JWT secret, database under the default data dir
//! enterprise-nexus --dev-mode --admin-username root --admin-password secret123
//!
//! # Production
//! JWT_SECRET=... MOONSHOT_API_KEY=... enterprise-nexus --config /etc/nexus.toml
//!
//! # Throwaway in-memory database
//! enterprise-nexus --dev-mode --database-url :memory:
//! ```
//!
//! Policy analysis is disabled when no summarizer key is configured; the
//! rest of the API still runs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use enterprise_nexus::auth::{Authenticator, JwtValidator, RolePolicy};
use enterprise_nexus::services::spawn_logging_listener;
use enterprise_nexus::summarizer::{MoonshotSummarizer, Summarizer};
use enterprise_nexus::{Args, Config, Database, HttpServer, Services};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Upper bound for a single summarization call
const SUMMARIZER_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("enterprise_nexus=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_args(&args).context("failed to load configuration")?;

    info!(
        data_dir = %config.data_dir.display(),
        bind = %config.bind_addr(),
        "Starting enterprise-nexus"
    );

    tokio::fs::create_dir_all(&config.data_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Database::open(&config.database_path())?;
    if db.is_in_memory() {
        warn!("Using an in-memory database; all data is lost on exit");
    }

    if config.jwt_secret.is_none() && config.dev_mode {
        warn!("Running with the built-in development JWT secret");
    }
    let jwt = JwtValidator::new(config.effective_jwt_secret()?, config.jwt_expiry_seconds)?;
    let roles = RolePolicy::with_overrides(&config.roles)?;
    info!(roles = ?roles.roles(), "Role policy loaded");
    let authenticator = Authenticator::new(jwt, roles, config.missing_scope_policy()?);

    let summarizer: Option<Arc<dyn Summarizer>> = match &config.summarizer_api_key {
        Some(key) => {
            info!(model = %config.summarizer_model, "Policy summarizer enabled");
            Some(Arc::new(MoonshotSummarizer::new(
                config.summarizer_base_url.clone(),
                config.summarizer_model.clone(),
                key.clone(),
                SUMMARIZER_TIMEOUT,
            )?))
        }
        None => {
            warn!("No summarizer API key - policy analysis will fail until one is configured");
            None
        }
    };

    let services = Arc::new(Services::new(
        db,
        authenticator,
        summarizer,
        Duration::from_secs(config.fetch_timeout_secs),
    )?);

    services.policies.sweep_interrupted()?;
    services.reports.sweep_interrupted()?;

    if let (Some(username), Some(password)) = (&args.admin_username, &args.admin_password) {
        if services.auth.bootstrap_admin(username, password)?.is_none() {
            info!(username = %username, "Bootstrap administrator already exists");
        }
    }

    let _event_log = spawn_logging_listener(services.events.clone());

    let bind_addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr()))?;
    let server = Arc::new(HttpServer::new(services, bind_addr, config.backups_dir()));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    server_task.await??;
    info!("enterprise-nexus stopped");
    Ok(())
}
