//! Seismic DMS server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use sdms_core::config::AppConfig;
use sdms_server::bootstrap::seed_tenants;
use sdms_server::{AppState, ConfigEntitlements, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// sdmsd - seismic data management service
#[derive(Parser, Debug)]
#[command(name = "sdmsd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SDMS_CONFIG", default_value = "config/server.toml")]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `SDMS_` variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();

    if config_path.exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!("No config file found at {path}, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SDMS_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("sdmsd v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    // Register Prometheus metrics
    sdms_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // Initialize blob storage
    let storage = sdms_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    // Initialize journal
    let journal = sdms_journal::from_config(&config.journal)
        .await
        .context("failed to initialize journal")?;
    journal
        .health_check()
        .await
        .context("journal health check failed")?;
    tracing::info!("Journal initialized");

    // Connect the shared cache; its lifecycle belongs to this host
    let cache = sdms_locker::cache::from_config(&config.cache)
        .await
        .context("failed to connect cache")?;
    cache
        .health_check()
        .await
        .context("cache health check failed")?;
    tracing::info!("Cache connected");

    // Seed configured tenants
    let seeded = seed_tenants(journal.as_ref(), &config.tenants).await?;
    if seeded > 0 {
        tracing::info!(count = seeded, "Tenants seeded");
    }

    let entitlements = Arc::new(ConfigEntitlements::from_config(&config.auth));
    let state = AppState::new(
        config.clone(),
        journal,
        storage,
        Arc::clone(&cache),
        entitlements,
    );

    // Create router
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = cache.disconnect().await {
        tracing::warn!(error = %e, "Failed to disconnect cache");
    }
    tracing::info!("Server stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdms_core::config::{CacheConfig, JournalConfig};

    #[test]
    fn load_config_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9000"
skip_write_lock_check_on_mutable_operations = true

[journal]
type = "memory"

[storage]
type = "memory"

[cache]
type = "memory"

[auth]
enabled = false

[[tenants]]
name = "tenant-a"
esd = "opendes.contoso.com"
gcpid = "gcp-a"
default_acls = "users.datalake.admins@opendes.contoso.com"
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(config.server.skip_write_lock_check_on_mutable_operations);
        assert!(matches!(config.journal, JournalConfig::Memory));
        assert!(matches!(config.cache, CacheConfig::Memory));
        assert_eq!(config.tenants.len(), 1);
    }

    #[test]
    fn load_config_rejects_invalid_tenant() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[[tenants]]
name = "Bad Tenant"
esd = "nodomain"
gcpid = "gcp"
default_acls = "admins"
"#,
        )
        .unwrap();

        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("invalid configuration"));
    }
}
