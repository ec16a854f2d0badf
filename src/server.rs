//! HTTP server bootstrap for the provenance registry.
//!
//! This module wires together:
//! - configuration
//! - the storage policy and proof tiers
//! - the ledger adapter
//! - the ownership resolver
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, Request};
use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::api::handlers::{health_check, metrics, metrics_json, readiness_check};
use crate::infra::{
    InMemoryProofStore, LedgerClient, MemoryMirrorJournal, MirrorJournal, PgProofStore,
    ProofTier, SqliteMirrorJournal, SqliteProofStore, StoragePolicy, TieredProofStore,
};
use crate::ledger::{EvmLedgerClient, LedgerConfig, MemoryLedger};
use crate::metrics::MetricsRegistry;
use crate::resolver::{OwnershipResolver, ResolverConfig};
use crate::telemetry::{extract_context_from_headers, init_telemetry, TelemetryConfig};

const DEFAULT_MAX_CONTENT_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_MIRROR_JOURNAL: &str = "sqlite://mirror-journal.db?mode=rwc";

/// Where the development secondary tier lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryStoreConfig {
    Memory,
    /// SQLite connection string, e.g. `sqlite://proofs.db?mode=rwc`
    Sqlite(String),
}

impl SecondaryStoreConfig {
    fn parse(value: &str) -> anyhow::Result<Option<Self>> {
        match value.trim() {
            "" | "none" | "off" => Ok(None),
            "memory" => Ok(Some(Self::Memory)),
            url if url.starts_with("sqlite:") => Ok(Some(Self::Sqlite(url.to_string()))),
            other => anyhow::bail!(
                "invalid SECONDARY_STORE {other:?} (expected memory, sqlite:<path> or none)"
            ),
        }
    }
}

/// Where ledger-registered proofs wait for their mirror write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorJournalConfig {
    /// Lost on restart; development only
    Memory,
    /// SQLite connection string
    Sqlite(String),
}

impl MirrorJournalConfig {
    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim() {
            "" => Ok(Self::Sqlite(DEFAULT_MIRROR_JOURNAL.to_string())),
            "memory" => Ok(Self::Memory),
            url if url.starts_with("sqlite:") => Ok(Self::Sqlite(url.to_string())),
            other => anyhow::bail!(
                "invalid MIRROR_JOURNAL {other:?} (expected sqlite:<path> or memory)"
            ),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL for the primary tier.
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub max_connections: u32,
    /// How long a request waits for a primary connection before the tier
    /// counts as unavailable.
    pub db_acquire_timeout: Duration,
    pub migrate_on_startup: bool,
    /// Secondary tier; ignored under a production policy.
    pub secondary: Option<SecondaryStoreConfig>,
    /// Largest accepted upload.
    pub max_content_bytes: usize,
    pub mirror_journal: MirrorJournalConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/provenance_registry".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let db_acquire_timeout = Duration::from_secs(
            std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5),
        );

        let migrate_on_startup = std::env::var("DB_MIGRATE_ON_STARTUP")
            .ok()
            .map(|v| {
                !matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "off"
                )
            })
            .unwrap_or(true);

        let secondary = match std::env::var("SECONDARY_STORE") {
            Ok(value) => SecondaryStoreConfig::parse(&value)?,
            Err(_) => None,
        };

        let max_content_bytes = std::env::var("MAX_CONTENT_BYTES")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONTENT_BYTES);

        let mirror_journal =
            MirrorJournalConfig::parse(&std::env::var("MIRROR_JOURNAL").unwrap_or_default())?;

        Ok(Self {
            database_url,
            listen_addr,
            max_connections,
            db_acquire_timeout,
            migrate_on_startup,
            secondary,
            max_content_bytes,
            mirror_journal,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<OwnershipResolver>,
    pub metrics: Arc<MetricsRegistry>,
    pub policy: StoragePolicy,
    pub ledger_name: &'static str,
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_telemetry(&TelemetryConfig::from_env())?;

    info!("Starting provenance registry v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let policy = StoragePolicy::from_env()?;
    info!(
        environment = %policy.environment(),
        listen_addr = %config.listen_addr,
        max_connections = config.max_connections,
        "Configuration loaded"
    );

    let state = build_state(&config, policy).await?;

    let mut router = app(state, config.max_content_bytes);
    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("Provenance registry is ready to accept connections");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    crate::telemetry::shutdown_telemetry();
    Ok(())
}

/// Connect tiers and the ledger, and assemble the resolver.
pub async fn build_state(config: &Config, policy: StoragePolicy) -> anyhow::Result<AppState> {
    // Lazy so an unreachable primary surfaces per request, where the policy decides
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect_lazy(&config.database_url)?;

    if config.migrate_on_startup {
        info!("Running database migrations...");
        match crate::migrations::run_postgres(&pool).await {
            Ok(()) => info!("Database migrations applied"),
            Err(e) if policy.is_production() => return Err(e.context("primary migrations")),
            Err(e) => warn!(error = %e, "Primary migrations failed; continuing in development"),
        }
    } else {
        info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
    }

    let primary: Arc<dyn ProofTier> = Arc::new(PgProofStore::new(pool));

    let secondary = match (&config.secondary, policy.secondary_allowed()) {
        (Some(secondary), true) => Some(connect_secondary(secondary).await?),
        (Some(_), false) => {
            warn!("SECONDARY_STORE is ignored under the production policy");
            None
        }
        (None, _) => None,
    };

    let store = Arc::new(TieredProofStore::new(policy, primary, secondary));

    let ledger: Arc<dyn LedgerClient> = match LedgerConfig::from_env() {
        Some(ledger_config) => {
            info!(
                rpc_url = %ledger_config.rpc_url,
                registry = ?ledger_config.registry_address,
                chain_id = ledger_config.chain_id,
                "EVM ledger configured"
            );
            Arc::new(EvmLedgerClient::new(ledger_config)?)
        }
        None => {
            warn!(
                "Ledger not configured (set LEDGER_RPC_URL, LEDGER_REGISTRY_ADDRESS, \
                 LEDGER_PRIVATE_KEY); using in-memory ledger"
            );
            Arc::new(MemoryLedger::new(policy)?)
        }
    };

    let journal = open_journal(&config.mirror_journal, policy).await?;

    let metrics = Arc::new(MetricsRegistry::new());
    let ledger_name = ledger.name();
    let resolver = OwnershipResolver::new(store, ledger)
        .with_config(ResolverConfig::from_env()?)
        .with_journal(journal)
        .with_metrics(metrics.clone());

    Ok(AppState {
        resolver: Arc::new(resolver),
        metrics,
        policy,
        ledger_name,
    })
}

async fn open_journal(
    config: &MirrorJournalConfig,
    policy: StoragePolicy,
) -> anyhow::Result<Arc<dyn MirrorJournal>> {
    let journal: Arc<dyn MirrorJournal> = match config {
        MirrorJournalConfig::Memory if policy.is_production() => {
            anyhow::bail!("MIRROR_JOURNAL=memory cannot be used in production")
        }
        MirrorJournalConfig::Memory => {
            warn!("Mirror journal kept in process memory; unmirrored proofs are lost on restart");
            Arc::new(MemoryMirrorJournal::new())
        }
        MirrorJournalConfig::Sqlite(url) => {
            let journal = SqliteMirrorJournal::from_path(url)
                .await
                .with_context(|| format!("open mirror journal {url}"))?;
            journal.initialize().await?;
            Arc::new(journal)
        }
    };

    let pending = journal.pending_count().await?;
    if pending > 0 {
        warn!(pending, "Mirror journal holds unmirrored proofs; run reconciliation");
    } else {
        info!(journal = journal.name(), "Mirror journal loaded");
    }
    Ok(journal)
}

async fn connect_secondary(config: &SecondaryStoreConfig) -> anyhow::Result<Arc<dyn ProofTier>> {
    let tier: Arc<dyn ProofTier> = match config {
        SecondaryStoreConfig::Memory => {
            info!("Secondary proof tier: process memory");
            Arc::new(InMemoryProofStore::new())
        }
        SecondaryStoreConfig::Sqlite(url) => {
            info!(url = %url, "Secondary proof tier: SQLite");
            let store = SqliteProofStore::from_path(url).await?;
            store.initialize().await?;
            Arc::new(store)
        }
    };
    Ok(tier)
}

/// Full application router: `/api`, health and metrics.
pub fn app(state: AppState, max_content_bytes: usize) -> Router {
    Router::new()
        .nest("/api", crate::api::router())
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .route("/metrics/json", get(metrics_json))
        .layer(DefaultBodyLimit::max(max_content_bytes))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let span = tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                );
                span.set_parent(extract_context_from_headers(request.headers()));
                span
            }),
        )
        .with_state(state)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secondary_store_parsing() {
        assert_eq!(
            SecondaryStoreConfig::parse("memory").unwrap(),
            Some(SecondaryStoreConfig::Memory)
        );
        assert_eq!(
            SecondaryStoreConfig::parse("sqlite://local.db?mode=rwc").unwrap(),
            Some(SecondaryStoreConfig::Sqlite(
                "sqlite://local.db?mode=rwc".into()
            ))
        );
        assert_eq!(SecondaryStoreConfig::parse("none").unwrap(), None);
        assert!(SecondaryStoreConfig::parse("redis://x").is_err());
    }

    #[test]
    fn test_mirror_journal_parsing() {
        assert_eq!(
            MirrorJournalConfig::parse("").unwrap(),
            MirrorJournalConfig::Sqlite(DEFAULT_MIRROR_JOURNAL.into())
        );
        assert_eq!(
            MirrorJournalConfig::parse("memory").unwrap(),
            MirrorJournalConfig::Memory
        );
        assert!(MirrorJournalConfig::parse("postgres://x").is_err());
    }

    #[tokio::test]
    async fn test_memory_journal_refused_in_production() {
        assert!(
            open_journal(&MirrorJournalConfig::Memory, StoragePolicy::production())
                .await
                .is_err()
        );
        let journal = open_journal(&MirrorJournalConfig::Memory, StoragePolicy::development())
            .await
            .unwrap();
        assert_eq!(journal.name(), "memory");
    }

    #[tokio::test]
    async fn test_sqlite_journal_is_initialized_on_open() {
        let journal = open_journal(
            &MirrorJournalConfig::Sqlite("sqlite::memory:".into()),
            StoragePolicy::production(),
        )
        .await
        .unwrap();
        assert_eq!(journal.pending_count().await.unwrap(), 0);
    }
}
