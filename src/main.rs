#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use stat_sync_server::clients::ClientRegistry;
use stat_sync_server::config;
use stat_sync_server::kv::InMemoryKvStore;
use stat_sync_server::logging;
use stat_sync_server::rate_limit::RateLimiter;
use stat_sync_server::service::SyncService;
use stat_sync_server::stats::SyncMetrics;
use stat_sync_server::store::{InMemoryRoomDirectory, InMemoryUserStore};
use stat_sync_server::validator::UsernameValidator;
use stat_sync_server::web::{create_router, AppState};
use std::{net::SocketAddr, sync::Arc, time::Duration};

/// Stat Sync -- platform statistics synchronization service
#[derive(Parser, Debug)]
#[command(name = "stat-sync-server")]
#[command(about = "Platform statistics synchronization service for a social coding-practice tracker")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use code defaults.
    let cfg = Arc::new(config::load());

    // Handle --print-config: output the loaded configuration as JSON
    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    // Validate configuration. Note: config::load() already calls validate_config()
    // but only logs errors to stderr and continues. Here we capture the result to:
    // 1. Provide proper exit code for --validate-config mode
    // 2. Fail startup if core settings are unusable
    let validation_result = config::validate_config(&cfg);

    // Handle --validate-config: exit after validation
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Storage backend: InMemory");
                println!(
                    "  LeetCode cache TTL: {}s",
                    cfg.platforms.leetcode.cache_ttl_secs
                );
                println!(
                    "  GitHub cache TTL: {}s",
                    cfg.platforms.github.cache_ttl_secs
                );
                println!(
                    "  Codeforces cache TTL: {}s",
                    cfg.platforms.codeforces.cache_ttl_secs
                );
                println!("  Platform concurrency cap: {}", cfg.concurrency.platform);
                println!("  Bulk batch size: {}", cfg.bulk.batch_size);
                println!("  Username validator enabled: {}", cfg.validator.enabled);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    // In normal operation, propagate validation errors
    validation_result?;

    // Initialize logging from config.
    logging::init_with_config(&cfg.logging);

    let port: u16 = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "Starting stat-sync server");

    // Shared key-value store backs both the cache and the rate limiter.
    let kv = Arc::new(InMemoryKvStore::new());
    Arc::clone(&kv).start_cleanup_task(Duration::from_secs(cfg.server.kv_cleanup_interval_secs));

    let user_store = Arc::new(InMemoryUserStore::new());
    let rooms = Arc::new(InMemoryRoomDirectory::new());
    let clients = Arc::new(ClientRegistry::from_config(&cfg.platforms)?);
    let metrics = Arc::new(SyncMetrics::new());

    let service = SyncService::with_metrics(
        &cfg,
        user_store.clone(),
        rooms,
        kv.clone(),
        Arc::clone(&clients),
        Arc::clone(&metrics),
    );

    // Daily username re-validation keeps the known-invalid short-circuit
    // honest without charging refresh requests for it.
    if cfg.validator.enabled {
        let validator = Arc::new(UsernameValidator::new(
            user_store,
            clients,
            Arc::clone(service.limiter()),
            metrics,
            cfg.validator,
        ));
        let _ = validator.spawn();
    }

    let rate_limiter = Arc::new(RateLimiter::new(kv, cfg.rate_limit));
    let app = create_router(
        AppState {
            service,
            rate_limiter,
        },
        &cfg.server.cors_origins,
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cors_origins = %cfg.server.cors_origins,
        "Server started - refresh API under /v1, health at /health"
    );

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
