// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Abuse Guard Service
//!
//! Guards credential-checking endpoints with two independent layers:
//!
//! 1. Per-client fixed-window rate limiting with escalating blocks
//! 2. Per-account lockout that stops credential stuffing regardless of
//!    source address
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `STORE_BACKEND`: `memory` or `redis` (default: memory). A fleet of
//!   more than one instance must use `redis` for the limits to hold.
//! - `REDIS_URL`: Connection string when `STORE_BACKEND=redis`
//! - `FAIL_POLICY`: `open` or `closed` when the store is unreachable
//!   (default: open)
//! - `ADMIN_EMAIL` / `ADMIN_PASSWORD_HASH`: a PHC-format Argon2id hash for
//!   the admin credential served by `/login`

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use abuse_guard::{
    clock::{Clock, SystemClock},
    config::{Config, FailPolicy, StoreBackend},
    handlers::{contact, health, login, metrics as metrics_handler, AppState, Limiters},
    lockout::{AccountLockoutManager, Argon2Verifier, StaticHashLookup},
    metrics::Metrics,
    middleware::{rate_limit, RouteGuard},
    store::{KeyValueStore, MemoryStore, RedisStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_config();
    info!(
        bind_addr = %config.bind_addr,
        backend = ?config.store.backend,
        fail_policy = ?config.store.fail_policy,
        "Starting abuse guard"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Select the store backend. This is an explicit choice; there is no
    // fallback from one backend to the other at runtime.
    let store: Arc<dyn KeyValueStore> = match &config.store.backend {
        StoreBackend::Memory => {
            let memory = Arc::new(MemoryStore::new(clock.clone()));

            // Spawn cleanup task
            let purge = memory.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                loop {
                    interval.tick().await;
                    purge.purge_expired().await;
                }
            });
            memory
        }
        StoreBackend::Redis { url } => Arc::new(RedisStore::connect(url, clock.clone()).await?),
    };

    let metrics = Arc::new(Metrics::new()?);
    let limiters = Limiters::new(
        &config.limiters,
        store.clone(),
        clock.clone(),
        config.store.fail_policy,
    );

    let mut lookup = StaticHashLookup::new();
    match (
        std::env::var("ADMIN_EMAIL"),
        std::env::var("ADMIN_PASSWORD_HASH"),
    ) {
        (Ok(email), Ok(hash)) => lookup.insert(&email, hash),
        _ => warn!("no admin credential configured, all logins will be rejected"),
    }
    let lockout = AccountLockoutManager::new(
        config.lockout.clone(),
        store.clone(),
        Arc::new(Argon2Verifier::new(lookup)),
        clock.clone(),
        config.store.fail_policy,
    );

    let login_guard = RouteGuard {
        limiter: limiters.admin_login.clone(),
        strategy: config.fingerprint.clone(),
        metrics: metrics.clone(),
        clock: clock.clone(),
    };
    let contact_guard = RouteGuard {
        limiter: limiters.contact_form.clone(),
        strategy: config.fingerprint.clone(),
        metrics: metrics.clone(),
        clock: clock.clone(),
    };

    let metrics_config = config.metrics.clone();
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        limiters,
        lockout,
        metrics,
        clock,
    });

    // Build router
    let mut app = Router::new()
        .route(
            "/login",
            post(login).layer(middleware::from_fn_with_state(login_guard, rate_limit)),
        )
        .route(
            "/contact",
            post(contact).layer(middleware::from_fn_with_state(contact_guard, rate_limit)),
        )
        .route("/health", get(health))
        .route("/healthz", get(health));
    if metrics_config.enabled {
        app = app.route(&metrics_config.path, get(metrics_handler));
    }
    let app = app.layer(TraceLayer::new_for_http()).with_state(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Load configuration from environment variables.
fn load_config() -> Config {
    let mut config = Config::default();
    if let Ok(addr) = std::env::var("BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(backend) = std::env::var("STORE_BACKEND") {
        if backend.eq_ignore_ascii_case("redis") {
            let url = std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
            config.store.backend = StoreBackend::Redis { url };
        }
    }
    if let Ok(policy) = std::env::var("FAIL_POLICY") {
        config.store.fail_policy = if policy.eq_ignore_ascii_case("closed") {
            FailPolicy::Closed
        } else {
            FailPolicy::Open
        };
    }
    config
}
