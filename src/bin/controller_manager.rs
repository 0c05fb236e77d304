//! `kais-controller-manager` — boots all six resource controllers plus the
//! event consumer and serves `/healthz`/`/readyz` (§6, SPEC_FULL "Binaries").
//!
//! `KubeClient` and `DbClient` are abstract capabilities (out of scope, §1);
//! this binary wires their in-memory implementations, the same way a real
//! deployment would wire a `kube-rs` client and a `sqlx` pool behind the same
//! traits.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kais_bus::MessageBus;
use kais_controllers::{ControllerManager, InMemoryKubeClient};
use kais_events::{EventConsumer, InMemoryDbClient};

const RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "kais=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let namespace = std::env::var("KAIS_NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let nats_url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
    let database_dsn = std::env::var("DATABASE_URL").ok();
    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);

    tracing::info!(namespace, nats_url, has_database_dsn = database_dsn.is_some(), "starting kais-controller-manager");

    let kube = Arc::new(InMemoryKubeClient::new());
    let manager = Arc::new(ControllerManager::new(kube, namespace, nats_url));

    let bus = Arc::new(MessageBus::new());
    let db = Arc::new(InMemoryDbClient::new());
    let consumer = EventConsumer::new(bus, db);
    consumer.start().await?;

    let cancel = CancellationToken::new();
    let reconcile_cancel = cancel.clone();
    let reconcile_loop = tokio::spawn(async move { manager.run(RECONCILE_INTERVAL, reconcile_cancel).await });

    let app = Router::new()
        .route("/healthz", get(health_handler))
        .route("/readyz", get(health_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "health endpoints listening");

    let server_cancel = cancel.clone();
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        server_cancel.cancel();
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    cancel.cancel();
    reconcile_loop.await?;
    consumer.stop().await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}
