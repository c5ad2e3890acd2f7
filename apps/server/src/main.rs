//! Process entry point (spec §9): load config, init logging, connect to
//! Mongo, build the shared services every module depends on, discover every
//! `#[modkit::module]`-annotated type linked into this binary, start them in
//! dependency order, and serve until shutdown.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use modkit::bootstrap::config::AppConfig;
use modkit::bootstrap::logging::init_logging;
use modkit::{MetricsRegistry, ModuleCtx, ServiceRegistry, SharedAuthState};
use modkit_audit::{AuditTrailHandle, MongoAuditTrail};
use modkit_auth::{AuthService, AuthorizationService, MembershipDirectory};
use modkit_db::{Database, MongoDirectory};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_logging(&config).context("failed to initialize logging")?;

    info!(
        port = config.server_port,
        database = %config.database_name,
        "starting server"
    );

    let db = Database::connect(&config.database_uri, &config.database_name, config.max_connection_pool_size)
        .await
        .context("failed to connect to database")?;
    db.ensure_indexes().await.context("failed to ensure indexes")?;
    let db = Arc::new(db);

    let directory: Arc<dyn MembershipDirectory> = Arc::new(MongoDirectory::new(db.inner()));
    let auth_service = Arc::new(AuthService::new(config.token_signing_key.clone(), config.token_ttl_seconds));
    let authorization_service = Arc::new(AuthorizationService::new(directory));
    let shared_auth_state = SharedAuthState::new(auth_service, authorization_service);

    let audit = AuditTrailHandle(Arc::new(MongoAuditTrail::new(db.collection("audit_events"))));
    let metrics = Arc::new(MetricsRegistry::new());

    let mut services = ServiceRegistry::new();
    services.insert(Arc::clone(&db));
    services.insert(Arc::new(audit));
    services.insert(Arc::new(shared_auth_state));

    let ctx = ModuleCtx::new(Arc::new(config.clone()), Arc::new(services), Arc::clone(&metrics));

    let registry = modkit::ModuleRegistry::discover_and_build().context("module registry validation failed")?;

    for entry in registry.modules() {
        entry
            .core()
            .init(&ctx)
            .await
            .with_context(|| format!("module '{}' failed to initialize", entry.name()))?;
    }

    let mut router = Router::new();
    let mut route_decls = Vec::new();
    for entry in registry.modules() {
        if let Some(rest) = entry.caps().rest() {
            let (merged, decls) = rest
                .register_rest(&ctx, router)
                .with_context(|| format!("module '{}' failed to register routes", entry.name()))?;
            router = merged;
            route_decls.extend(decls);
        }
    }
    modkit::api::validate_route_policies(&route_decls)?;

    let operational = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::extract::Extension(Arc::clone(&db)))
        .layer(axum::extract::Extension(Arc::clone(&metrics)));

    let app = router
        .merge(operational)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let cancel = CancellationToken::new();
    for entry in registry.modules() {
        if let Some(runnable) = entry.caps().runnable() {
            runnable
                .start(cancel.clone())
                .await
                .with_context(|| format!("module '{}' failed to start", entry.name()))?;
        }
    }

    let listener = TcpListener::bind((config.server_host.as_str(), config.server_port))
        .await
        .context("failed to bind listener")?;
    info!(addr = %listener.local_addr().context("failed to read bound address")?, "listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down");
    cancel.cancel();
    for entry in registry.modules().iter().rev() {
        if let Some(runnable) = entry.caps().runnable() {
            if let Err(err) = runnable.stop(cancel.clone()).await {
                error!(module = entry.name(), %err, "module failed to stop cleanly");
            }
        }
    }

    Ok(())
}

async fn health(axum::extract::Extension(db): axum::extract::Extension<Arc<Database>>) -> axum::Json<modkit_db::DatabaseHealth> {
    axum::Json(db.health().await)
}

async fn metrics_handler(axum::extract::Extension(metrics): axum::extract::Extension<Arc<MetricsRegistry>>) -> String {
    metrics.render_prometheus()
}

/// Waits for either Ctrl-C or, on unix, `SIGTERM` — the signal a container
/// orchestrator sends before killing the process (spec §4.4.3 "Shutdown").
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl_c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
