//! The three capability traits every feature module implements a subset of
//! (spec §9 "Route auto-discovery", §4.7).
//!
//! A module is always `Module` (it has a lifecycle); it additionally
//! implements `RestApiCapability` if it exposes HTTP routes and
//! `RunnableCapability` if it owns a background task (the workflow engine's
//! executor, the vector pipeline's watcher).

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::api::RouteDecl;
use crate::context::ModuleCtx;

/// Every module's lifecycle hook, run once at startup in dependency order.
#[async_trait]
pub trait Module: Send + Sync {
    /// Construct the module's services from `ctx` and store them for
    /// `register_rest`/`start` to use. Called exactly once, before any
    /// capability method.
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()>;
}

/// A module that contributes HTTP routes.
///
/// `register_rest` must declare an authentication policy for every route it
/// adds (spec §4.7) — the returned `Vec<RouteDecl>` is what the startup
/// validator counts and checks before the server starts accepting
/// connections.
pub trait RestApiCapability: Send + Sync {
    /// # Errors
    /// Returns an error if the module's routes cannot be constructed (e.g.
    /// the module's `init` was skipped or failed).
    fn register_rest(
        &self,
        ctx: &ModuleCtx,
        router: Router,
    ) -> anyhow::Result<(Router, Vec<RouteDecl>)>;
}

/// A module that owns a long-running background task independent of the
/// request/response cycle (the workflow execution engine's lifecycle
/// bookkeeping, the vector pipeline's change-stream watcher).
#[async_trait]
pub trait RunnableCapability: Send + Sync {
    /// Start the background task. Must return once the task is spawned, not
    /// once it completes.
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Stop the background task and await a clean shutdown (spec §4.4.3
    /// "Shutdown": active executions are marked cancelled and persisted
    /// before this returns).
    async fn stop(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Blanket helper so modules can hold `Arc<dyn Module>` uniformly.
pub type DynModule = Arc<dyn Module>;
