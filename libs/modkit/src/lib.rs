//! `modkit` — module trait, capability registry, request/tenant context,
//! bootstrap (config + logging), and the metrics registry that every
//! feature module in this backend is built against (spec §2, §9).
//!
//! Re-exports `inventory` so `#[modkit::module]`'s expansion (in
//! `modkit-macros`) never requires downstream crates to add a direct
//! dependency on it.

pub mod api;
pub mod bootstrap;
pub mod contracts;
pub mod context;
pub mod metrics;
pub mod registry;

pub use api::{AuthState, DynAuthorizationService, RouteDecl, RoutePolicy, SharedAuthState};
pub use contracts::{Module, RestApiCapability, RunnableCapability};
pub use context::{ModuleCtx, ServiceRegistry};
pub use metrics::MetricsRegistry;
pub use modkit_macros::module;
pub use registry::{ModuleRegistry, RegistryBuilder, RegistryError};

pub use inventory;
