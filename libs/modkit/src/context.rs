//! `ModuleCtx` — the explicit dependency bag handed to every module at
//! `init` (spec §9 "Global state → dependency injection"). There is no
//! process-global singleton a handler can reach for; everything a module
//! needs is constructed at server start and threaded in through here.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::bootstrap::config::AppConfig;
use crate::metrics::MetricsRegistry;

/// A small typed service locator. Concrete services (the Mongo `Database`
/// handle, `AuthService`, repositories' shared state) are inserted once at
/// bootstrap and looked up by type — this is the "explicit dependencies"
/// mechanism, not a relaxation of it: nothing is inserted except what
/// `apps/server`'s bootstrap wires up, and modules only ever read.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), value);
    }

    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
    }
}

/// Handed to every module's `init` and to `RestApiCapability::register_rest`.
/// Cloning is cheap: every field is an `Arc`.
#[derive(Clone)]
pub struct ModuleCtx {
    config: Arc<AppConfig>,
    services: Arc<ServiceRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl ModuleCtx {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, services: Arc<ServiceRegistry>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            services,
            metrics,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Fetch a previously-registered shared service.
    ///
    /// # Errors
    /// Returns an error if nothing of type `T` was registered at bootstrap —
    /// a wiring bug, not a runtime condition callers should recover from.
    pub fn service<T: Send + Sync + 'static>(&self) -> anyhow::Result<Arc<T>> {
        self.services
            .get::<T>()
            .ok_or_else(|| anyhow::anyhow!("service {} not registered in ModuleCtx", std::any::type_name::<T>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thing(u32);

    #[test]
    fn service_registry_round_trips_by_type() {
        let mut registry = ServiceRegistry::new();
        registry.insert(Arc::new(Thing(42)));
        let fetched = registry.get::<Thing>().expect("thing registered");
        assert_eq!(fetched.0, 42);
        assert!(registry.get::<String>().is_none());
    }
}
