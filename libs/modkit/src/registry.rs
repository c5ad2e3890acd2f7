//! Module auto-discovery and dependency-ordered startup (spec §9
//! "Route auto-discovery"). Grounded on the teacher's `inventory`-based
//! registry: every `#[modkit::module]`-annotated struct self-registers a
//! [`Registrator`] at link time; `ModuleRegistry::discover_and_build`
//! collects them, validates the dependency graph, and returns modules in
//! topological order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use crate::contracts::{Module, RestApiCapability, RunnableCapability};

#[derive(Clone)]
pub enum Capability {
    Rest(Arc<dyn RestApiCapability>),
    Runnable(Arc<dyn RunnableCapability>),
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Rest(_) => write!(f, "Rest(<impl RestApiCapability>)"),
            Capability::Runnable(_) => write!(f, "Runnable(<impl RunnableCapability>)"),
        }
    }
}

#[derive(Default, Clone)]
pub struct CapabilitySet {
    caps: Vec<Capability>,
}

impl CapabilitySet {
    #[must_use]
    pub fn rest(&self) -> Option<Arc<dyn RestApiCapability>> {
        self.caps.iter().find_map(|c| match c {
            Capability::Rest(r) => Some(r.clone()),
            Capability::Runnable(_) => None,
        })
    }

    #[must_use]
    pub fn runnable(&self) -> Option<Arc<dyn RunnableCapability>> {
        self.caps.iter().find_map(|c| match c {
            Capability::Runnable(r) => Some(r.clone()),
            Capability::Rest(_) => None,
        })
    }
}

pub struct ModuleEntry {
    name: &'static str,
    deps: &'static [&'static str],
    core: Arc<dyn Module>,
    caps: CapabilitySet,
}

impl ModuleEntry {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn deps(&self) -> &'static [&'static str] {
        self.deps
    }

    #[must_use]
    pub fn core(&self) -> &Arc<dyn Module> {
        &self.core
    }

    #[must_use]
    pub fn caps(&self) -> &CapabilitySet {
        &self.caps
    }
}

/// The function type submitted by `#[modkit::module]` via
/// `inventory::submit!`. Takes a *builder*, not the final registry.
pub struct Registrator(pub fn(&mut RegistryBuilder));

inventory::collect!(Registrator);

pub struct ModuleRegistry {
    modules: Vec<ModuleEntry>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    /// Discover every `#[modkit::module]`-annotated type linked into the
    /// binary, validate, and topo-sort.
    ///
    /// # Errors
    /// Returns [`RegistryError`] on duplicate names, unknown dependencies,
    /// or a dependency cycle.
    pub fn discover_and_build() -> Result<Self, RegistryError> {
        let mut builder = RegistryBuilder::default();
        for registrator in inventory::iter::<Registrator> {
            registrator.0(&mut builder);
        }
        builder.build_topo_sorted()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    core: HashMap<&'static str, Arc<dyn Module>>,
    deps: HashMap<&'static str, &'static [&'static str]>,
    capabilities: HashMap<&'static str, Vec<Capability>>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    pub fn register_core_with_meta(
        &mut self,
        name: &'static str,
        deps: &'static [&'static str],
        module: Arc<dyn Module>,
    ) {
        if self.core.contains_key(name) {
            self.errors.push(format!("module '{name}' is already registered"));
            return;
        }
        self.core.insert(name, module);
        self.deps.insert(name, deps);
    }

    pub fn register_rest_with_meta(&mut self, name: &'static str, cap: Arc<dyn RestApiCapability>) {
        self.capabilities.entry(name).or_default().push(Capability::Rest(cap));
    }

    pub fn register_runnable_with_meta(&mut self, name: &'static str, cap: Arc<dyn RunnableCapability>) {
        self.capabilities
            .entry(name)
            .or_default()
            .push(Capability::Runnable(cap));
    }

    fn validate_capabilities(&self) -> Result<(), RegistryError> {
        if !self.errors.is_empty() {
            return Err(RegistryError::InvalidConfiguration {
                errors: self.errors.clone(),
            });
        }
        for name in self.capabilities.keys() {
            if !self.core.contains_key(name) {
                return Err(RegistryError::UnknownModule((*name).to_owned()));
            }
        }
        Ok(())
    }

    fn detect_cycle(names: &[&'static str], adj: &[Vec<usize>]) -> Option<Vec<&'static str>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs(
            node: usize,
            names: &[&'static str],
            adj: &[Vec<usize>],
            colors: &mut [Color],
            path: &mut Vec<usize>,
        ) -> Option<Vec<&'static str>> {
            colors[node] = Color::Gray;
            path.push(node);
            for &next in &adj[node] {
                match colors[next] {
                    Color::Gray => {
                        let start = path.iter().position(|&n| n == next)?;
                        let mut cycle: Vec<&'static str> = path[start..].iter().map(|&i| names[i]).collect();
                        cycle.push(names[next]);
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = dfs(next, names, adj, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
            path.pop();
            colors[node] = Color::Black;
            None
        }

        let mut colors = vec![Color::White; names.len()];
        let mut path = Vec::new();
        for i in 0..names.len() {
            if colors[i] == Color::White {
                if let Some(cycle) = dfs(i, names, adj, &mut colors, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Finalize & topo-sort; verify deps and capability bindings reference
    /// known modules.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if validation fails or a cycle is detected.
    pub fn build_topo_sorted(self) -> Result<ModuleRegistry, RegistryError> {
        self.validate_capabilities()?;

        let names: Vec<&'static str> = self.core.keys().copied().collect();
        let mut idx = HashMap::new();
        for (i, &n) in names.iter().enumerate() {
            idx.insert(n, i);
        }

        let mut adj = vec![Vec::<usize>::new(); names.len()];
        for (&n, &deps) in &self.deps {
            let u = idx[n];
            for &d in deps {
                let v = *idx
                    .get(d)
                    .ok_or_else(|| RegistryError::UnknownDependency {
                        module: n.to_owned(),
                        depends_on: d.to_owned(),
                    })?;
                adj[v].push(u);
            }
        }

        if let Some(cycle) = Self::detect_cycle(&names, &adj) {
            return Err(RegistryError::CycleDetected { path: cycle });
        }

        let mut indeg = vec![0usize; names.len()];
        for list in &adj {
            for &target in list {
                indeg[target] += 1;
            }
        }
        let mut queue: VecDeque<usize> = (0..names.len()).filter(|&i| indeg[i] == 0).collect();
        let mut order = Vec::with_capacity(names.len());
        while let Some(u) = queue.pop_front() {
            order.push(u);
            for &w in &adj[u] {
                indeg[w] -= 1;
                if indeg[w] == 0 {
                    queue.push_back(w);
                }
            }
        }

        let mut modules = Vec::with_capacity(order.len());
        for i in order {
            let name = names[i];
            let deps = self.deps[name];
            let core = self.core[name].clone();
            let mut caps = CapabilitySet::default();
            if let Some(list) = self.capabilities.get(name) {
                caps.caps.clone_from(list);
            }
            modules.push(ModuleEntry {
                name,
                deps,
                core,
                caps,
            });
        }

        tracing::info!(
            modules = ?modules.iter().map(ModuleEntry::name).collect::<Vec<_>>(),
            "module dependency order resolved"
        );

        Ok(ModuleRegistry { modules })
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown module '{0}'")]
    UnknownModule(String),
    #[error("module '{module}' depends on unknown '{depends_on}'")]
    UnknownDependency { module: String, depends_on: String },
    #[error("cyclic module dependency: {}", path.join(" -> "))]
    CycleDetected { path: Vec<&'static str> },
    #[error("invalid registry configuration:\n{errors:#?}")]
    InvalidConfiguration { errors: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct DummyModule;

    #[async_trait]
    impl Module for DummyModule {
        async fn init(&self, _ctx: &crate::context::ModuleCtx) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn topo_sort_happy_path() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("a", &[], Arc::new(DummyModule));
        b.register_core_with_meta("b", &["a"], Arc::new(DummyModule));
        let reg = b.build_topo_sorted().expect("builds");
        let order: Vec<_> = reg.modules().iter().map(ModuleEntry::name).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("a", &["b"], Arc::new(DummyModule));
        b.register_core_with_meta("b", &["a"], Arc::new(DummyModule));
        let err = b.build_topo_sorted().unwrap_err();
        assert!(matches!(err, RegistryError::CycleDetected { .. }));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("a", &[], Arc::new(DummyModule));
        b.register_core_with_meta("a", &[], Arc::new(DummyModule));
        let err = b.build_topo_sorted().unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfiguration { .. }));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("a", &["missing"], Arc::new(DummyModule));
        let err = b.build_topo_sorted().unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDependency { .. }));
    }
}
