//! Host-side model of the sandboxed runtime: the resolved-module cache, the
//! resolver chain, and the gated entropy primitive.
//!
//! Module initialization is expected to run one module at a time. The locks
//! here only keep the structures consistent; serializing imports is the
//! import hook's job.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::budget::EntropyBudget;
use crate::error::{GateError, GateResult};
use crate::module::Module;
use crate::traits::{EntropySource, Resolver};

/// Forged entropy: zero bytes. Whatever passes the gate gets these.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroEntropy;

impl EntropySource for ZeroEntropy {
    fn fill(&self, dest: &mut [u8]) {
        dest.fill(0);
    }
}

/// Resolver over a fixed set of prebuilt modules.
#[derive(Default)]
pub struct StaticResolver {
    modules: BTreeMap<String, Arc<Module>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: Arc<Module>) -> Self {
        self.modules.insert(module.name().to_string(), module);
        self
    }
}

impl Resolver for StaticResolver {
    fn find(&self, name: &str) -> GateResult<Option<Arc<Module>>> {
        Ok(self.modules.get(name).cloned())
    }
}

pub struct Runtime {
    budget: Arc<EntropyBudget>,
    source: Arc<dyn EntropySource>,
    modules: Mutex<BTreeMap<String, Arc<Module>>>,
    resolvers: Mutex<Vec<Arc<dyn Resolver>>>,
}

fn poisoned<T>(what: &str) -> impl FnOnce(PoisonError<T>) -> GateError + '_ {
    move |e| GateError::Internal(format!("{} lock poisoned: {}", what, e))
}

impl Runtime {
    /// A runtime with its own budget and zero-filled forged entropy.
    pub fn new() -> Self {
        Self::with_budget(Arc::new(EntropyBudget::new()))
    }

    pub fn with_budget(budget: Arc<EntropyBudget>) -> Self {
        Self {
            budget,
            source: Arc::new(ZeroEntropy),
            modules: Mutex::new(BTreeMap::new()),
            resolvers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_entropy_source(mut self, source: Arc<dyn EntropySource>) -> Self {
        self.source = source;
        self
    }

    pub fn budget(&self) -> &Arc<EntropyBudget> {
        &self.budget
    }

    /// The gated entropy primitive. Fails with `BudgetExceeded` before
    /// touching `dest` if no call is permitted.
    pub fn getentropy(&self, dest: &mut [u8]) -> GateResult<()> {
        self.budget.permit_call()?;
        self.source.fill(dest);
        Ok(())
    }

    fn modules(&self) -> GateResult<MutexGuard<'_, BTreeMap<String, Arc<Module>>>> {
        self.modules.lock().map_err(poisoned("module cache"))
    }

    fn resolvers(&self) -> GateResult<MutexGuard<'_, Vec<Arc<dyn Resolver>>>> {
        self.resolvers.lock().map_err(poisoned("resolver chain"))
    }

    // -- module cache -------------------------------------------------------

    pub fn cached(&self, name: &str) -> GateResult<Option<Arc<Module>>> {
        Ok(self.modules()?.get(name).cloned())
    }

    pub fn cache_insert(&self, module: Arc<Module>) -> GateResult<Option<Arc<Module>>> {
        let name = module.name().to_string();
        Ok(self.modules()?.insert(name, module))
    }

    pub fn cache_remove(&self, name: &str) -> GateResult<Option<Arc<Module>>> {
        Ok(self.modules()?.remove(name))
    }

    // -- resolver chain -----------------------------------------------------

    pub fn push_resolver_front(&self, resolver: Arc<dyn Resolver>) -> GateResult<()> {
        self.resolvers()?.insert(0, resolver);
        Ok(())
    }

    pub fn push_resolver_back(&self, resolver: Arc<dyn Resolver>) -> GateResult<()> {
        self.resolvers()?.push(resolver);
        Ok(())
    }

    /// Remove `resolver` (by identity). Returns whether it was present.
    pub fn remove_resolver(&self, resolver: &Arc<dyn Resolver>) -> GateResult<bool> {
        let mut chain = self.resolvers()?;
        let before = chain.len();
        chain.retain(|r| !Arc::ptr_eq(r, resolver));
        Ok(chain.len() != before)
    }

    /// Variant of [`Runtime::remove_resolver`] for cleanup paths (drop
    /// guards) that must not fail. A poisoned lock is recovered.
    pub fn remove_resolver_lossy(&self, resolver: &Arc<dyn Resolver>) {
        self.resolvers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|r| !Arc::ptr_eq(r, resolver));
    }

    /// Variant of [`Runtime::cache_insert`] for cleanup paths.
    pub fn cache_insert_lossy(&self, module: Arc<Module>) {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.name().to_string(), module);
    }

    pub fn resolver_count(&self) -> GateResult<usize> {
        Ok(self.resolvers()?.len())
    }

    /// Resolve `name`: the cache first, then each resolver in order. A
    /// module found by a resolver is cached.
    pub fn resolve(&self, name: &str) -> GateResult<Arc<Module>> {
        if let Some(module) = self.cached(name)? {
            return Ok(module);
        }
        // Snapshot the chain so resolvers may themselves touch the runtime.
        let chain: Vec<Arc<dyn Resolver>> = self.resolvers()?.clone();
        for resolver in chain {
            if let Some(module) = resolver.find(name)? {
                self.cache_insert(module.clone())?;
                return Ok(module);
            }
        }
        Err(GateError::CapabilityUnavailable(name.to_string()))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
