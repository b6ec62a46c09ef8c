//! Temporary capability hiding.
//!
//! Some packages take an entropy-free fallback path when a capability such as
//! `ssl` cannot be resolved. Hiding it for the duration of their init forces
//! that path.

use std::sync::Arc;

use entropy_core::{GateError, GateResult, Module, Resolver, Runtime};

/// Resolver that refuses one name and defers on every other.
#[derive(Debug, Clone)]
pub struct HidingResolver {
    name: String,
}

impl HidingResolver {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Resolver for HidingResolver {
    fn find(&self, name: &str) -> GateResult<Option<Arc<Module>>> {
        if name == self.name {
            return Err(GateError::CapabilityUnavailable(name.to_string()));
        }
        Ok(None)
    }
}

/// Scope guard: while alive, `name` is evicted from the cache and refused by
/// a resolver at the front of the chain. Dropping it removes the resolver and
/// puts back the evicted module, on every exit path including panics.
pub struct CapabilityHider<'rt> {
    runtime: &'rt Runtime,
    name: String,
    interceptor: Arc<dyn Resolver>,
    previous: Option<Arc<Module>>,
}

impl<'rt> CapabilityHider<'rt> {
    pub fn install(runtime: &'rt Runtime, name: &str) -> GateResult<Self> {
        let previous = runtime.cache_remove(name)?;
        let interceptor: Arc<dyn Resolver> = Arc::new(HidingResolver::new(name));
        if let Err(e) = runtime.push_resolver_front(interceptor.clone()) {
            if let Some(module) = previous {
                runtime.cache_insert_lossy(module);
            }
            return Err(e);
        }
        tracing::debug!(capability = name, was_loaded = previous.is_some(), "capability hidden");
        Ok(Self {
            runtime,
            name: name.to_string(),
            interceptor,
            previous,
        })
    }
}

impl Drop for CapabilityHider<'_> {
    fn drop(&mut self) {
        self.runtime.remove_resolver_lossy(&self.interceptor);
        if let Some(module) = self.previous.take() {
            self.runtime.cache_insert_lossy(module);
        }
        tracing::debug!(capability = %self.name, "capability restored");
    }
}

/// Run `body` with `name` unresolvable.
pub fn hide_capability<T, F>(runtime: &Runtime, name: &str, body: F) -> GateResult<T>
where
    F: FnOnce() -> GateResult<T>,
{
    let _hider = CapabilityHider::install(runtime, name)?;
    body()
}
