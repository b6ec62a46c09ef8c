//! Post-init call blocking.
//!
//! Functions that silently use a seed forged during the sandboxed window are
//! replaced by proxies that refuse to run. Allow-listed names stay untouched:
//! they make the caller supply its own seed or material.

use std::sync::Arc;

use entropy_core::{Callable, EntropyBudget, Export, GateError, GateResult, Module, Runtime, Value};

/// Proxy installed over a blocked export.
///
/// While a grant is open the call is forwarded, so code that legitimately
/// runs inside an import context can still use it.
pub struct BlockedCallable {
    module: String,
    name: String,
    inner: Arc<dyn Callable>,
    budget: Arc<EntropyBudget>,
}

impl Callable for BlockedCallable {
    fn call(&self, args: &[Value]) -> GateResult<Value> {
        if self.budget.is_bad_entropy_enabled() {
            return self.inner.call(args);
        }
        tracing::warn!(module = %self.module, name = %self.name, "blocked call invoked");
        Err(GateError::BlockedCallInvoked {
            module: self.module.clone(),
            name: self.name.clone(),
        })
    }
}

/// What a blocking pass did to one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReport {
    pub blocked: Vec<String>,
    pub allowed: Vec<String>,
}

/// Wrap every externally reachable callable of `module` in a
/// [`BlockedCallable`], except the names in `allowlist`.
///
/// Underscore-prefixed names are wrapped too: they are still reachable
/// through the module. The pass rewrites the export table as it stands, so
/// callables bound after it returns are not wrapped.
pub fn block_calls(runtime: &Runtime, module: &Module, allowlist: &[&str]) -> GateResult<BlockReport> {
    let mut report = BlockReport {
        blocked: Vec::new(),
        allowed: Vec::new(),
    };
    for name in module.callable_names()? {
        if allowlist.contains(&name.as_str()) {
            report.allowed.push(name);
            continue;
        }
        let Export::Callable(inner) = module.get(&name)? else {
            continue;
        };
        let proxy = BlockedCallable {
            module: module.name().to_string(),
            name: name.clone(),
            inner,
            budget: runtime.budget().clone(),
        };
        module.set(&name, Export::Callable(Arc::new(proxy)))?;
        report.blocked.push(name);
    }
    tracing::info!(
        module = %module.name(),
        blocked = report.blocked.len(),
        allowed = ?report.allowed,
        "insecure callables blocked"
    );
    Ok(report)
}
