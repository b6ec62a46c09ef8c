//! Import contexts: the procedures that run around one module's
//! initialization.
//!
//! Grant sizes below are audited against each dependency's init path. A
//! `LeftoverBudget` or `BudgetExceeded` from one of them means the dependency
//! changed and its entry needs a new audit.

use std::sync::Arc;

use entropy_core::{
    with_budget, Export, GateError, GateResult, Module, ModuleName, Runtime, Value,
};

use crate::blocking::block_calls;
use crate::fallback::substitute_name_sequence;
use crate::hider::hide_capability;
use crate::patch::ExportOverride;
use crate::table::PolicyKind;

/// Native hash-map seed made by rust extension modules at init.
pub const RUST_HASHMAP_SEED_CALLS: u32 = 1;
/// Seeding of the global generator in `random`.
pub const RANDOM_SEED_CALLS: u32 = 10;
/// `numpy.random.mtrand` seeds itself from `secrets.randbits` at init.
pub const MTRAND_SEED_CALLS: u32 = 1;
/// `validate_core_schema` builds a second hash map before it fails.
pub const SCHEMA_VALIDATION_SEED_CALLS: u32 = 1;

/// Seeded constructors: safe because the caller supplies the seed, or
/// because every later call goes to the gate.
pub const RANDOM_ALLOWLIST: &[&str] = &["Random", "SystemRandom"];
pub const NUMPY_RANDOM_ALLOWLIST: &[&str] = &["default_rng"];

pub const SSL_CAPABILITY: &str = "ssl";
pub const RANDOM_MODULE: &str = "random";
const SCHEMA_VALIDATOR: &str = "validate_core_schema";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportContext {
    module: ModuleName,
    policy: PolicyKind,
}

impl ImportContext {
    pub(crate) fn new(module: ModuleName, policy: PolicyKind) -> Self {
        Self { module, policy }
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn policy(&self) -> PolicyKind {
        self.policy
    }

    /// Run `init` (the module's initialization) inside this context.
    ///
    /// `module` is the object being initialized; patches applied after init
    /// act on it.
    pub fn run<T, F>(&self, runtime: &Runtime, module: &Arc<Module>, init: F) -> GateResult<T>
    where
        F: FnOnce() -> GateResult<T>,
    {
        tracing::debug!(module = %self.module, policy = %self.policy, "entering import context");
        let budget = runtime.budget();
        let result = match self.policy {
            PolicyKind::RustPackage => with_budget(budget, RUST_HASHMAP_SEED_CALLS, init),
            PolicyKind::Random => {
                let value = with_budget(budget, RANDOM_SEED_CALLS, init)?;
                block_calls(runtime, module, RANDOM_ALLOWLIST)?;
                Ok(value)
            }
            PolicyKind::NumpyRandom => {
                let value = init()?;
                block_calls(runtime, module, NUMPY_RANDOM_ALLOWLIST)?;
                Ok(value)
            }
            PolicyKind::NumpyRandomMtrand => {
                let value = with_budget(budget, MTRAND_SEED_CALLS, init)?;
                // Stays blocked until the bad seed is replaced.
                block_calls(runtime, module, &[])?;
                Ok(value)
            }
            PolicyKind::Tempfile => {
                let value = init()?;
                substitute_name_sequence(module)?;
                Ok(value)
            }
            PolicyKind::AiohttpHttpWebsocket => with_random_shim(runtime, init),
            PolicyKind::WithoutSsl => hide_capability(runtime, SSL_CAPABILITY, init),
            PolicyKind::PydanticCore => pydantic_core(runtime, module, init),
        };
        match &result {
            Ok(_) => tracing::debug!(module = %self.module, "import context complete"),
            Err(e) => tracing::warn!(
                module = %self.module,
                policy = %self.policy,
                error = %e,
                "import context failed"
            ),
        }
        result
    }
}

/// `random.Random()` at init would seed a fresh generator from entropy. For
/// the duration of init it returns the already seeded `random` module
/// instead.
fn with_random_shim<T, F>(runtime: &Runtime, init: F) -> GateResult<T>
where
    F: FnOnce() -> GateResult<T>,
{
    let random = runtime.resolve(RANDOM_MODULE)?;
    let weak = Arc::downgrade(&random);
    let shim = Export::function(move |_| {
        weak.upgrade()
            .map(Value::Module)
            .ok_or_else(|| GateError::Internal("random module dropped during init".into()))
    });
    let _override = ExportOverride::install(random, "Random", shim)?;
    init()
}

/// One grant for the init hash map, then, whatever init did, one grant
/// around a schema validation that is known to build a second hash map and
/// then fail with `SchemaError`. That error, and only that error, is
/// ignored.
fn pydantic_core<T, F>(runtime: &Runtime, module: &Module, init: F) -> GateResult<T>
where
    F: FnOnce() -> GateResult<T>,
{
    let budget = runtime.budget();
    let init_result = with_budget(budget, RUST_HASHMAP_SEED_CALLS, init);
    let follow_up = match with_budget(budget, SCHEMA_VALIDATION_SEED_CALLS, || {
        module.call(SCHEMA_VALIDATOR, &[Value::None]).map(|_| ())
    }) {
        Err(GateError::SchemaError(message)) => {
            tracing::debug!(module = %module.name(), %message, "expected schema error ignored");
            Ok(())
        }
        other => other,
    };
    // When both fail, the init error is returned and the follow-up error is
    // only logged: the init failure is the root cause, the follow-up ran on a
    // half-initialized module.
    match (init_result, follow_up) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), follow_up) => {
            if let Err(ignored) = follow_up {
                tracing::warn!(
                    module = %module.name(),
                    error = %ignored,
                    "schema validation follow-up failed after init failure"
                );
            }
            Err(e)
        }
    }
}
