//! Entropy gate root library.
//!
//! Ties the budget, the policy table and the runtime model together behind
//! an [`ImportHook`]: the piece of the sandbox's import machinery that asks
//! for a module's import context and runs the module's initialization inside
//! it.
//!
//! # Import protocol
//!
//! ```text
//! exec_module(module, init)
//!   -> context_for(name)          None: run init unguarded
//!   -> context.run(init)          grants / hiding around init,
//!                                 blocking / substitution after it
//!   -> cache the module on success
//! ```
//!
//! Imports are serialized by a single lock: the budget and the resolver
//! chain are process-wide and do not support concurrent grants. The lock is
//! re-entrant, so an init may import other modules through the same hook.

pub mod config;
pub mod error;
mod lock;

pub use config::{DiagnosticsConfig, GateConfig, PolicyConfig};
pub use error::{AppError, AppResult};

use entropy_core::{process_budget, GateError, GateResult, Module, Runtime};
use entropy_policy::{context_for, restore_tempfile_name_sequence, PolicyKind, PolicyTable};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::lock::ImportLock;

/// Import hook guarding module initialization with the entropy policies.
pub struct ImportHook {
    runtime: Arc<Runtime>,
    table: PolicyTable,
    import_lock: ImportLock,
}

impl ImportHook {
    pub fn new(runtime: Arc<Runtime>, table: PolicyTable) -> Self {
        Self {
            runtime,
            table,
            import_lock: ImportLock::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    /// Initialize `module` by running `init` inside its import context.
    ///
    /// If the module is listed without a policy, `init` is not run. On any
    /// failure the module is left as `init` left it and is not cached.
    pub fn exec_module<F>(&self, module: &Arc<Module>, init: F) -> AppResult<()>
    where
        F: FnOnce(&Arc<Module>) -> GateResult<()>,
    {
        let _serialized = self.import_lock.acquire();
        let name = module.name().to_string();

        let context = context_for(&self.table, &name).map_err(|source| AppError::Import {
            module: name.clone(),
            policy: "none".into(),
            source,
        })?;

        let (policy, result) = match context {
            None => ("unguarded".to_string(), init(module)),
            Some(context) => (
                context.policy().to_string(),
                context.run(&self.runtime, module, || init(module)),
            ),
        };
        if let Err(source) = result {
            if source.is_budget_violation() {
                error!(
                    module = %name,
                    policy = %policy,
                    error = %source,
                    "entropy budget violated; the module's grant no longer matches its init"
                );
            } else {
                warn!(module = %name, policy = %policy, error = %source, "module initialization failed");
            }
            return Err(AppError::Import {
                module: name,
                policy,
                source,
            });
        }

        self.runtime.cache_insert(module.clone())?;
        info!(module = %name, policy = %policy, "module initialized");
        Ok(())
    }

    /// Create a module named `name`, initialize it with `init`, and return
    /// it.
    pub fn import<F>(&self, name: &str, init: F) -> AppResult<Arc<Module>>
    where
        F: FnOnce(&Arc<Module>) -> GateResult<()>,
    {
        let module = Arc::new(Module::new(name));
        self.exec_module(&module, init)?;
        Ok(module)
    }

    /// Put the real temp-name generator back once the sandboxed window is
    /// over.
    pub fn restore_name_sequence(&self) -> AppResult<()> {
        let _serialized = self.import_lock.acquire();
        restore_tempfile_name_sequence(&self.runtime)?;
        Ok(())
    }

    /// Diagnostic export of the budget counter's address.
    pub fn export_budget_address<W: Write>(&self, out: &mut W) -> AppResult<()> {
        self.runtime.budget().export_address(out)?;
        Ok(())
    }
}

/// What the dispatcher would do with a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation {
    pub module: String,
    pub listed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'static str>,
}

pub fn explain(table: &PolicyTable, module: &str) -> GateResult<Explanation> {
    let context = context_for(table, module)?;
    let policy = context.map(|c| c.policy());
    Ok(Explanation {
        module: module.to_string(),
        listed: table.contains(module),
        policy,
        summary: policy.map(PolicyKind::summary),
    })
}

/// Initialized gate: validated configuration plus the import hook bound to
/// the process-wide budget.
pub struct GateState {
    pub config: GateConfig,
    pub hook: ImportHook,
}

pub fn initialize(config: GateConfig) -> AppResult<GateState> {
    config.validate()?;
    let table = config.policy_table();
    info!(
        modules = table.len(),
        extra_rust_packages = config.policy.extra_rust_packages.len(),
        "initializing entropy gate"
    );
    let runtime = Arc::new(Runtime::with_budget(process_budget()));
    if runtime.budget().remaining() != 0 {
        return Err(AppError::Gate(GateError::Internal(
            "process budget is non-zero outside any grant".into(),
        )));
    }
    Ok(GateState {
        config,
        hook: ImportHook::new(runtime, table),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(table: PolicyTable) -> ImportHook {
        ImportHook::new(Arc::new(Runtime::new()), table)
    }

    #[test]
    fn test_unlisted_module_imports_unguarded() {
        let hook = hook(PolicyTable::builtin());
        let module = hook
            .import("json", |m| {
                m.set("dumps", entropy_core::Export::function(|_| Ok(entropy_core::Value::None)))?;
                Ok(())
            })
            .unwrap();
        assert!(Arc::ptr_eq(
            &hook.runtime().cached("json").unwrap().unwrap(),
            &module
        ));
    }

    #[test]
    fn test_unlisted_module_cannot_consume_entropy() {
        let hook = hook(PolicyTable::builtin());
        let runtime = hook.runtime().clone();
        let err = hook
            .import("json", |_| runtime.getentropy(&mut [0u8; 4]))
            .unwrap_err();
        match err {
            AppError::Import { policy, source, .. } => {
                assert_eq!(policy, "unguarded");
                assert!(matches!(source, GateError::BudgetExceeded));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_policy_skips_init() {
        let hook = hook(PolicyTable::builtin().with_listed("listed.but.unhandled"));
        let mut ran = false;
        let err = hook
            .import("listed.but.unhandled", |_| {
                ran = true;
                Ok(())
            })
            .unwrap_err();
        assert!(!ran);
        assert!(matches!(
            err.gate_error(),
            Some(GateError::MissingPolicy(_))
        ));
        assert!(hook
            .runtime()
            .cached("listed.but.unhandled")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_restore_without_tempfile_fails() {
        let hook = hook(PolicyTable::builtin());
        assert!(matches!(
            hook.restore_name_sequence().unwrap_err().gate_error(),
            Some(GateError::NoSubstitution(_))
        ));
    }

    #[test]
    fn test_export_budget_address() {
        let hook = hook(PolicyTable::builtin());
        let mut out = Vec::new();
        hook.export_budget_address(&mut out).unwrap();
        let addr: usize = String::from_utf8(out).unwrap().trim().parse().unwrap();
        assert_eq!(addr, hook.runtime().budget().address());
    }

    #[test]
    fn test_explain() {
        let table = PolicyTable::builtin();
        let e = explain(&table, "random").unwrap();
        assert!(e.listed);
        assert_eq!(e.policy, Some(PolicyKind::Random));
        assert!(e.summary.unwrap().contains("SystemRandom"));

        let e = explain(&table, "json").unwrap();
        assert!(!e.listed);
        assert_eq!(e.policy, None);

        let table = table.with_listed("listed.but.unhandled");
        assert!(matches!(
            explain(&table, "listed.but.unhandled"),
            Err(GateError::MissingPolicy(_))
        ));
    }

    #[test]
    fn test_explain_serializes_without_empty_fields() {
        let e = explain(&PolicyTable::builtin(), "json").unwrap();
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json, serde_json::json!({"module": "json", "listed": false}));
    }

    #[test]
    fn test_initialize_default_config() {
        let state = initialize(GateConfig::default()).unwrap();
        assert_eq!(state.hook.table(), &PolicyTable::builtin());
        assert!(Arc::ptr_eq(state.hook.runtime().budget(), &process_budget()));
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let mut config = GateConfig::default();
        config.policy.extra_rust_packages = vec!["tempfile".into()];
        assert!(matches!(initialize(config), Err(AppError::Config(_))));
    }
}
