//! Import context dispatch.
//!
//! Called by the import hook once per module load, before the module's
//! initialization runs.

use entropy_core::{GateError, GateResult, ModuleName};

use crate::context::ImportContext;
use crate::table::{PolicyKind, PolicyTable};

/// Pick the context that must wrap `module`'s initialization.
///
/// - not listed: `Ok(None)`, import normally;
/// - custom policy bound: that policy;
/// - native hash-map family: the default one-call grant;
/// - listed with neither: `MissingPolicy`. The caller must not go on to
///   initialize the module.
pub fn context_for(table: &PolicyTable, module: &str) -> GateResult<Option<ImportContext>> {
    let Some(entry) = table.entry(module) else {
        return Ok(None);
    };
    let policy = match (entry.custom, entry.rust_family) {
        (Some(kind), _) => kind,
        (None, true) => PolicyKind::RustPackage,
        (None, false) => {
            tracing::error!(module, "module is listed for entropy handling but has no policy");
            return Err(GateError::MissingPolicy(module.to_string()));
        }
    };
    tracing::debug!(module, policy = %policy, "import context selected");
    Ok(Some(ImportContext::new(ModuleName::new(module), policy)))
}
