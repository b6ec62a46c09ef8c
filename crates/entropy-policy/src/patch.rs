//! Scoped replacement of a single module export.

use std::sync::Arc;

use entropy_core::{Export, GateResult, Module};

/// Rebinds one export for as long as the guard lives. On drop the original
/// binding comes back, or the attribute is removed if there was none.
pub struct ExportOverride {
    module: Arc<Module>,
    attr: String,
    original: Option<Export>,
}

impl ExportOverride {
    pub fn install(module: Arc<Module>, attr: &str, replacement: Export) -> GateResult<Self> {
        let original = module.set(attr, replacement)?;
        tracing::debug!(module = %module.name(), attr, "export overridden");
        Ok(Self {
            module,
            attr: attr.to_string(),
            original,
        })
    }
}

impl Drop for ExportOverride {
    fn drop(&mut self) {
        let restored = match self.original.take() {
            Some(export) => self.module.set(&self.attr, export).map(|_| ()),
            None => self.module.remove(&self.attr).map(|_| ()),
        };
        if let Err(e) = restored {
            tracing::error!(module = %self.module.name(), attr = %self.attr, error = %e, "failed to restore export");
        }
    }
}
