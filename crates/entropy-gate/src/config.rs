use entropy_core::ModuleName;
use entropy_policy::PolicyTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Additions to the built-in policy table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Extra packages that build a native hash map at init and so need the
    /// default one-call grant.
    #[serde(default)]
    pub extra_rust_packages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Write the budget counter's address to stderr at startup.
    #[serde(default)]
    pub export_budget_address: bool,
}

/// Top-level configuration, loaded from TOML (typically
/// `~/.entropy-gate/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateConfig {
    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl GateConfig {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: GateConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        let builtin = PolicyTable::builtin();
        let mut seen = BTreeSet::new();
        for name in &self.policy.extra_rust_packages {
            if !ModuleName::is_well_formed(name) {
                return Err(AppError::Config(format!(
                    "extra_rust_packages: '{}' is not a dotted module name",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(AppError::Config(format!(
                    "extra_rust_packages: '{}' listed twice",
                    name
                )));
            }
            if let Some(kind) = builtin.entry(name).and_then(|e| e.custom) {
                return Err(AppError::Config(format!(
                    "extra_rust_packages: '{}' already has the {} policy",
                    name, kind
                )));
            }
        }
        Ok(())
    }

    /// The built-in table plus configured additions.
    pub fn policy_table(&self) -> PolicyTable {
        self.policy
            .extra_rust_packages
            .iter()
            .fold(PolicyTable::builtin(), |table, name| {
                table.with_rust_package(name)
            })
    }

    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".entropy-gate/config.toml")
    }
}
