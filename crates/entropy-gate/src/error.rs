use entropy_core::GateError;
use thiserror::Error;

/// Errors surfaced by the import hook, configuration and CLI.
///
/// Import failures carry the module and the policy that was applied, which
/// is what an operator needs to extend or re-audit the policy table.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("import of '{module}' failed under the {policy} policy: {source}")]
    Import {
        module: String,
        policy: String,
        #[source]
        source: GateError,
    },

    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// The gate error underneath an import failure, if any.
    pub fn gate_error(&self) -> Option<&GateError> {
        match self {
            AppError::Import { source, .. } => Some(source),
            AppError::Gate(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(format!("TOML parse error: {}", e))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_error_display_names_module_and_policy() {
        let err = AppError::Import {
            module: "pkgB".into(),
            policy: "rust_package".into(),
            source: GateError::BudgetExceeded,
        };
        let msg = err.to_string();
        assert!(msg.contains("pkgB"));
        assert!(msg.contains("rust_package"));
        assert!(msg.contains("budget exceeded"));
    }

    #[test]
    fn test_gate_error_accessor() {
        let err = AppError::Import {
            module: "m".into(),
            policy: "random".into(),
            source: GateError::BudgetExceeded,
        };
        assert!(matches!(err.gate_error(), Some(GateError::BudgetExceeded)));
        assert!(AppError::Config("x".into()).gate_error().is_none());
    }

    #[test]
    fn test_from_gate_error() {
        let err: AppError = GateError::MissingPolicy("x.y".into()).into();
        assert!(err.to_string().contains("x.y"));
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err: AppError = json_err.into();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn test_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: AppError = toml_err.into();
        assert!(matches!(err, AppError::Config(_)));
    }
}
