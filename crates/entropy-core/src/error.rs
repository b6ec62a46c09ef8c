use thiserror::Error;

/// Errors raised by the gate, the grants, the dispatcher and the patches.
///
/// Variants carry module and attribute names so an operator can tell which
/// entry of the policy table needs attention.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("entropy budget exceeded: getentropy() called with no remaining allowance")]
    BudgetExceeded,

    #[error("{remaining} unexpected leftover getentropy calls (granted {permitted})")]
    LeftoverBudget {
        remaining: u32,
        permitted: u32,
        #[source]
        cause: Option<Box<GateError>>,
    },

    #[error("missing import context for {0}")]
    MissingPolicy(String),

    #[error("{module}.{name} is blocked: it depends on an insecure entropy seed")]
    BlockedCallInvoked { module: String, name: String },

    #[error("no module named '{0}'")]
    CapabilityUnavailable(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("no name sequence substitution active on {0}")]
    NoSubstitution(String),

    #[error("module '{module}' has no attribute '{name}'")]
    AttributeNotFound { module: String, name: String },

    #[error("{module}.{name} is not callable")]
    NotCallable { module: String, name: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// True for errors produced by the budget itself rather than by the
    /// code running under it.
    pub fn is_budget_violation(&self) -> bool {
        matches!(
            self,
            GateError::BudgetExceeded | GateError::LeftoverBudget { .. }
        )
    }
}

pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_leftover_display_matches_count() {
        let err = GateError::LeftoverBudget {
            remaining: 3,
            permitted: 10,
            cause: None,
        };
        assert_eq!(
            err.to_string(),
            "3 unexpected leftover getentropy calls (granted 10)"
        );
    }

    #[test]
    fn test_leftover_exposes_cause_as_source() {
        let err = GateError::LeftoverBudget {
            remaining: 1,
            permitted: 1,
            cause: Some(Box::new(GateError::SchemaError("bad".into()))),
        };
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "schema error: bad");
    }

    #[test]
    fn test_capability_unavailable_display() {
        let err = GateError::CapabilityUnavailable("ssl".into());
        assert_eq!(err.to_string(), "no module named 'ssl'");
    }

    #[test]
    fn test_budget_violation_classification() {
        assert!(GateError::BudgetExceeded.is_budget_violation());
        assert!(GateError::LeftoverBudget {
            remaining: 1,
            permitted: 2,
            cause: None
        }
        .is_budget_violation());
        assert!(!GateError::MissingPolicy("x".into()).is_budget_violation());
    }

    #[test]
    fn test_all_variants_have_display() {
        let errors = vec![
            GateError::BudgetExceeded,
            GateError::MissingPolicy("listed.but.unhandled".into()),
            GateError::BlockedCallInvoked {
                module: "random".into(),
                name: "random".into(),
            },
            GateError::CapabilityUnavailable("ssl".into()),
            GateError::SchemaError("invalid schema".into()),
            GateError::NoSubstitution("tempfile".into()),
            GateError::AttributeNotFound {
                module: "m".into(),
                name: "f".into(),
            },
            GateError::NotCallable {
                module: "m".into(),
                name: "f".into(),
            },
            GateError::Internal("lock poisoned".into()),
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
