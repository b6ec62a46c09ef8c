//! Scoped budget grants.
//!
//! A grant opens the gate for exactly `n` entropy calls. Closing it with
//! calls left over is a defect in the policy table: the dependency no longer
//! makes the number of calls the table was audited for.

use crate::budget::EntropyBudget;
use crate::error::{GateError, GateResult};

/// Open grant on a budget. Close it with [`BudgetGrant::finish`].
///
/// Grants overwrite the counter rather than add to it. Nesting a grant for
/// the same budget is only sound when the outer grant has nothing left at
/// the point the inner one opens.
#[must_use = "a grant must be closed with finish() to check for leftover budget"]
pub struct BudgetGrant<'a> {
    budget: &'a EntropyBudget,
    permitted: u32,
    finished: bool,
}

impl<'a> BudgetGrant<'a> {
    pub fn enter(budget: &'a EntropyBudget, permitted: u32) -> Self {
        let previous = budget.set(permitted);
        if previous > 0 {
            tracing::warn!(previous, permitted, "grant opened over unconsumed budget");
        }
        tracing::debug!(permitted, "entropy grant opened");
        Self {
            budget,
            permitted,
            finished: false,
        }
    }

    /// Close the grant, clearing the counter, and fail if anything was left.
    pub fn finish(mut self) -> GateResult<()> {
        self.finished = true;
        let remaining = self.budget.take();
        if remaining > 0 {
            tracing::error!(
                remaining,
                permitted = self.permitted,
                "entropy grant closed with leftover budget"
            );
            return Err(GateError::LeftoverBudget {
                remaining,
                permitted: self.permitted,
                cause: None,
            });
        }
        tracing::debug!(permitted = self.permitted, "entropy grant closed");
        Ok(())
    }
}

impl Drop for BudgetGrant<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Reached only while unwinding or when finish() was skipped.
        let remaining = self.budget.take();
        if remaining > 0 {
            tracing::error!(
                remaining,
                permitted = self.permitted,
                "entropy grant abandoned with leftover budget"
            );
        }
    }
}

/// Run `body` with exactly `permitted` entropy calls allowed.
///
/// The leftover check runs whether or not `body` succeeded. When both fail,
/// the body's error is kept as the cause of the `LeftoverBudget` error.
pub fn with_budget<T, F>(budget: &EntropyBudget, permitted: u32, body: F) -> GateResult<T>
where
    F: FnOnce() -> GateResult<T>,
{
    let grant = BudgetGrant::enter(budget, permitted);
    let result = body();
    match (result, grant.finish()) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(err), Ok(())) => Err(err),
        (Ok(_), Err(leftover)) => Err(leftover),
        (
            Err(err),
            Err(GateError::LeftoverBudget {
                remaining,
                permitted,
                ..
            }),
        ) => Err(GateError::LeftoverBudget {
            remaining,
            permitted,
            cause: Some(Box::new(err)),
        }),
        (Err(_), Err(other)) => Err(other),
    }
}
