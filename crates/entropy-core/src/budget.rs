//! The entropy budget counter and the call gate in front of it.
//!
//! The counter is the only piece of state shared by every entropy primitive
//! in the sandbox. It is mutated in exactly two ways: [`EntropyBudget::permit_call`]
//! decrements it, and [`crate::grant::BudgetGrant`] sets it on entry and
//! clears it on exit.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::{GateError, GateResult};

#[derive(Debug, Default)]
pub struct EntropyBudget {
    remaining: AtomicU32,
}

static PROCESS_BUDGET: OnceLock<Arc<EntropyBudget>> = OnceLock::new();

/// The single process-wide budget.
///
/// Embedders that run one sandbox per process share this handle between the
/// gated primitive and the import hook. Tests construct their own
/// [`EntropyBudget`] instead.
pub fn process_budget() -> Arc<EntropyBudget> {
    PROCESS_BUDGET
        .get_or_init(|| Arc::new(EntropyBudget::new()))
        .clone()
}

impl EntropyBudget {
    pub const fn new() -> Self {
        Self {
            remaining: AtomicU32::new(0),
        }
    }

    /// Consume one unit of budget or fail.
    ///
    /// On failure nothing is consumed and the caller must not produce a
    /// value from any other source.
    pub fn permit_call(&self) -> GateResult<()> {
        match self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(before) => {
                tracing::trace!(remaining = before - 1, "entropy call permitted");
                Ok(())
            }
            Err(_) => {
                tracing::warn!("entropy call refused: budget exhausted");
                Err(GateError::BudgetExceeded)
            }
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// True while a grant is open and still has calls left. Blocked
    /// functions let calls through in this window.
    pub fn is_bad_entropy_enabled(&self) -> bool {
        self.remaining() > 0
    }

    pub(crate) fn set(&self, permitted: u32) -> u32 {
        self.remaining.swap(permitted, Ordering::SeqCst)
    }

    pub(crate) fn take(&self) -> u32 {
        self.remaining.swap(0, Ordering::SeqCst)
    }

    /// Address of the counter's backing storage.
    pub fn address(&self) -> usize {
        self.remaining.as_ptr() as usize
    }

    /// Write the counter's address as a decimal line to a diagnostic channel,
    /// so an external harness can observe the counter out of band.
    pub fn export_address<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.address())?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget_is_zero() {
        let budget = EntropyBudget::new();
        assert_eq!(budget.remaining(), 0);
        assert!(!budget.is_bad_entropy_enabled());
    }

    #[test]
    fn test_permit_call_with_zero_budget_fails() {
        let budget = EntropyBudget::new();
        assert!(matches!(budget.permit_call(), Err(GateError::BudgetExceeded)));
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_permit_call_decrements() {
        let budget = EntropyBudget::new();
        budget.set(2);
        budget.permit_call().unwrap();
        assert_eq!(budget.remaining(), 1);
        budget.permit_call().unwrap();
        assert_eq!(budget.remaining(), 0);
        assert!(budget.permit_call().is_err());
    }

    #[test]
    fn test_take_clears() {
        let budget = EntropyBudget::new();
        budget.set(5);
        assert_eq!(budget.take(), 5);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_concurrent_permits_never_overdraw() {
        let budget = Arc::new(EntropyBudget::new());
        budget.set(100);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = budget.clone();
                std::thread::spawn(move || {
                    (0..50).filter(|_| budget.permit_call().is_ok()).count()
                })
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 100);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_export_address_writes_decimal_line() {
        let budget = EntropyBudget::new();
        let mut out = Vec::new();
        budget.export_address(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        let parsed: usize = text.trim().parse().unwrap();
        assert_eq!(parsed, budget.address());
    }

    #[test]
    fn test_process_budget_is_shared() {
        let a = process_budget();
        let b = process_budget();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.address(), b.address());
    }
}
