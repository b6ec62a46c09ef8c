//! Entropy budget gate and the host-side model of the sandboxed runtime.
//!
//! Every entropy-consuming primitive of the sandbox passes through
//! [`EntropyBudget::permit_call`]. The budget is zero except inside a
//! [`BudgetGrant`], which sets it to an exact count and fails if the count is
//! not fully consumed by the time the grant closes.

pub mod budget;
pub mod error;
pub mod grant;
pub mod module;
pub mod runtime;
pub mod traits;
pub mod types;

pub use budget::{process_budget, EntropyBudget};
pub use error::*;
pub use grant::{with_budget, BudgetGrant};
pub use module::{Export, Module, SequenceFactory};
pub use runtime::{Runtime, StaticResolver, ZeroEntropy};
pub use traits::*;
pub use types::*;
