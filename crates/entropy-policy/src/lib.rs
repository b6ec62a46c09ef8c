//! Import-time entropy policies.
//!
//! The import hook asks [`context_for`] which context must wrap a module's
//! initialization, then runs the init inside [`ImportContext::run`]. A
//! context combines any of:
//!
//! - an exact-budget grant around init (plus an optional follow-up grant);
//! - post-init blocking of callables that would use the forged seed;
//! - substitution of the temp-name generator with a deterministic sequence;
//! - hiding a capability (`ssl`) so init takes its entropy-free fallback.
//!
//! The table of modules and their policies is static data in [`table`].

pub mod blocking;
pub mod context;
pub mod dispatcher;
pub mod fallback;
pub mod hider;
pub mod patch;
pub mod table;

pub use blocking::{block_calls, BlockReport, BlockedCallable};
pub use context::ImportContext;
pub use dispatcher::context_for;
pub use fallback::{
    restore_name_sequence, restore_tempfile_name_sequence, substitute_name_sequence,
    DeterministicNameSequence,
};
pub use hider::{hide_capability, CapabilityHider, HidingResolver};
pub use patch::ExportOverride;
pub use table::{PolicyEntry, PolicyKind, PolicyTable};
