use std::sync::Arc;

use crate::error::GateResult;
use crate::module::Module;
use crate::types::Value;

// ---------------------------------------------------------------------------
// Callable: a function exported by a sandboxed module
// ---------------------------------------------------------------------------

pub trait Callable: Send + Sync {
    fn call(&self, args: &[Value]) -> GateResult<Value>;
}

impl<F> Callable for F
where
    F: Fn(&[Value]) -> GateResult<Value> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> GateResult<Value> {
        self(args)
    }
}

// ---------------------------------------------------------------------------
// Resolver: one strategy in the runtime's module resolution chain
//
// Ok(None) defers to the next resolver; Err stops resolution and surfaces to
// the importer.
// ---------------------------------------------------------------------------

pub trait Resolver: Send + Sync {
    fn find(&self, name: &str) -> GateResult<Option<Arc<Module>>>;
}

// ---------------------------------------------------------------------------
// EntropySource: where the sandbox gets the bytes handed out by getentropy
// ---------------------------------------------------------------------------

pub trait EntropySource: Send + Sync {
    fn fill(&self, dest: &mut [u8]);
}
