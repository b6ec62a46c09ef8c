//! Sandboxed module objects.
//!
//! A module is a name plus a mutable table of exports. Initialization code
//! fills the table; protective patches replace entries after the fact.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{GateError, GateResult};
use crate::traits::Callable;
use crate::types::{ModuleName, Value};

/// Constructor for a fresh name iterator (temp-file name candidates and the
/// like).
pub type SequenceFactory =
    Arc<dyn Fn() -> Box<dyn Iterator<Item = String> + Send> + Send + Sync>;

#[derive(Clone)]
pub enum Export {
    Callable(Arc<dyn Callable>),
    Value(Value),
    Sequence(SequenceFactory),
}

impl Export {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> GateResult<Value> + Send + Sync + 'static,
    {
        Export::Callable(Arc::new(f))
    }

    pub fn sequence<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Iterator<Item = String> + Send> + Send + Sync + 'static,
    {
        Export::Sequence(Arc::new(factory))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Export::Callable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Export::Callable(_) => "callable",
            Export::Value(_) => "value",
            Export::Sequence(_) => "sequence",
        }
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Value(v) => f.debug_tuple("Value").field(v).finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

pub struct Module {
    name: ModuleName,
    exports: Mutex<BTreeMap<String, Export>>,
}

impl Module {
    pub fn new(name: impl Into<ModuleName>) -> Self {
        Self {
            name: name.into(),
            exports: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    fn lock(&self) -> GateResult<MutexGuard<'_, BTreeMap<String, Export>>> {
        self.exports
            .lock()
            .map_err(|e| GateError::Internal(format!("module {} lock poisoned: {}", self.name, e)))
    }

    fn missing(&self, attr: &str) -> GateError {
        GateError::AttributeNotFound {
            module: self.name.to_string(),
            name: attr.to_string(),
        }
    }

    /// Bind `attr`, returning whatever was bound before.
    pub fn set(&self, attr: &str, export: Export) -> GateResult<Option<Export>> {
        Ok(self.lock()?.insert(attr.to_string(), export))
    }

    pub fn get(&self, attr: &str) -> GateResult<Export> {
        self.lock()?
            .get(attr)
            .cloned()
            .ok_or_else(|| self.missing(attr))
    }

    pub fn remove(&self, attr: &str) -> GateResult<Option<Export>> {
        Ok(self.lock()?.remove(attr))
    }

    pub fn contains(&self, attr: &str) -> GateResult<bool> {
        Ok(self.lock()?.contains_key(attr))
    }

    /// Call the callable bound to `attr`.
    ///
    /// The export table is not locked while the callable runs, so callables
    /// may freely read or patch their own module.
    pub fn call(&self, attr: &str, args: &[Value]) -> GateResult<Value> {
        match self.get(attr)? {
            Export::Callable(f) => f.call(args),
            _ => Err(GateError::NotCallable {
                module: self.name.to_string(),
                name: attr.to_string(),
            }),
        }
    }

    /// Start a new iterator from the sequence factory bound to `attr`.
    pub fn new_sequence(&self, attr: &str) -> GateResult<Box<dyn Iterator<Item = String> + Send>> {
        match self.get(attr)? {
            Export::Sequence(factory) => Ok(factory()),
            _ => Err(GateError::NotCallable {
                module: self.name.to_string(),
                name: attr.to_string(),
            }),
        }
    }

    pub fn callable_names(&self) -> GateResult<Vec<String>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(_, export)| export.is_callable())
            .map(|(name, _)| name.clone())
            .collect())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("name", &self.name).finish()
    }
}
