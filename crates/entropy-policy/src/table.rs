//! The module policy table.
//!
//! Static data: which modules need handling at import, which custom policy
//! each one is bound to, and which belong to the native hash-map family that
//! gets the default one-call grant.

use entropy_core::ModuleName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// One grant for the native hash-map seed made at init.
    RustPackage,
    Random,
    NumpyRandom,
    NumpyRandomMtrand,
    Tempfile,
    AiohttpHttpWebsocket,
    /// Initialize with the `ssl` capability hidden.
    WithoutSsl,
    PydanticCore,
}

impl PolicyKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RustPackage => "rust_package",
            Self::Random => "random",
            Self::NumpyRandom => "numpy_random",
            Self::NumpyRandomMtrand => "numpy_random_mtrand",
            Self::Tempfile => "tempfile",
            Self::AiohttpHttpWebsocket => "aiohttp_http_websocket",
            Self::WithoutSsl => "without_ssl",
            Self::PydanticCore => "pydantic_core",
        }
    }

    /// Human-readable description of what the policy does around init.
    pub const fn summary(self) -> &'static str {
        match self {
            Self::RustPackage => "grant 1 entropy call for the native hash-map seed",
            Self::Random => {
                "grant 10 entropy calls, then block every callable except Random and SystemRandom"
            }
            Self::NumpyRandom => "no grant, then block every callable except default_rng",
            Self::NumpyRandomMtrand => "grant 1 entropy call, then block every callable",
            Self::Tempfile => {
                "no grant, then substitute _RandomNameSequence with the deterministic fallback"
            }
            Self::AiohttpHttpWebsocket => {
                "no grant; random.Random returns the random module for the duration of init"
            }
            Self::WithoutSsl => "no grant; ssl is unresolvable for the duration of init",
            Self::PydanticCore => {
                "grant 1 entropy call, then grant 1 more around validate_core_schema(None), ignoring SchemaError"
            }
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Packages whose init builds a native hash map and so makes one seed call.
pub const RUST_PACKAGES: &[&str] = &[
    "pydantic_core",
    "tiktoken",
    "cryptography.exceptions",
    "jiter",
];

pub const CUSTOM_POLICIES: &[(&str, PolicyKind)] = &[
    ("random", PolicyKind::Random),
    ("numpy.random", PolicyKind::NumpyRandom),
    ("numpy.random.mtrand", PolicyKind::NumpyRandomMtrand),
    ("tempfile", PolicyKind::Tempfile),
    ("aiohttp.http_websocket", PolicyKind::AiohttpHttpWebsocket),
    ("aiohttp.connector", PolicyKind::WithoutSsl),
    ("urllib3.util.ssl_", PolicyKind::WithoutSsl),
    ("requests.adapters", PolicyKind::WithoutSsl),
    ("pydantic_core", PolicyKind::PydanticCore),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyEntry {
    pub module: ModuleName,
    /// Custom policy bound to this module; takes precedence over the family
    /// default.
    pub custom: Option<PolicyKind>,
    pub rust_family: bool,
}

impl PolicyEntry {
    fn listed(module: &str) -> Self {
        Self {
            module: ModuleName::new(module),
            custom: None,
            rust_family: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTable {
    entries: BTreeMap<String, PolicyEntry>,
}

impl PolicyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The catalog the gate ships with.
    pub fn builtin() -> Self {
        let table = CUSTOM_POLICIES
            .iter()
            .fold(Self::empty(), |t, (module, kind)| t.with_custom(module, *kind));
        RUST_PACKAGES
            .iter()
            .fold(table, |t, module| t.with_rust_package(module))
    }

    fn entry_mut(&mut self, module: &str) -> &mut PolicyEntry {
        self.entries
            .entry(module.to_string())
            .or_insert_with(|| PolicyEntry::listed(module))
    }

    pub fn with_custom(mut self, module: &str, kind: PolicyKind) -> Self {
        self.entry_mut(module).custom = Some(kind);
        self
    }

    pub fn with_rust_package(mut self, module: &str) -> Self {
        self.entry_mut(module).rust_family = true;
        self
    }

    /// List a module as needing handling without binding anything to it.
    /// Importing it is a configuration defect.
    pub fn with_listed(mut self, module: &str) -> Self {
        self.entry_mut(module);
        self
    }

    pub fn contains(&self, module: &str) -> bool {
        self.entries.contains_key(module)
    }

    pub fn entry(&self, module: &str) -> Option<&PolicyEntry> {
        self.entries.get(module)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PolicyEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
