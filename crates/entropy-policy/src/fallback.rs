//! Deterministic stand-in for the temp-name generator.
//!
//! Temp-file names normally come from a randomly seeded generator. During the
//! sandboxed window they come from a counter instead. The tokens have no
//! collision resistance against other processes, so the real generator must
//! be restored before normal operation resumes.

use entropy_core::{Export, GateError, GateResult, Module, Runtime};

pub const NAME_ALPHABET: &[u8; 37] = b"abcdefghijklmnopqrstuvwxyz0123456789_";
pub const NAME_LENGTH: usize = 8;

/// Export replaced by the fallback.
pub const NAME_SEQUENCE_ATTR: &str = "_RandomNameSequence";
/// Where the original is parked until restored.
pub const ORIGINAL_NAME_SEQUENCE_ATTR: &str = "_orig_RandomNameSequence";

pub const TEMPFILE_MODULE: &str = "tempfile";

/// Encode `index` as 8 base-37 digits, least significant first.
pub fn encode_index(index: u64) -> String {
    let base = NAME_ALPHABET.len() as u64;
    let mut idx = index;
    let mut token = String::with_capacity(NAME_LENGTH);
    for _ in 0..NAME_LENGTH {
        token.push(NAME_ALPHABET[(idx % base) as usize] as char);
        idx /= base;
    }
    token
}

/// Infinite counter-driven token sequence. Every new instance starts over
/// at index 1.
#[derive(Debug, Default, Clone)]
pub struct DeterministicNameSequence {
    index: u64,
}

impl DeterministicNameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

impl Iterator for DeterministicNameSequence {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.index = self.index.wrapping_add(1);
        Some(encode_index(self.index))
    }
}

/// Swap the module's name-sequence factory for the deterministic one,
/// keeping the original for [`restore_name_sequence`].
pub fn substitute_name_sequence(module: &Module) -> GateResult<()> {
    if module.contains(ORIGINAL_NAME_SEQUENCE_ATTR)? {
        tracing::warn!(module = %module.name(), "name sequence already substituted");
        return Ok(());
    }
    let original = module.get(NAME_SEQUENCE_ATTR)?;
    module.set(ORIGINAL_NAME_SEQUENCE_ATTR, original)?;
    module.set(
        NAME_SEQUENCE_ATTR,
        Export::sequence(|| Box::new(DeterministicNameSequence::new())),
    )?;
    tracing::info!(module = %module.name(), "deterministic name sequence installed");
    Ok(())
}

/// Put the real name-sequence factory back. Fails with `NoSubstitution` if
/// none is active, so each substitution can be restored once.
pub fn restore_name_sequence(module: &Module) -> GateResult<()> {
    let original = module
        .remove(ORIGINAL_NAME_SEQUENCE_ATTR)?
        .ok_or_else(|| GateError::NoSubstitution(module.name().to_string()))?;
    module.set(NAME_SEQUENCE_ATTR, original)?;
    tracing::info!(module = %module.name(), "real name sequence restored");
    Ok(())
}

/// Restore the name sequence on the runtime's loaded `tempfile` module.
pub fn restore_tempfile_name_sequence(runtime: &Runtime) -> GateResult<()> {
    let module = runtime
        .cached(TEMPFILE_MODULE)?
        .ok_or_else(|| GateError::NoSubstitution(TEMPFILE_MODULE.to_string()))?;
    restore_name_sequence(&module)
}
