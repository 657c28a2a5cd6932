//! Define sets attached to custom shader materials.
//!
//! Keys and values are interned [`Symbol`]s kept sorted by key, so two sets
//! with the same contents hash identically regardless of insertion order.
//! The shader generator exposes every define to the template context (for
//! `$$ if NAME` style tests) and also emits it as a WGSL `const`.

use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::utils::interner::{self, Symbol};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderDefines {
    defines: Vec<(Symbol, Symbol)>,
}

impl ShaderDefines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing an existing value.
    pub fn set(&mut self, key: &str, value: &str) {
        let key = interner::intern(key);
        let value = interner::intern(value);
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => self.defines[idx].1 = value,
            Err(idx) => self.defines.insert(idx, (key, value)),
        }
    }

    /// Removes `key`; returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(key) = interner::get(key) else {
            return false;
        };
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => {
                self.defines.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        let key = interner::get(key)?;
        self.defines
            .binary_search_by_key(&key, |&(k, _)| k)
            .ok()
            .map(|idx| interner::resolve(self.defines[idx].1))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Later values win on conflicting keys.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for &(k, v) in &other.defines {
            self.set(interner::resolve(k), interner::resolve(v));
        }
    }

    /// Name-ordered view for template rendering.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<&'static str, &'static str> {
        self.defines
            .iter()
            .map(|&(k, v)| (interner::resolve(k), interner::resolve(v)))
            .collect()
    }

    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        rustc_hash::FxBuildHasher.hash_one(self)
    }
}

impl Hash for ShaderDefines {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.defines.hash(state);
    }
}

impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut out = Self::new();
        for (k, v) in defines {
            out.set(k, v);
        }
        out
    }
}
