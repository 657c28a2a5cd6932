//! Program cache.
//!
//! One entry per distinct [`ProgramKey`]. Materials acquire the program of
//! their current key and release it when the key changes or the material is
//! disposed; an entry is destroyed when its last user releases it.
//!
//! A program that fails to generate or compile stays in the cache in the
//! [`ProgramState::Failed`] state, so every draw resolving to that key is
//! skipped without retrying the compile each frame.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};

use super::features::{ProgramKey, ProgramParameters};
use super::layout::ProgramLayout;
use super::shader_gen::{self, ProgramBindings};
use crate::errors::ProgramDiagnostics;
use crate::renderer::core::device::{GpuDevice, ProgramId, ProgramSource};
use crate::resources::material::ShaderMaterial;
use crate::utils::warn_once;

new_key_type! {
    /// Handle to a [`ProgramCache`] entry.
    pub struct ProgramHandle;
}

/// A program the device accepted.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub id: ProgramId,
    pub layout: Arc<ProgramLayout>,
    pub bindings: Arc<ProgramBindings>,
    pub source_hash: u64,
}

#[derive(Debug, Clone)]
pub enum ProgramState {
    Compiled(CompiledProgram),
    Failed(ProgramDiagnostics),
}

#[derive(Debug)]
struct ProgramEntry {
    key: ProgramKey,
    label: String,
    state: ProgramState,
    used_times: u32,
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramCacheStats {
    pub hits: u64,
    /// Cold compiles, failed ones included.
    pub misses: u64,
    pub live_programs: usize,
    pub failed_programs: usize,
}

#[derive(Debug, Default)]
pub struct ProgramCache {
    entries: SlotMap<ProgramHandle, ProgramEntry>,
    by_key: FxHashMap<ProgramKey, ProgramHandle>,
    hits: u64,
    misses: u64,
}

impl ProgramCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the program of `params.key()`, compiling it on a miss.
    /// Every call counts as one more user of the entry.
    pub fn acquire<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        params: &ProgramParameters,
        shader: Option<&ShaderMaterial>,
    ) -> ProgramHandle {
        let key = params.key();
        if let Some(&handle) = self.by_key.get(&key)
            && let Some(entry) = self.entries.get_mut(handle)
        {
            entry.used_times += 1;
            self.hits += 1;
            return handle;
        }

        self.misses += 1;
        let state = compile(device, &key, shader, &params.label);
        let handle = self.entries.insert(ProgramEntry {
            key,
            label: params.label.clone(),
            state,
            used_times: 1,
        });
        self.by_key.insert(key, handle);
        handle
    }

    /// Drops one user of `handle`; the last release destroys the program.
    pub fn release<D: GpuDevice + ?Sized>(&mut self, device: &mut D, handle: ProgramHandle) {
        let Some(entry) = self.entries.get_mut(handle) else {
            return;
        };
        entry.used_times = entry.used_times.saturating_sub(1);
        if entry.used_times > 0 {
            return;
        }
        if let Some(entry) = self.entries.remove(handle) {
            self.by_key.remove(&entry.key);
            if let ProgramState::Compiled(program) = entry.state {
                device.destroy_program(program.id);
            }
            log::debug!("Evicted program {}", entry.label);
        }
    }

    /// Compiles the entry again under the same key, replacing its previous
    /// program. Used when a material changed without changing its key.
    pub fn recompile<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        handle: ProgramHandle,
        shader: Option<&ShaderMaterial>,
    ) {
        let Some(entry) = self.entries.get_mut(handle) else {
            return;
        };
        let state = compile(device, &entry.key, shader, &entry.label);
        self.misses += 1;
        if let ProgramState::Compiled(old) = std::mem::replace(&mut entry.state, state) {
            device.destroy_program(old.id);
        }
    }

    /// Forgets every entry without device calls; the programs died with
    /// the device.
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.by_key.clear();
    }

    #[must_use]
    pub fn get(&self, handle: ProgramHandle) -> Option<&ProgramState> {
        self.entries.get(handle).map(|e| &e.state)
    }

    /// The compiled program of `handle`, if it compiled.
    #[must_use]
    pub fn program(&self, handle: ProgramHandle) -> Option<&CompiledProgram> {
        match self.get(handle)? {
            ProgramState::Compiled(program) => Some(program),
            ProgramState::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn diagnostics(&self, handle: ProgramHandle) -> Option<&ProgramDiagnostics> {
        match self.get(handle)? {
            ProgramState::Failed(diagnostics) => Some(diagnostics),
            ProgramState::Compiled(_) => None,
        }
    }

    #[must_use]
    pub fn key(&self, handle: ProgramHandle) -> Option<&ProgramKey> {
        self.entries.get(handle).map(|e| &e.key)
    }

    #[must_use]
    pub fn used_times(&self, handle: ProgramHandle) -> u32 {
        self.entries.get(handle).map_or(0, |e| e.used_times)
    }

    #[must_use]
    pub fn find(&self, key: &ProgramKey) -> Option<ProgramHandle> {
        self.by_key.get(key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> ProgramCacheStats {
        let failed_programs = self
            .entries
            .values()
            .filter(|e| matches!(e.state, ProgramState::Failed(_)))
            .count();
        ProgramCacheStats {
            hits: self.hits,
            misses: self.misses,
            live_programs: self.entries.len() - failed_programs,
            failed_programs,
        }
    }
}

fn compile<D: GpuDevice + ?Sized>(
    device: &mut D,
    key: &ProgramKey,
    shader: Option<&ShaderMaterial>,
    label: &str,
) -> ProgramState {
    let generated = match shader_gen::generate(key, shader, label) {
        Ok(generated) => generated,
        Err(diagnostics) => return failed(diagnostics),
    };
    let source = ProgramSource {
        label: label.to_owned(),
        source: generated.source,
        layout: generated.layout,
    };
    match device.create_program(&source) {
        Ok(id) => {
            log::info!("Compiled program {label} ({} bytes of WGSL)", source.source.len());
            ProgramState::Compiled(CompiledProgram {
                id,
                layout: Arc::new(source.layout),
                bindings: Arc::new(generated.bindings),
                source_hash: generated.source_hash,
            })
        }
        Err(diagnostics) => failed(diagnostics),
    }
}

fn failed(diagnostics: ProgramDiagnostics) -> ProgramState {
    warn_once("program", &diagnostics.to_string());
    ProgramState::Failed(diagnostics)
}
