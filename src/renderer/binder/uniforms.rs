//! Uniform binder.
//!
//! Remembers the last value uploaded to every `(program, slot)` pair as flat
//! `f32` / `i32` data and uploads only on structural inequality. Array
//! uniforms are flattened into scratch buffers shared by all slots of the
//! same `(components, arity)` shape, so steady-state frames do not allocate.
//!
//! Texture uniforms take a unit from [`TextureUnits`], bind the texture on
//! that unit through the [`StateTracker`] and point the sampler slot at the
//! unit.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;

use crate::renderer::core::device::{GpuDevice, ProgramId, TextureId, UniformData};
use crate::renderer::state::StateTracker;
use crate::resources::uniforms::UniformValue;
use crate::utils::warn_once;

#[derive(Debug, Clone, PartialEq)]
enum Cached {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

/// Round-robin texture unit allocator.
///
/// Units are handed out from 0 again at every draw's program setup, not
/// once per frame, so one draw can use every unit the device has. Sampler
/// slots whose unit did not change skip their upload.
#[derive(Debug, Clone)]
pub struct TextureUnits {
    allocated: u32,
    max: u32,
}

impl TextureUnits {
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self {
            allocated: 0,
            max: max.max(1),
        }
    }

    pub fn reset(&mut self) {
        self.allocated = 0;
    }

    /// Returns the next unit. Wraps at the device limit with a warning.
    pub fn allocate(&mut self) -> u32 {
        if self.allocated == self.max {
            warn_once(
                "textures",
                &format!("texture units exhausted ({} available); wrapping", self.max),
            );
        }
        let unit = self.allocated % self.max;
        self.allocated += 1;
        unit
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }
}

#[derive(Debug)]
pub struct UniformBinder {
    cache: FxHashMap<(ProgramId, u32), Cached>,
    texture_slots: FxHashMap<(ProgramId, u32), u32>,
    scratch: FxHashMap<(usize, usize), Vec<f32>>,
    units: TextureUnits,
    uploads: u64,
}

impl UniformBinder {
    #[must_use]
    pub fn new(max_texture_units: u32) -> Self {
        Self {
            cache: FxHashMap::default(),
            texture_slots: FxHashMap::default(),
            scratch: FxHashMap::default(),
            units: TextureUnits::new(max_texture_units),
            uploads: 0,
        }
    }

    /// Forgets every cached value (device restoration).
    pub fn reset(&mut self, max_texture_units: u32) {
        self.cache.clear();
        self.texture_slots.clear();
        self.units = TextureUnits::new(max_texture_units);
    }

    /// Drops the cache of a destroyed program.
    pub fn forget_program(&mut self, program: ProgramId) {
        self.cache.retain(|(p, _), _| *p != program);
        self.texture_slots.retain(|(p, _), _| *p != program);
    }

    pub fn reset_texture_units(&mut self) {
        self.units.reset();
    }

    /// Number of uniform uploads issued.
    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    // ─── Scalar and vector setters ───────────────────────────────────────

    /// Uploads `values` unless the slot already holds exactly them.
    pub fn set_floats<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        program: ProgramId,
        slot: u32,
        values: &[f32],
    ) -> bool {
        match self.cache.get_mut(&(program, slot)) {
            Some(Cached::Float(cached)) if cached.as_slice() == values => return false,
            Some(Cached::Float(cached)) => {
                cached.clear();
                cached.extend_from_slice(values);
            }
            _ => {
                self.cache
                    .insert((program, slot), Cached::Float(values.to_vec()));
            }
        }
        device.set_uniform(program, slot, UniformData::Float(values));
        self.uploads += 1;
        true
    }

    pub fn set_ints<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        program: ProgramId,
        slot: u32,
        values: &[i32],
    ) -> bool {
        match self.cache.get_mut(&(program, slot)) {
            Some(Cached::Int(cached)) if cached.as_slice() == values => return false,
            Some(Cached::Int(cached)) => {
                cached.clear();
                cached.extend_from_slice(values);
            }
            _ => {
                self.cache.insert((program, slot), Cached::Int(values.to_vec()));
            }
        }
        device.set_uniform(program, slot, UniformData::Int(values));
        self.uploads += 1;
        true
    }

    pub fn set_float<D: GpuDevice + ?Sized>(&mut self, device: &mut D, program: ProgramId, slot: u32, v: f32) {
        self.set_floats(device, program, slot, &[v]);
    }

    pub fn set_int<D: GpuDevice + ?Sized>(&mut self, device: &mut D, program: ProgramId, slot: u32, v: i32) {
        self.set_ints(device, program, slot, &[v]);
    }

    pub fn set_vec2<D: GpuDevice + ?Sized>(&mut self, device: &mut D, program: ProgramId, slot: u32, v: Vec2) {
        self.set_floats(device, program, slot, &v.to_array());
    }

    pub fn set_vec3<D: GpuDevice + ?Sized>(&mut self, device: &mut D, program: ProgramId, slot: u32, v: Vec3) {
        self.set_floats(device, program, slot, &v.to_array());
    }

    pub fn set_vec4<D: GpuDevice + ?Sized>(&mut self, device: &mut D, program: ProgramId, slot: u32, v: Vec4) {
        self.set_floats(device, program, slot, &v.to_array());
    }

    pub fn set_mat3<D: GpuDevice + ?Sized>(&mut self, device: &mut D, program: ProgramId, slot: u32, m: &Mat3) {
        self.set_floats(device, program, slot, &m.to_cols_array());
    }

    pub fn set_mat4<D: GpuDevice + ?Sized>(&mut self, device: &mut D, program: ProgramId, slot: u32, m: &Mat4) {
        self.set_floats(device, program, slot, &m.to_cols_array());
    }

    // ─── Arrays ──────────────────────────────────────────────────────────

    /// Flattens `arity` elements of `components` floats each into the shared
    /// scratch buffer and uploads it when it differs.
    pub fn set_array<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        program: ProgramId,
        slot: u32,
        components: usize,
        arity: usize,
        fill: impl FnOnce(&mut Vec<f32>),
    ) -> bool {
        let mut scratch = self.scratch.remove(&(components, arity)).unwrap_or_default();
        scratch.clear();
        fill(&mut scratch);
        scratch.resize(components * arity, 0.0);
        let changed = self.set_floats(device, program, slot, &scratch);
        self.scratch.insert((components, arity), scratch);
        changed
    }

    pub fn set_vec4_array<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        program: ProgramId,
        slot: u32,
        values: &[Vec4],
        arity: usize,
    ) {
        self.set_array(device, program, slot, 4, arity, |out| {
            for v in values.iter().take(arity) {
                out.extend_from_slice(&v.to_array());
            }
        });
    }

    pub fn set_mat4_array<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        program: ProgramId,
        slot: u32,
        values: &[Mat4],
        arity: usize,
    ) {
        self.set_array(device, program, slot, 16, arity, |out| {
            for m in values.iter().take(arity) {
                out.extend_from_slice(&m.to_cols_array());
            }
        });
    }

    /// Uploads a custom shader uniform. Texture values are bound through
    /// [`Self::set_texture`] instead and ignored here.
    pub fn set_value<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        program: ProgramId,
        slot: u32,
        value: &UniformValue,
    ) {
        match value {
            UniformValue::Float(v) => self.set_float(device, program, slot, *v),
            UniformValue::Int(v) => self.set_int(device, program, slot, *v),
            UniformValue::Vec2(v) => self.set_vec2(device, program, slot, *v),
            UniformValue::Vec3(v) => self.set_vec3(device, program, slot, *v),
            UniformValue::Vec4(v) => self.set_vec4(device, program, slot, *v),
            UniformValue::Mat3(m) => self.set_mat3(device, program, slot, m),
            UniformValue::Mat4(m) => self.set_mat4(device, program, slot, m),
            UniformValue::Vec4Array(values) => {
                self.set_vec4_array(device, program, slot, values, values.len());
            }
            UniformValue::Mat4Array(values) => {
                self.set_mat4_array(device, program, slot, values, values.len());
            }
            UniformValue::Texture(_) => {}
        }
    }

    // ─── Textures ────────────────────────────────────────────────────────

    /// Binds `texture` on a freshly allocated unit and points texture slot
    /// `slot` at it. Returns the unit.
    pub fn set_texture<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateTracker,
        program: ProgramId,
        slot: u32,
        texture: Option<TextureId>,
    ) -> u32 {
        let unit = self.units.allocate();
        state.bind_texture(device, unit, texture);
        if self.texture_slots.insert((program, slot), unit) != Some(unit) {
            device.set_texture_slot(program, slot, unit);
            self.uploads += 1;
        }
        unit
    }
}
