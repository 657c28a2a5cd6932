//! Device State Tracker
//!
//! Mirrors the mutable pipeline state last issued to the device and forwards
//! a setter to the device only when the requested value differs. Every
//! mirrored field is an `Option`: `None` means "unknown" and forces the next
//! call through, which is the state after construction, after
//! [`StateTracker::reset`] and after device restoration.
//!
//! The depth, stencil and scissor groups carry lock flags. While a group is
//! locked its setters are no-ops, which lets a pass pin (for example) depth
//! writes off while materials are applied on top.
//!
//! Reversed depth is handled here: compare functions are mirrored around
//! `Equal` and the depth clear value becomes 0.

use smallvec::SmallVec;
use wgpu::{BlendState, ColorWrites, CompareFunction, Face, FrontFace};

use crate::renderer::core::device::{
    FramebufferId, GpuDevice, ProgramId, ScissorRect, StencilFunc, StencilOps, TextureId, Viewport,
};
use crate::resources::material::{
    Blending, MaterialSettings, PolygonOffset, Side, StencilSettings, resolve_blend_state,
};

/// Stores `value` into `slot` and reports whether it changed.
#[inline]
fn replace<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        false
    } else {
        *slot = Some(value);
        true
    }
}

#[derive(Debug, Default)]
struct DepthState {
    test: Option<bool>,
    write: Option<bool>,
    compare: Option<CompareFunction>,
    locked: bool,
}

#[derive(Debug, Default)]
struct StencilState {
    test: Option<bool>,
    write_mask: Option<u32>,
    func: Option<StencilFunc>,
    ops: Option<StencilOps>,
    locked: bool,
}

#[derive(Debug, Default)]
struct ScissorState {
    test: Option<bool>,
    rect: Option<ScissorRect>,
    locked: bool,
}

#[derive(Debug, Default)]
pub struct StateTracker {
    program: Option<ProgramId>,
    framebuffer: Option<Option<FramebufferId>>,
    viewport: Option<Viewport>,
    blend: Option<Option<BlendState>>,
    blend_constant: Option<[f32; 4]>,
    depth: DepthState,
    stencil: StencilState,
    scissor: ScissorState,
    cull_mode: Option<Option<Face>>,
    front_face: Option<FrontFace>,
    color_write: Option<ColorWrites>,
    polygon_offset: Option<Option<PolygonOffset>>,
    alpha_to_coverage: Option<bool>,
    textures: SmallVec<[Option<Option<TextureId>>; 16]>,
    reversed_depth: bool,
    issued: u64,
}

impl StateTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every mirrored value and releases all locks.
    pub fn reset(&mut self) {
        let reversed_depth = self.reversed_depth;
        let issued = self.issued;
        *self = Self {
            reversed_depth,
            issued,
            ..Self::default()
        };
    }

    /// Total number of device calls issued through this tracker.
    #[inline]
    #[must_use]
    pub fn issued_calls(&self) -> u64 {
        self.issued
    }

    // ─── Reversed depth ──────────────────────────────────────────────────

    /// Switches reversed-depth remapping. Invalidates the depth compare
    /// mirror so the next compare is re-issued in the new convention.
    pub fn set_reversed_depth(&mut self, reversed: bool) {
        if self.reversed_depth != reversed {
            self.reversed_depth = reversed;
            self.depth.compare = None;
        }
    }

    #[inline]
    #[must_use]
    pub fn reversed_depth(&self) -> bool {
        self.reversed_depth
    }

    /// Depth value meaning "farthest" in the active convention.
    #[must_use]
    pub fn depth_clear_value(&self) -> f32 {
        if self.reversed_depth { 0.0 } else { 1.0 }
    }

    // ─── Bindings ────────────────────────────────────────────────────────

    /// Returns `true` when the program changed.
    pub fn use_program<D: GpuDevice + ?Sized>(&mut self, device: &mut D, program: ProgramId) -> bool {
        if replace(&mut self.program, program) {
            device.use_program(program);
            self.issued += 1;
            return true;
        }
        false
    }

    #[must_use]
    pub fn current_program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn bind_framebuffer<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        framebuffer: Option<FramebufferId>,
    ) -> bool {
        if replace(&mut self.framebuffer, framebuffer) {
            device.bind_framebuffer(framebuffer);
            self.issued += 1;
            return true;
        }
        false
    }

    pub fn bind_texture<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        unit: u32,
        texture: Option<TextureId>,
    ) {
        let index = unit as usize;
        if self.textures.len() <= index {
            self.textures.resize(index + 1, None);
        }
        if replace(&mut self.textures[index], texture) {
            device.bind_texture(unit, texture);
            self.issued += 1;
        }
    }

    /// Drops the mirror of any unit holding `texture` (after it is deleted).
    pub fn forget_texture(&mut self, texture: TextureId) {
        for slot in &mut self.textures {
            if *slot == Some(Some(texture)) {
                *slot = None;
            }
        }
    }

    pub fn set_viewport<D: GpuDevice + ?Sized>(&mut self, device: &mut D, viewport: Viewport) {
        if replace(&mut self.viewport, viewport) {
            device.set_viewport(viewport);
            self.issued += 1;
        }
    }

    // ─── Blending ────────────────────────────────────────────────────────

    /// Applies a blending mode, resolved to a single device blend state.
    pub fn set_blending<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        blending: Blending,
        premultiplied_alpha: bool,
    ) {
        let state = resolve_blend_state(blending, premultiplied_alpha);
        if replace(&mut self.blend, state) {
            device.set_blend(state);
            self.issued += 1;
        }
    }

    pub fn set_blend_constant<D: GpuDevice + ?Sized>(&mut self, device: &mut D, color: [f32; 4]) {
        if replace(&mut self.blend_constant, color) {
            device.set_blend_constant(color);
            self.issued += 1;
        }
    }

    // ─── Depth ───────────────────────────────────────────────────────────

    pub fn lock_depth(&mut self, locked: bool) {
        self.depth.locked = locked;
    }

    pub fn set_depth_test<D: GpuDevice + ?Sized>(&mut self, device: &mut D, enabled: bool) {
        if !self.depth.locked && replace(&mut self.depth.test, enabled) {
            device.set_depth_test(enabled);
            self.issued += 1;
        }
    }

    pub fn set_depth_write<D: GpuDevice + ?Sized>(&mut self, device: &mut D, enabled: bool) {
        if !self.depth.locked && replace(&mut self.depth.write, enabled) {
            device.set_depth_write(enabled);
            self.issued += 1;
        }
    }

    /// `compare` is expressed in the forward-depth convention.
    pub fn set_depth_compare<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        compare: CompareFunction,
    ) {
        let compare = if self.reversed_depth {
            reverse_compare(compare)
        } else {
            compare
        };
        if !self.depth.locked && replace(&mut self.depth.compare, compare) {
            device.set_depth_compare(compare);
            self.issued += 1;
        }
    }

    // ─── Stencil ─────────────────────────────────────────────────────────

    pub fn lock_stencil(&mut self, locked: bool) {
        self.stencil.locked = locked;
    }

    pub fn set_stencil_test<D: GpuDevice + ?Sized>(&mut self, device: &mut D, enabled: bool) {
        if !self.stencil.locked && replace(&mut self.stencil.test, enabled) {
            device.set_stencil_test(enabled);
            self.issued += 1;
        }
    }

    pub fn set_stencil_write_mask<D: GpuDevice + ?Sized>(&mut self, device: &mut D, mask: u32) {
        if !self.stencil.locked && replace(&mut self.stencil.write_mask, mask) {
            device.set_stencil_write_mask(mask);
            self.issued += 1;
        }
    }

    pub fn set_stencil_func<D: GpuDevice + ?Sized>(&mut self, device: &mut D, func: StencilFunc) {
        if !self.stencil.locked && replace(&mut self.stencil.func, func) {
            device.set_stencil_func(func);
            self.issued += 1;
        }
    }

    pub fn set_stencil_op<D: GpuDevice + ?Sized>(&mut self, device: &mut D, ops: StencilOps) {
        if !self.stencil.locked && replace(&mut self.stencil.ops, ops) {
            device.set_stencil_op(ops);
            self.issued += 1;
        }
    }

    // ─── Scissor ─────────────────────────────────────────────────────────

    pub fn lock_scissor(&mut self, locked: bool) {
        self.scissor.locked = locked;
    }

    pub fn set_scissor_test<D: GpuDevice + ?Sized>(&mut self, device: &mut D, enabled: bool) {
        if !self.scissor.locked && replace(&mut self.scissor.test, enabled) {
            device.set_scissor_test(enabled);
            self.issued += 1;
        }
    }

    pub fn set_scissor<D: GpuDevice + ?Sized>(&mut self, device: &mut D, rect: ScissorRect) {
        if !self.scissor.locked && replace(&mut self.scissor.rect, rect) {
            device.set_scissor(rect);
            self.issued += 1;
        }
    }

    // ─── Rasterizer ──────────────────────────────────────────────────────

    pub fn set_cull_mode<D: GpuDevice + ?Sized>(&mut self, device: &mut D, face: Option<Face>) {
        if replace(&mut self.cull_mode, face) {
            device.set_cull_mode(face);
            self.issued += 1;
        }
    }

    pub fn set_front_face<D: GpuDevice + ?Sized>(&mut self, device: &mut D, front_face: FrontFace) {
        if replace(&mut self.front_face, front_face) {
            device.set_front_face(front_face);
            self.issued += 1;
        }
    }

    pub fn set_color_write<D: GpuDevice + ?Sized>(&mut self, device: &mut D, mask: ColorWrites) {
        if replace(&mut self.color_write, mask) {
            device.set_color_write_mask(mask);
            self.issued += 1;
        }
    }

    pub fn set_polygon_offset<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        offset: Option<PolygonOffset>,
    ) {
        if replace(&mut self.polygon_offset, offset) {
            device.set_polygon_offset(offset);
            self.issued += 1;
        }
    }

    pub fn set_alpha_to_coverage<D: GpuDevice + ?Sized>(&mut self, device: &mut D, enabled: bool) {
        if replace(&mut self.alpha_to_coverage, enabled) {
            device.set_alpha_to_coverage(enabled);
            self.issued += 1;
        }
    }

    // ─── Material ────────────────────────────────────────────────────────

    /// Applies a material's complete fixed-function state.
    ///
    /// `flip_sided` is set for drawables with a negative-determinant world
    /// matrix. `side_override` replaces the material side (two-pass
    /// transparent rendering and shadow passes).
    pub fn set_material<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        settings: &MaterialSettings,
        flip_sided: bool,
        side_override: Option<Side>,
    ) {
        let side = side_override.unwrap_or(settings.side);
        self.set_cull_mode(device, (side != Side::Double).then_some(Face::Back));
        let clockwise = (side == Side::Back) ^ flip_sided;
        self.set_front_face(device, if clockwise { FrontFace::Cw } else { FrontFace::Ccw });

        let blending = if settings.blending == Blending::Normal && !settings.transparent {
            Blending::None
        } else {
            settings.blending
        };
        self.set_blending(device, blending, settings.premultiplied_alpha);
        if let Some(constant) = settings.blend_constant {
            self.set_blend_constant(device, constant);
        }

        self.set_depth_test(device, settings.depth_test);
        self.set_depth_write(device, settings.depth_write);
        self.set_depth_compare(device, settings.depth_func);

        self.set_color_write(
            device,
            if settings.color_write {
                ColorWrites::ALL
            } else {
                ColorWrites::empty()
            },
        );

        self.apply_stencil(device, &settings.stencil);
        self.set_polygon_offset(device, settings.polygon_offset);
        self.set_alpha_to_coverage(device, settings.alpha_to_coverage);
    }

    fn apply_stencil<D: GpuDevice + ?Sized>(&mut self, device: &mut D, stencil: &StencilSettings) {
        self.set_stencil_test(device, stencil.enabled);
        if stencil.enabled {
            self.set_stencil_write_mask(device, stencil.write_mask);
            self.set_stencil_func(
                device,
                StencilFunc {
                    compare: stencil.func,
                    reference: stencil.reference,
                    mask: stencil.func_mask,
                },
            );
            self.set_stencil_op(
                device,
                StencilOps {
                    fail: stencil.fail,
                    depth_fail: stencil.depth_fail,
                    pass: stencil.pass,
                },
            );
        }
    }
}

/// Mirrors a compare function for a depth range running 1 (near) to 0 (far).
#[must_use]
pub fn reverse_compare(compare: CompareFunction) -> CompareFunction {
    match compare {
        CompareFunction::Less => CompareFunction::Greater,
        CompareFunction::LessEqual => CompareFunction::GreaterEqual,
        CompareFunction::Greater => CompareFunction::Less,
        CompareFunction::GreaterEqual => CompareFunction::LessEqual,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::headless::{DeviceCall, HeadlessDevice};

    fn blend_calls(device: &HeadlessDevice) -> usize {
        device.count_calls(|c| matches!(c, DeviceCall::SetBlend(_)))
    }

    #[test]
    fn identical_blending_issues_one_call() {
        let mut device = HeadlessDevice::new(1, 1);
        let mut state = StateTracker::new();
        for _ in 0..10 {
            state.set_blending(&mut device, Blending::Normal, false);
        }
        assert_eq!(blend_calls(&device), 1);
        assert_eq!(state.issued_calls(), 1);
    }

    #[test]
    fn alternating_blending_issues_one_call_each() {
        let mut device = HeadlessDevice::new(1, 1);
        let mut state = StateTracker::new();
        for i in 0..6 {
            let mode = if i % 2 == 0 {
                Blending::Normal
            } else {
                Blending::Additive
            };
            state.set_blending(&mut device, mode, false);
        }
        assert_eq!(blend_calls(&device), 6);
    }

    #[test]
    fn reset_forces_next_call() {
        let mut device = HeadlessDevice::new(1, 1);
        let mut state = StateTracker::new();
        state.set_depth_test(&mut device, true);
        state.set_depth_test(&mut device, true);
        state.reset();
        state.set_depth_test(&mut device, true);
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::SetDepthTest(true))), 2);
    }

    #[test]
    fn locked_depth_ignores_setters() {
        let mut device = HeadlessDevice::new(1, 1);
        let mut state = StateTracker::new();
        state.set_depth_write(&mut device, false);
        state.lock_depth(true);
        state.set_depth_write(&mut device, true);
        state.lock_depth(false);
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::SetDepthWrite(_))), 1);
    }

    #[test]
    fn reversed_depth_mirrors_compare_and_clear() {
        let mut device = HeadlessDevice::new(1, 1);
        let mut state = StateTracker::new();
        state.set_reversed_depth(true);
        state.set_depth_compare(&mut device, CompareFunction::LessEqual);
        assert_eq!(
            device.calls().last(),
            Some(&DeviceCall::SetDepthCompare(CompareFunction::GreaterEqual))
        );
        assert!(state.depth_clear_value().abs() < f32::EPSILON);
    }

    #[test]
    fn opaque_normal_blending_disables_blend() {
        let mut device = HeadlessDevice::new(1, 1);
        let mut state = StateTracker::new();
        state.set_material(&mut device, &MaterialSettings::default(), false, None);
        assert!(device.calls().contains(&DeviceCall::SetBlend(None)));
        assert!(device.calls().contains(&DeviceCall::SetCullMode(Some(Face::Back))));

        let before = device.calls().len();
        state.set_material(&mut device, &MaterialSettings::default(), false, None);
        assert_eq!(device.calls().len(), before);
    }

    #[test]
    fn texture_units_diff_by_handle() {
        let mut device = HeadlessDevice::new(1, 1);
        let mut state = StateTracker::new();
        state.bind_texture(&mut device, 3, Some(TextureId(7)));
        state.bind_texture(&mut device, 3, Some(TextureId(7)));
        state.forget_texture(TextureId(7));
        state.bind_texture(&mut device, 3, Some(TextureId(7)));
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::BindTexture { .. })), 2);
    }
}
