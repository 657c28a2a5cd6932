//! Per-draw uniform upload.
//!
//! [`UniformWriter`] routes values to the slots a program declared through
//! its [`ProgramBindings`]; builtins the program left out are skipped, so
//! callers write every value unconditionally.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use super::binder::UniformBinder;
use super::core::device::{GpuDevice, ProgramId};
use super::lights::LightsState;
use super::pipeline::{Builtin, CustomBinding, ProgramBindings};
use crate::resources::material::{Material, MaterialKind, StandardParams};
use crate::scene::fog::Fog;

pub struct UniformWriter<'a, D: GpuDevice + ?Sized> {
    pub binder: &'a mut UniformBinder,
    pub device: &'a mut D,
    pub program: ProgramId,
    pub bindings: &'a ProgramBindings,
}

impl<D: GpuDevice + ?Sized> UniformWriter<'_, D> {
    pub fn float(&mut self, builtin: Builtin, v: f32) {
        if let Some(slot) = self.bindings.uniform(builtin) {
            self.binder.set_float(self.device, self.program, slot, v);
        }
    }

    pub fn vec2(&mut self, builtin: Builtin, v: Vec2) {
        if let Some(slot) = self.bindings.uniform(builtin) {
            self.binder.set_vec2(self.device, self.program, slot, v);
        }
    }

    pub fn vec3(&mut self, builtin: Builtin, v: Vec3) {
        if let Some(slot) = self.bindings.uniform(builtin) {
            self.binder.set_vec3(self.device, self.program, slot, v);
        }
    }

    pub fn mat3(&mut self, builtin: Builtin, m: &Mat3) {
        if let Some(slot) = self.bindings.uniform(builtin) {
            self.binder.set_mat3(self.device, self.program, slot, m);
        }
    }

    pub fn mat4(&mut self, builtin: Builtin, m: &Mat4) {
        if let Some(slot) = self.bindings.uniform(builtin) {
            self.binder.set_mat4(self.device, self.program, slot, m);
        }
    }

    /// `arity` must match the declared array length.
    pub fn vec4_array(&mut self, builtin: Builtin, values: &[Vec4], arity: usize) {
        if let Some(slot) = self.bindings.uniform(builtin) {
            self.binder
                .set_vec4_array(self.device, self.program, slot, values, arity);
        }
    }

    pub fn mat4_array(&mut self, builtin: Builtin, values: &[Mat4], arity: usize) {
        if let Some(slot) = self.bindings.uniform(builtin) {
            self.binder
                .set_mat4_array(self.device, self.program, slot, values, arity);
        }
    }

    /// Packs scalar weights four to a texel.
    pub fn packed_scalars(&mut self, builtin: Builtin, values: &[f32], count: usize) {
        if let Some(slot) = self.bindings.uniform(builtin) {
            self.binder.set_array(
                self.device,
                self.program,
                slot,
                4,
                count.div_ceil(4),
                |out| out.extend(values.iter().take(count)),
            );
        }
    }

    // ─── Groups ──────────────────────────────────────────────────────────

    pub fn lights(&mut self, lights: &LightsState) {
        self.vec3(Builtin::AmbientLightColor, lights.ambient);
        self.vec4_array(Builtin::DirectionalLights, &lights.directional, lights.directional.len());
        self.vec4_array(Builtin::PointLights, &lights.point, lights.point.len());
        self.vec4_array(Builtin::SpotLights, &lights.spot, lights.spot.len());
        self.vec4_array(Builtin::HemisphereLights, &lights.hemisphere, lights.hemisphere.len());
    }

    pub fn fog(&mut self, fog: &Fog) {
        self.vec3(Builtin::FogColor, fog.color());
        match *fog {
            Fog::Linear { near, far, .. } => {
                self.float(Builtin::FogNear, near);
                self.float(Builtin::FogFar, far);
                self.float(Builtin::FogDensity, 0.0);
            }
            Fog::Exp2 { density, .. } => {
                self.float(Builtin::FogNear, 0.0);
                self.float(Builtin::FogFar, 0.0);
                self.float(Builtin::FogDensity, density);
            }
        }
    }

    /// Material parameters. Texture-valued custom uniforms are bound by the
    /// caller.
    pub fn material(&mut self, material: &Material) {
        use Builtin as B;

        let settings = material.settings();
        self.vec3(B::Diffuse, material.kind().color().unwrap_or(Vec3::ONE));
        self.float(B::Opacity, settings.opacity);
        self.float(B::AlphaTest, settings.alpha_test);

        match material.kind() {
            MaterialKind::Basic(p) => self.float(B::Reflectivity, p.reflectivity),
            MaterialKind::Lambert(p) => self.vec3(B::Emissive, p.emissive * p.emissive_intensity),
            MaterialKind::Toon(p) => self.vec3(B::Emissive, p.emissive * p.emissive_intensity),
            MaterialKind::Phong(p) => {
                self.vec3(B::Emissive, p.emissive * p.emissive_intensity);
                self.vec3(B::Specular, p.specular);
                self.float(B::Shininess, p.shininess.max(1e-4));
            }
            MaterialKind::Standard(p) => self.standard(p),
            MaterialKind::Physical(p) => {
                self.standard(&p.standard);
                self.float(B::Ior, p.ior);
                self.vec3(B::SpecularColor, p.specular_color);
                self.float(B::SpecularIntensity, p.specular_intensity);
                self.float(B::Clearcoat, p.clearcoat);
                self.float(B::ClearcoatRoughness, p.clearcoat_roughness);
                self.vec3(B::SheenColor, p.sheen_color * p.sheen);
                self.float(B::SheenRoughness, p.sheen_roughness);
                self.float(B::Iridescence, p.iridescence);
                self.float(B::IridescenceIor, p.iridescence_ior);
                self.vec3(B::AttenuationColor, p.attenuation_color);
                self.float(B::AttenuationDistance, p.attenuation_distance);
                self.float(B::Transmission, p.transmission);
                self.float(B::Thickness, p.thickness);
                let (sin, cos) = p.anisotropy_rotation.sin_cos();
                self.vec2(B::AnisotropyVector, Vec2::new(cos, sin) * p.anisotropy);
            }
            MaterialKind::Distance(p) => {
                self.vec3(B::ReferencePosition, p.reference_position);
                self.float(B::NearDistance, p.near);
                self.float(B::FarDistance, p.far);
            }
            MaterialKind::Sprite(p) => self.float(B::Rotation, p.rotation),
            MaterialKind::LineDashed(p) => {
                self.float(B::DashSize, p.dash_size);
                self.float(B::TotalSize, p.dash_size + p.gap_size);
                self.float(B::LineScale, p.scale);
            }
            MaterialKind::Shader(shader) => {
                for ((_, value), binding) in shader.uniforms().iter().zip(&self.bindings.custom) {
                    if let CustomBinding::Uniform(slot) = *binding {
                        self.binder.set_value(self.device, self.program, slot, value);
                    }
                }
            }
            MaterialKind::Matcap { .. }
            | MaterialKind::Normal
            | MaterialKind::Depth { .. }
            | MaterialKind::Shadow { .. }
            | MaterialKind::Points(_)
            | MaterialKind::LineBasic { .. } => {}
        }
    }

    fn standard(&mut self, p: &StandardParams) {
        self.vec3(Builtin::Emissive, p.emissive * p.emissive_intensity);
        self.float(Builtin::Roughness, p.roughness);
        self.float(Builtin::Metalness, p.metalness);
        self.float(Builtin::EnvMapIntensity, p.env_map_intensity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::capabilities::Capabilities;
    use crate::renderer::core::headless::{HeadlessDevice, UniformRecord};
    use crate::renderer::lights::LightsHash;
    use crate::renderer::pipeline::features::{Clipping, DrawContext, derive_parameters};
    use crate::renderer::pipeline::shader_gen::build_interface;
    use crate::renderer::settings::RendererSettings;
    use crate::resources::geometry::Geometry;
    use crate::scene::drawable::DrawMode;

    #[test]
    fn undeclared_builtins_are_skipped() {
        let geometry = Geometry::new_box(1.0, 1.0, 1.0);
        let caps = Capabilities::default();
        let draw = DrawContext {
            geometry: &geometry,
            mode: DrawMode::Triangles,
            bones: 0,
            morph_targets: 0,
            instancing: false,
            instance_colors: false,
            receive_shadow: false,
            fog: None,
            environment: false,
            to_screen: true,
            rendering_shadows: false,
            reversed_depth: false,
            clipping: Clipping::default(),
            max_vertex_attributes: caps.max_vertex_attributes,
            max_vertex_buffers: caps.max_vertex_buffers,
        };
        let params = derive_parameters(
            &Material::basic(),
            &LightsHash::default(),
            &draw,
            &RendererSettings::default(),
        );
        let (layout, bindings) = build_interface(&params.key(), None);

        let mut device = HeadlessDevice::new(1, 1);
        let mut binder = UniformBinder::new(16);
        let mut writer = UniformWriter {
            binder: &mut binder,
            device: &mut device,
            program: ProgramId(3),
            bindings: &bindings,
        };
        writer.float(Builtin::Shininess, 12.0);
        writer.vec3(Builtin::Diffuse, Vec3::X);
        assert_eq!(binder.uploads(), 1);

        let slot = layout
            .uniform_slot("diffuse")
            .expect("basic programs declare diffuse");
        match device.uniform(ProgramId(3), slot) {
            Some(UniformRecord::Float(v)) => assert_eq!(v.as_slice(), &[1.0, 0.0, 0.0]),
            other => panic!("unexpected record {other:?}"),
        }
    }
}
