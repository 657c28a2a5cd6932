//! Program source generation.
//!
//! A [`ProgramKey`] fully determines the generated program: the key is
//! expanded into a [`ProgramLayout`] (every uniform, texture and vertex
//! input the program declares) plus the [`ProgramBindings`] the draw loop
//! uses to feed it, then the family's WGSL template is rendered with both.
//!
//! Templates live under `shaders/` and are rendered by a shared
//! [`minijinja`] environment with `{$ $}` blocks, `{{ }}` expressions and
//! `$$` line statements. Includes resolve against `shaders/chunks/`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior};
use naga::valid::{Capabilities as NagaCapabilities, ValidationError, ValidationFlags, Validator};
use rust_embed::RustEmbed;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64;

use super::features::{ProgramFeatures, ProgramKey, LINE_DISTANCE};
use super::layout::{ProgramLayout, TextureKind, UniformKind};
use crate::errors::{ProgramDiagnostics, ShaderStage};
use crate::renderer::lights::{LightsState, ShadowLightKind};
use crate::renderer::settings::ShadowMapKind;
use crate::resources::buffer::StepMode;
use crate::resources::geometry::Geometry;
use crate::resources::material::{MapSlot, MaterialFamily, ShaderMaterial};
use crate::resources::uniforms::UniformValue;

static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/renderer/pipeline/shaders"]
struct ShaderAssets;

fn get_env() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();
        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build();
        match syntax {
            Ok(syntax) => env.set_syntax(syntax),
            Err(err) => log::error!("Shader template syntax rejected: {err}"),
        }
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);
        env.set_loader(shader_loader);
        env.set_path_join_callback(|name, _parent| {
            if name.starts_with("chunks/") {
                Cow::Owned(name.to_owned())
            } else {
                Cow::Owned(format!("chunks/{name}"))
            }
        });
        env
    })
}

/// `{$ include "common" $}` arrives here as `chunks/common`.
fn shader_loader(name: &str) -> Result<Option<String>, Error> {
    let filename = if name.ends_with(".wgsl") {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    // Debug builds read the working tree so template edits apply without a rebuild.
    #[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
    {
        let path = std::path::Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/src/renderer/pipeline/shaders"))
            .join(filename.as_ref());
        if path.exists() {
            return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("failed to read {}: {e}", path.display()),
                )
            });
        }
    }

    if let Some(file) = ShaderAssets::get(filename.as_ref()) {
        if let Ok(source) = std::str::from_utf8(file.data.as_ref()) {
            return Ok(Some(source.to_owned()));
        }
    }
    Ok(None)
}

// ============================================================================
// Interface
// ============================================================================

macro_rules! builtin_uniforms {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Renderer-provided uniforms a generated program may declare.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $($variant),*
        }

        impl Builtin {
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant),*];
            pub const COUNT: usize = Self::ALL.len();

            /// Member name inside the program's uniform block.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name),*
                }
            }
        }
    };
}

builtin_uniforms! {
    ModelMatrix => "model_matrix",
    NormalMatrix => "normal_matrix",
    ViewMatrix => "view_matrix",
    ProjectionMatrix => "projection_matrix",
    CameraPosition => "camera_position",
    ToneMappingExposure => "tone_mapping_exposure",
    Diffuse => "diffuse",
    Opacity => "opacity",
    AlphaTest => "alpha_test",
    Emissive => "emissive",
    Roughness => "roughness",
    Metalness => "metalness",
    EnvMapIntensity => "env_map_intensity",
    Reflectivity => "reflectivity",
    Specular => "specular",
    Shininess => "shininess",
    Ior => "ior",
    SpecularColor => "specular_color",
    SpecularIntensity => "specular_intensity",
    Clearcoat => "clearcoat",
    ClearcoatRoughness => "clearcoat_roughness",
    SheenColor => "sheen_color",
    SheenRoughness => "sheen_roughness",
    Iridescence => "iridescence",
    IridescenceIor => "iridescence_ior",
    AttenuationColor => "attenuation_color",
    AttenuationDistance => "attenuation_distance",
    Transmission => "transmission",
    Thickness => "thickness",
    TransmissionSamplerSize => "transmission_sampler_size",
    AnisotropyVector => "anisotropy_vector",
    ReferencePosition => "reference_position",
    NearDistance => "near_distance",
    FarDistance => "far_distance",
    Rotation => "rotation",
    DashSize => "dash_size",
    TotalSize => "total_size",
    LineScale => "line_scale",
    FogColor => "fog_color",
    FogNear => "fog_near",
    FogFar => "fog_far",
    FogDensity => "fog_density",
    AmbientLightColor => "ambient_light_color",
    DirectionalLights => "directional_lights",
    PointLights => "point_lights",
    SpotLights => "spot_lights",
    HemisphereLights => "hemisphere_lights",
    DirectionalShadowMatrices => "directional_shadow_matrices",
    DirectionalShadowParams => "directional_shadow_params",
    SpotShadowMatrices => "spot_shadow_matrices",
    SpotShadowParams => "spot_shadow_params",
    PointShadowParams => "point_shadow_params",
    MorphBaseInfluence => "morph_base_influence",
    MorphInfluences => "morph_influences",
    BoneMatrices => "bone_matrices",
    ClippingPlanes => "clipping_planes",
}

/// Where the draw loop takes the data of one vertex input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSource {
    /// A geometry attribute by name.
    Attribute(&'static str),
    /// Morph target `target` of a geometry attribute.
    Morph { attribute: &'static str, target: u8 },
    /// Column of the per-instance transform.
    InstanceMatrix(u8),
    InstanceColor,
}

/// Slot of one custom shader uniform, parallel to
/// [`ShaderMaterial::uniforms`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomBinding {
    Uniform(u32),
    Texture(u32),
    /// Zero-length arrays declare nothing.
    Skipped,
}

/// Host-side routing table of a generated program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramBindings {
    uniforms: [Option<u32>; Builtin::COUNT],
    maps: [Option<u32>; MapSlot::COUNT],
    directional_shadow_maps: SmallVec<[u32; 4]>,
    spot_shadow_maps: SmallVec<[u32; 4]>,
    point_shadow_maps: SmallVec<[u32; 4]>,
    pub transmission: Option<u32>,
    pub custom: Vec<CustomBinding>,
    /// One entry per vertex input location.
    pub vertex: Vec<VertexSource>,
}

impl Default for ProgramBindings {
    fn default() -> Self {
        Self {
            uniforms: [None; Builtin::COUNT],
            maps: [None; MapSlot::COUNT],
            directional_shadow_maps: SmallVec::new(),
            spot_shadow_maps: SmallVec::new(),
            point_shadow_maps: SmallVec::new(),
            transmission: None,
            custom: Vec::new(),
            vertex: Vec::new(),
        }
    }
}

impl ProgramBindings {
    #[inline]
    #[must_use]
    pub fn uniform(&self, builtin: Builtin) -> Option<u32> {
        self.uniforms[builtin as usize]
    }

    #[inline]
    #[must_use]
    pub fn map(&self, slot: MapSlot) -> Option<u32> {
        self.maps[slot as usize]
    }

    /// Texture slots of the shadow maps of one light type, in caster order.
    #[must_use]
    pub fn shadow_maps(&self, kind: ShadowLightKind) -> &[u32] {
        match kind {
            ShadowLightKind::Directional => &self.directional_shadow_maps,
            ShadowLightKind::Spot => &self.spot_shadow_maps,
            ShadowLightKind::Point => &self.point_shadow_maps,
        }
    }
}

struct InterfaceBuilder {
    layout: ProgramLayout,
    bindings: ProgramBindings,
}

impl InterfaceBuilder {
    fn uniform(&mut self, builtin: Builtin, kind: UniformKind) {
        let slot = self.layout.push_uniform(builtin.name(), kind);
        self.bindings.uniforms[builtin as usize] = Some(slot);
    }

    fn uniform_array(&mut self, builtin: Builtin, count: usize, element: fn(u32) -> UniformKind) {
        if count > 0 {
            self.uniform(builtin, element(count as u32));
        }
    }

    fn attribute(&mut self, name: &str, format: wgpu::VertexFormat, step: StepMode, source: VertexSource) {
        let location = self.layout.push_attribute(name, format, step) as usize;
        if location == self.bindings.vertex.len() {
            self.bindings.vertex.push(source);
        }
    }
}

/// Lays out the uniforms, textures and vertex inputs `key` needs.
#[must_use]
pub fn build_interface(key: &ProgramKey, shader: Option<&ShaderMaterial>) -> (ProgramLayout, ProgramBindings) {
    use Builtin as B;
    use UniformKind as K;

    let f = key.features;
    let family = key.family;
    let lights = key.lights;
    let mut b = InterfaceBuilder {
        layout: ProgramLayout::new(),
        bindings: ProgramBindings::default(),
    };

    // Object and camera.
    b.uniform(B::ModelMatrix, K::Mat4);
    b.uniform(B::NormalMatrix, K::Mat3);
    b.uniform(B::ViewMatrix, K::Mat4);
    b.uniform(B::ProjectionMatrix, K::Mat4);
    b.uniform(B::CameraPosition, K::Vec3);
    if f.contains(ProgramFeatures::TONE_MAPPED) {
        b.uniform(B::ToneMappingExposure, K::Float);
    }

    // Material.
    b.uniform(B::Diffuse, K::Vec3);
    b.uniform(B::Opacity, K::Float);
    if f.contains(ProgramFeatures::ALPHA_TEST) {
        b.uniform(B::AlphaTest, K::Float);
    }
    let standard = matches!(family, MaterialFamily::Standard | MaterialFamily::Physical);
    if matches!(
        family,
        MaterialFamily::Lambert | MaterialFamily::Phong | MaterialFamily::Toon
    ) || standard
    {
        b.uniform(B::Emissive, K::Vec3);
    }
    if standard {
        b.uniform(B::Roughness, K::Float);
        b.uniform(B::Metalness, K::Float);
        if f.contains(ProgramFeatures::ENV_MAP) {
            b.uniform(B::EnvMapIntensity, K::Float);
        }
    }
    match family {
        MaterialFamily::Basic if f.contains(ProgramFeatures::ENV_MAP) => {
            b.uniform(B::Reflectivity, K::Float);
        }
        MaterialFamily::Phong => {
            b.uniform(B::Specular, K::Vec3);
            b.uniform(B::Shininess, K::Float);
        }
        MaterialFamily::Physical => {
            b.uniform(B::Ior, K::Float);
            if f.contains(ProgramFeatures::SPECULAR_COLOR) {
                b.uniform(B::SpecularColor, K::Vec3);
                b.uniform(B::SpecularIntensity, K::Float);
            }
            if f.contains(ProgramFeatures::CLEARCOAT) {
                b.uniform(B::Clearcoat, K::Float);
                b.uniform(B::ClearcoatRoughness, K::Float);
            }
            if f.contains(ProgramFeatures::SHEEN) {
                b.uniform(B::SheenColor, K::Vec3);
                b.uniform(B::SheenRoughness, K::Float);
            }
            if f.contains(ProgramFeatures::IRIDESCENCE) {
                b.uniform(B::Iridescence, K::Float);
                b.uniform(B::IridescenceIor, K::Float);
            }
            if f.contains(ProgramFeatures::TRANSMISSION) {
                b.uniform(B::AttenuationColor, K::Vec3);
                b.uniform(B::AttenuationDistance, K::Float);
                b.uniform(B::Transmission, K::Float);
                b.uniform(B::Thickness, K::Float);
                b.uniform(B::TransmissionSamplerSize, K::Vec2);
            }
            if f.contains(ProgramFeatures::ANISOTROPY) {
                b.uniform(B::AnisotropyVector, K::Vec2);
            }
        }
        MaterialFamily::Distance => {
            b.uniform(B::ReferencePosition, K::Vec3);
            b.uniform(B::NearDistance, K::Float);
            b.uniform(B::FarDistance, K::Float);
        }
        MaterialFamily::Sprite => b.uniform(B::Rotation, K::Float),
        _ => {}
    }
    if f.contains(ProgramFeatures::DASHED) {
        b.uniform(B::DashSize, K::Float);
        b.uniform(B::TotalSize, K::Float);
        b.uniform(B::LineScale, K::Float);
    }

    // Scene.
    if f.contains(ProgramFeatures::FOG) {
        b.uniform(B::FogColor, K::Vec3);
        b.uniform(B::FogNear, K::Float);
        b.uniform(B::FogFar, K::Float);
        b.uniform(B::FogDensity, K::Float);
    }
    if f.contains(ProgramFeatures::USES_LIGHTS) {
        b.uniform(B::AmbientLightColor, K::Vec3);
        let dir = usize::from(lights.directional);
        let point = usize::from(lights.point);
        let spot = usize::from(lights.spot);
        let hemi = usize::from(lights.hemisphere);
        b.uniform_array(B::DirectionalLights, dir * LightsState::DIRECTIONAL_STRIDE, K::Vec4Array);
        b.uniform_array(B::PointLights, point * LightsState::POINT_STRIDE, K::Vec4Array);
        b.uniform_array(B::SpotLights, spot * LightsState::SPOT_STRIDE, K::Vec4Array);
        b.uniform_array(B::HemisphereLights, hemi * LightsState::HEMISPHERE_STRIDE, K::Vec4Array);
    }
    let receive_shadow = f.contains(ProgramFeatures::RECEIVE_SHADOW);
    if receive_shadow {
        let dir = usize::from(lights.directional_shadows);
        let spot = usize::from(lights.spot_shadows);
        let point = usize::from(lights.point_shadows);
        b.uniform_array(B::DirectionalShadowMatrices, dir, K::Mat4Array);
        b.uniform_array(B::DirectionalShadowParams, dir * 2, K::Vec4Array);
        b.uniform_array(B::SpotShadowMatrices, spot, K::Mat4Array);
        b.uniform_array(B::SpotShadowParams, spot * 2, K::Vec4Array);
        b.uniform_array(B::PointShadowParams, point * 2, K::Vec4Array);
    }

    // Deformation and clipping.
    let morph_targets = usize::from(key.morph_targets);
    if morph_targets > 0 {
        if !f.contains(ProgramFeatures::MORPH_RELATIVE) {
            b.uniform(B::MorphBaseInfluence, K::Float);
        }
        b.uniform_array(B::MorphInfluences, morph_targets.div_ceil(4), K::Vec4Array);
    }
    b.uniform_array(B::BoneMatrices, usize::from(key.bones), K::Mat4Array);
    b.uniform_array(B::ClippingPlanes, usize::from(key.clipping_planes), K::Vec4Array);

    // Custom uniforms follow the built-in block.
    if let Some(shader) = shader {
        for (name, value) in shader.uniforms() {
            let binding = match value {
                UniformValue::Texture(_) => {
                    CustomBinding::Texture(b.layout.push_texture(name, TextureKind::D2))
                }
                UniformValue::Vec4Array(v) if v.is_empty() => CustomBinding::Skipped,
                UniformValue::Mat4Array(v) if v.is_empty() => CustomBinding::Skipped,
                other => CustomBinding::Uniform(b.layout.push_uniform(name, uniform_kind(other))),
            };
            b.bindings.custom.push(binding);
        }
    }
    b.layout.finish();

    // Textures.
    for slot in key.maps.iter() {
        let kind = if slot.is_cube() { TextureKind::Cube } else { TextureKind::D2 };
        b.bindings.maps[slot as usize] = Some(b.layout.push_texture(slot.uniform_name(), kind));
    }
    if receive_shadow {
        for i in 0..lights.directional_shadows {
            let slot = b.layout.push_texture(&format!("directional_shadow_map_{i}"), TextureKind::D2);
            b.bindings.directional_shadow_maps.push(slot);
        }
        for i in 0..lights.spot_shadows {
            let slot = b.layout.push_texture(&format!("spot_shadow_map_{i}"), TextureKind::D2);
            b.bindings.spot_shadow_maps.push(slot);
        }
        for i in 0..lights.point_shadows {
            let slot = b.layout.push_texture(&format!("point_shadow_map_{i}"), TextureKind::D2);
            b.bindings.point_shadow_maps.push(slot);
        }
    }
    if f.contains(ProgramFeatures::TRANSMISSION) {
        b.bindings.transmission = Some(b.layout.push_texture("transmission_sampler_map", TextureKind::D2));
    }

    // Vertex inputs.
    use wgpu::VertexFormat as F;
    let vertex = StepMode::Vertex;
    b.attribute(Geometry::POSITION, F::Float32x3, vertex, VertexSource::Attribute(Geometry::POSITION));
    let streams = [
        (ProgramFeatures::NORMALS, Geometry::NORMAL, F::Float32x3),
        (ProgramFeatures::VERTEX_UVS, Geometry::UV, F::Float32x2),
        (ProgramFeatures::VERTEX_UV1, Geometry::UV1, F::Float32x2),
        (ProgramFeatures::VERTEX_COLORS, Geometry::COLOR, F::Float32x4),
        (ProgramFeatures::VERTEX_TANGENTS, Geometry::TANGENT, F::Float32x4),
        (ProgramFeatures::SKINNING, Geometry::SKIN_INDEX, F::Uint32x4),
        (ProgramFeatures::SKINNING, Geometry::SKIN_WEIGHT, F::Float32x4),
        (ProgramFeatures::DASHED, LINE_DISTANCE, F::Float32),
    ];
    for (flag, name, format) in streams {
        if f.contains(flag) {
            b.attribute(name, format, vertex, VertexSource::Attribute(name));
        }
    }
    if f.contains(ProgramFeatures::INSTANCING) {
        for column in 0..4u8 {
            b.attribute(
                &format!("instance_matrix_{column}"),
                F::Float32x4,
                StepMode::Instance,
                VertexSource::InstanceMatrix(column),
            );
        }
    }
    if f.contains(ProgramFeatures::INSTANCING_COLOR) {
        b.attribute("instance_color", F::Float32x3, StepMode::Instance, VertexSource::InstanceColor);
    }
    for target in 0..key.morph_targets {
        let morph = |attribute| VertexSource::Morph { attribute, target };
        b.attribute(&format!("morph_position_{target}"), F::Float32x3, vertex, morph(Geometry::POSITION));
        if f.contains(ProgramFeatures::MORPH_NORMALS) {
            b.attribute(&format!("morph_normal_{target}"), F::Float32x3, vertex, morph(Geometry::NORMAL));
        }
        if f.contains(ProgramFeatures::MORPH_COLORS) {
            b.attribute(&format!("morph_color_{target}"), F::Float32x4, vertex, morph(Geometry::COLOR));
        }
    }

    (b.layout, b.bindings)
}

fn uniform_kind(value: &UniformValue) -> UniformKind {
    match value {
        UniformValue::Float(_) | UniformValue::Texture(_) => UniformKind::Float,
        UniformValue::Int(_) => UniformKind::Int,
        UniformValue::Vec2(_) => UniformKind::Vec2,
        UniformValue::Vec3(_) => UniformKind::Vec3,
        UniformValue::Vec4(_) => UniformKind::Vec4,
        UniformValue::Mat3(_) => UniformKind::Mat3,
        UniformValue::Mat4(_) => UniformKind::Mat4,
        UniformValue::Vec4Array(v) => UniformKind::Vec4Array(v.len() as u32),
        UniformValue::Mat4Array(v) => UniformKind::Mat4Array(v.len() as u32),
    }
}

// ============================================================================
// Rendering
// ============================================================================

struct TemplateContext<'a> {
    key: &'a ProgramKey,
    layout: &'a ProgramLayout,
    defines: BTreeMap<&'static str, &'static str>,
}

fn shadow_kind_name(kind: ShadowMapKind) -> &'static str {
    match kind {
        ShadowMapKind::Basic => "basic",
        ShadowMapKind::Pcf => "pcf",
        ShadowMapKind::PcfSoft => "pcf_soft",
        ShadowMapKind::Vsm => "vsm",
    }
}

impl Serialize for TemplateContext<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let key = self.key;
        let lights = &key.lights;
        let mut map = serializer.serialize_map(None)?;

        for (name, enabled) in key.features.names() {
            map.serialize_entry(&name, &enabled)?;
        }
        for slot in MapSlot::ALL {
            map.serialize_entry(&format!("use_{}", slot.uniform_name()), &key.maps.contains(slot))?;
        }
        map.serialize_entry("family", key.family.name())?;
        map.serialize_entry("tone_mapping", key.tone_mapping().name())?;
        map.serialize_entry("shadow_kind", shadow_kind_name(key.shadow_kind()))?;
        map.serialize_entry("precision", key.precision().name())?;

        map.serialize_entry("num_dir_lights", &lights.directional)?;
        map.serialize_entry("num_point_lights", &lights.point)?;
        map.serialize_entry("num_spot_lights", &lights.spot)?;
        map.serialize_entry("num_hemi_lights", &lights.hemisphere)?;
        map.serialize_entry("num_dir_shadows", &lights.directional_shadows)?;
        map.serialize_entry("num_spot_shadows", &lights.spot_shadows)?;
        map.serialize_entry("num_point_shadows", &lights.point_shadows)?;
        map.serialize_entry("num_clipping_planes", &key.clipping_planes)?;
        map.serialize_entry("num_clip_intersection", &key.clipping_intersection)?;
        map.serialize_entry("num_morph_targets", &key.morph_targets)?;
        map.serialize_entry("num_bones", &key.bones)?;

        map.serialize_entry("layout", self.layout)?;
        map.serialize_entry("defines", &self.defines)?;
        map.end()
    }
}

/// Generated WGSL with the interface it was rendered against.
#[derive(Debug, Clone)]
pub struct GeneratedProgram {
    pub source: String,
    pub source_hash: u64,
    pub layout: ProgramLayout,
    pub bindings: ProgramBindings,
}

/// Renders the program for `key`. Custom shader materials render their
/// own template; every other family renders its built-in one.
pub fn generate(
    key: &ProgramKey,
    shader: Option<&ShaderMaterial>,
    label: &str,
) -> Result<GeneratedProgram, ProgramDiagnostics> {
    let (layout, bindings) = build_interface(key, shader);
    let ctx = TemplateContext {
        key,
        layout: &layout,
        defines: shader.map(|s| s.defines.to_map()).unwrap_or_default(),
    };

    let env = get_env();
    let rendered = match shader {
        Some(shader) => env.render_named_str(label, shader.template(), &ctx),
        None => env.get_template(key.template()).and_then(|t| t.render(&ctx)),
    };
    let source = rendered.map_err(|err| {
        let template_source = shader.map_or("", ShaderMaterial::template);
        let line = err.line().map(|l| l as u32);
        ProgramDiagnostics::new(label, ShaderStage::Module, format!("{err:#}"), line, template_source)
    })?;

    log::debug!(
        "Generated program {label}: {} uniforms, {} textures, {} vertex inputs",
        layout.uniforms.len(),
        layout.textures.len(),
        layout.attributes.len()
    );
    Ok(GeneratedProgram {
        source_hash: xxh3_64(source.as_bytes()),
        source,
        layout,
        bindings,
    })
}

/// Parses and validates generated WGSL, mapping failures to diagnostics
/// with a line excerpt.
pub fn validate_wgsl(label: &str, source: &str) -> Result<(), ProgramDiagnostics> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| {
        let line = err.location(source).map(|loc| loc.line_number);
        ProgramDiagnostics::new(label, ShaderStage::Module, err.emit_to_string(source), line, source)
    })?;
    let mut validator = Validator::new(ValidationFlags::all(), NagaCapabilities::all());
    validator.validate(&module).map_err(|err| {
        let stage = match err.as_inner() {
            ValidationError::EntryPoint { stage: naga::ShaderStage::Vertex, .. } => ShaderStage::Vertex,
            ValidationError::EntryPoint { stage: naga::ShaderStage::Fragment, .. } => ShaderStage::Fragment,
            _ => ShaderStage::Module,
        };
        let line = err.location(source).map(|loc| loc.line_number);
        ProgramDiagnostics::new(label, stage, err.emit_to_string(source), line, source)
    })?;
    Ok(())
}
