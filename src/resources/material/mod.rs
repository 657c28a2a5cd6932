//! Materials
//!
//! A [`Material`] is a closed [`MaterialKind`] (one variant per built-in
//! shading family, plus [`ShaderMaterial`] for user programs), a set of
//! texture [`MaterialMaps`] and the fixed-function [`MaterialSettings`].
//!
//! # Versioning
//!
//! Two counters drive renderer caches:
//!
//! | Counter | Bumped when | Consumer |
//! |---------|-------------|----------|
//! | [`Material::version`] | the [`MaterialSignature`] changes | program key derivation |
//! | [`Material::uniforms_version`] | any edit | uniform refresh |
//!
//! All mutation goes through [`Material::edit`]; the returned guard takes a
//! signature before the edit and compares it on drop, so changing a color
//! never triggers program derivation while toggling a map does.

mod kind;
mod maps;
mod render_state;
mod shader;

pub use kind::{
    BasicParams, DepthPacking, DistanceParams, LambertParams, LineDashedParams, MaterialFamily,
    MaterialKind, PhongParams, PhysicalParams, PointsParams, SpriteParams, StandardParams,
    ToonParams,
};
pub use maps::{MapSet, MapSlot, MaterialMaps};
pub use render_state::{
    Blending, CustomBlending, PolygonOffset, Side, StencilSettings, resolve_blend_state,
};
pub use shader::ShaderMaterial;

use std::hash::BuildHasher;

use bitflags::bitflags;
use glam::Vec4;
use rustc_hash::FxBuildHasher;

use crate::resources::uniforms::UniformValue;
use crate::resources::version_tracker::{ChangeTracker, ResourceId};

bitflags! {
    /// Program-affecting switches contributed by the material itself.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
    pub struct MaterialFeatures: u32 {
        const VERTEX_COLORS       = 1 << 0;
        const ALPHA_TEST          = 1 << 1;
        const ALPHA_HASH          = 1 << 2;
        const ALPHA_TO_COVERAGE   = 1 << 3;
        const FLAT_SHADING        = 1 << 4;
        const DOUBLE_SIDED        = 1 << 5;
        const BACK_SIDED          = 1 << 6;
        const FOG                 = 1 << 7;
        const DITHERING           = 1 << 8;
        const PREMULTIPLIED_ALPHA = 1 << 9;
        const TONE_MAPPED         = 1 << 10;
        const OPAQUE              = 1 << 11;
        const CLEARCOAT           = 1 << 12;
        const SHEEN               = 1 << 13;
        const IRIDESCENCE         = 1 << 14;
        const TRANSMISSION        = 1 << 15;
        const ANISOTROPY          = 1 << 16;
        const SPECULAR_COLOR      = 1 << 17;
        const SIZE_ATTENUATION    = 1 << 18;
        const DASHED              = 1 << 19;
        const DEPTH_PACKING_RGBA  = 1 << 20;
        const DEPTH_PACKING_MOMENTS = 1 << 21;
        const CLIP_INTERSECTION   = 1 << 22;
    }
}

bitflags! {
    /// Coarse capability queries answered without matching on the kind.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MaterialCapabilities: u16 {
        const USES_LIGHTS     = 1 << 0;
        const TRANSMISSIVE    = 1 << 1;
        const TRANSPARENT     = 1 << 2;
        const HAS_ENV_MAP     = 1 << 3;
        const HAS_CLEARCOAT   = 1 << 4;
        const HAS_SHEEN       = 1 << 5;
        const HAS_IRIDESCENCE = 1 << 6;
        const HAS_ANISOTROPY  = 1 << 7;
        const RECEIVES_FOG    = 1 << 8;
        const CUSTOM_SHADER   = 1 << 9;
        const SAMPLES_TEXTURES = 1 << 10;
    }
}

/// Fixed-function and shading switches shared by every family.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSettings {
    pub side: Side,
    /// Side rendered into shadow maps; `None` picks the opposite of `side`
    /// for single-sided materials.
    pub shadow_side: Option<Side>,
    pub visible: bool,
    pub transparent: bool,
    pub opacity: f32,
    pub blending: Blending,
    pub premultiplied_alpha: bool,
    pub blend_constant: Option<[f32; 4]>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: wgpu::CompareFunction,
    pub stencil: StencilSettings,
    pub color_write: bool,
    pub polygon_offset: Option<PolygonOffset>,
    /// Fragments with alpha below this are discarded; 0 disables the test.
    pub alpha_test: f32,
    pub alpha_hash: bool,
    pub alpha_to_coverage: bool,
    pub dithering: bool,
    pub vertex_colors: bool,
    pub fog: bool,
    pub tone_mapped: bool,
    pub flat_shading: bool,
    /// Local clipping planes as (normal, constant).
    pub clipping_planes: Vec<Vec4>,
    pub clip_intersection: bool,
    pub clip_shadows: bool,
    /// Render double-sided transparent materials in one pass instead of
    /// back faces first, then front faces.
    pub force_single_pass: bool,
    /// Appended to the program key of user programs with external inputs.
    pub custom_program_key: Option<String>,
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            side: Side::Front,
            shadow_side: None,
            visible: true,
            transparent: false,
            opacity: 1.0,
            blending: Blending::Normal,
            premultiplied_alpha: false,
            blend_constant: None,
            depth_test: true,
            depth_write: true,
            depth_func: wgpu::CompareFunction::LessEqual,
            stencil: StencilSettings::default(),
            color_write: true,
            polygon_offset: None,
            alpha_test: 0.0,
            alpha_hash: false,
            alpha_to_coverage: false,
            dithering: false,
            vertex_colors: false,
            fog: true,
            tone_mapped: true,
            flat_shading: false,
            clipping_planes: Vec::new(),
            clip_intersection: false,
            clip_shadows: false,
            force_single_pass: false,
            custom_program_key: None,
        }
    }
}

/// Everything a material contributes to its program key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialSignature {
    pub family: MaterialFamily,
    pub maps: MapSet,
    pub features: MaterialFeatures,
    pub clipping_planes: u8,
    pub custom_key: u64,
    pub shader_hash: u64,
}

/// The editable part of a material.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    pub kind: MaterialKind,
    pub maps: MaterialMaps,
    pub settings: MaterialSettings,
}

/// Cloning yields a new material with its own id; equal keys still share
/// one compiled program.
#[derive(Debug)]
pub struct Material {
    id: ResourceId,
    pub name: String,
    data: MaterialData,
    version: ChangeTracker,
    uniforms_version: ChangeTracker,
}

impl Clone for Material {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            name: self.name.clone(),
            data: self.data.clone(),
            version: ChangeTracker::new(),
            uniforms_version: ChangeTracker::new(),
        }
    }
}

impl Material {
    #[must_use]
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            id: ResourceId::next(),
            name: String::new(),
            data: MaterialData {
                kind,
                maps: MaterialMaps::default(),
                settings: MaterialSettings::default(),
            },
            version: ChangeTracker::new(),
            uniforms_version: ChangeTracker::new(),
        }
    }

    #[must_use]
    pub fn basic() -> Self {
        Self::new(MaterialKind::Basic(BasicParams::default()))
    }

    #[must_use]
    pub fn lambert() -> Self {
        Self::new(MaterialKind::Lambert(LambertParams::default()))
    }

    #[must_use]
    pub fn phong() -> Self {
        Self::new(MaterialKind::Phong(PhongParams::default()))
    }

    #[must_use]
    pub fn standard() -> Self {
        Self::new(MaterialKind::Standard(StandardParams::default()))
    }

    #[must_use]
    pub fn physical() -> Self {
        Self::new(MaterialKind::Physical(PhysicalParams::default()))
    }

    #[must_use]
    pub fn shader(shader: ShaderMaterial) -> Self {
        Self::new(MaterialKind::Shader(shader))
    }

    /// Builder-style edit, for construction chains.
    #[must_use]
    pub fn with(mut self, f: impl FnOnce(&mut MaterialData)) -> Self {
        f(&mut self.edit());
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.version()
    }

    #[inline]
    #[must_use]
    pub fn uniforms_version(&self) -> u64 {
        self.uniforms_version.version()
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &MaterialKind {
        &self.data.kind
    }

    #[inline]
    #[must_use]
    pub fn family(&self) -> MaterialFamily {
        self.data.kind.family()
    }

    #[inline]
    #[must_use]
    pub fn maps(&self) -> &MaterialMaps {
        &self.data.maps
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &MaterialSettings {
        &self.data.settings
    }

    /// Opens an edit scope; versions are bumped when the guard drops.
    pub fn edit(&mut self) -> MaterialEdit<'_> {
        let before = signature_of(&self.data);
        MaterialEdit {
            data: &mut self.data,
            before,
            version: &mut self.version,
            uniforms_version: &mut self.uniforms_version,
        }
    }

    /// Forces program derivation on next use.
    pub fn needs_update(&mut self) {
        self.version.changed();
        self.uniforms_version.changed();
    }

    #[must_use]
    pub fn signature(&self) -> MaterialSignature {
        signature_of(&self.data)
    }

    #[must_use]
    pub fn features(&self) -> MaterialFeatures {
        features_of(&self.data)
    }

    /// Texture slots that are both assigned and sampled by the family.
    #[must_use]
    pub fn active_maps(&self) -> MapSet {
        self.data
            .maps
            .present()
            .intersection(self.family().supported_maps())
    }

    #[must_use]
    pub fn capabilities(&self) -> MaterialCapabilities {
        let mut caps = MaterialCapabilities::empty();
        let features = self.features();
        let family = self.family();
        let shader = match &self.data.kind {
            MaterialKind::Shader(s) => Some(s),
            _ => None,
        };
        caps.set(
            MaterialCapabilities::USES_LIGHTS,
            family.uses_lights() || shader.is_some_and(|s| s.lights),
        );
        caps.set(MaterialCapabilities::TRANSMISSIVE, self.is_transmissive());
        caps.set(MaterialCapabilities::TRANSPARENT, self.data.settings.transparent);
        caps.set(
            MaterialCapabilities::HAS_ENV_MAP,
            self.active_maps().contains(MapSlot::EnvMap),
        );
        caps.set(
            MaterialCapabilities::HAS_CLEARCOAT,
            features.contains(MaterialFeatures::CLEARCOAT),
        );
        caps.set(MaterialCapabilities::HAS_SHEEN, features.contains(MaterialFeatures::SHEEN));
        caps.set(
            MaterialCapabilities::HAS_IRIDESCENCE,
            features.contains(MaterialFeatures::IRIDESCENCE),
        );
        caps.set(
            MaterialCapabilities::HAS_ANISOTROPY,
            features.contains(MaterialFeatures::ANISOTROPY),
        );
        caps.set(
            MaterialCapabilities::RECEIVES_FOG,
            features.contains(MaterialFeatures::FOG),
        );
        caps.set(MaterialCapabilities::CUSTOM_SHADER, shader.is_some());
        caps.set(
            MaterialCapabilities::SAMPLES_TEXTURES,
            !self.active_maps().is_empty()
                || shader.is_some_and(|s| {
                    s.uniforms()
                        .iter()
                        .any(|(_, v)| matches!(v, UniformValue::Texture(_)))
                }),
        );
        caps
    }

    #[inline]
    #[must_use]
    pub fn uses_lights(&self) -> bool {
        self.capabilities().contains(MaterialCapabilities::USES_LIGHTS)
    }

    #[inline]
    #[must_use]
    pub fn has_env_map(&self) -> bool {
        self.active_maps().contains(MapSlot::EnvMap)
    }

    /// Positive transmission routes the drawable into the transmissive list.
    #[inline]
    #[must_use]
    pub fn is_transmissive(&self) -> bool {
        self.data.kind.transmission() > 0.0
    }
}

/// Edit scope returned by [`Material::edit`].
pub struct MaterialEdit<'a> {
    data: &'a mut MaterialData,
    before: MaterialSignature,
    version: &'a mut ChangeTracker,
    uniforms_version: &'a mut ChangeTracker,
}

impl std::ops::Deref for MaterialEdit<'_> {
    type Target = MaterialData;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl std::ops::DerefMut for MaterialEdit<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

impl Drop for MaterialEdit<'_> {
    fn drop(&mut self) {
        self.uniforms_version.changed();
        if signature_of(self.data) != self.before {
            self.version.changed();
        }
    }
}

fn features_of(data: &MaterialData) -> MaterialFeatures {
    let s = &data.settings;
    let mut f = MaterialFeatures::empty();
    f.set(MaterialFeatures::VERTEX_COLORS, s.vertex_colors);
    f.set(MaterialFeatures::ALPHA_TEST, s.alpha_test > 0.0);
    f.set(MaterialFeatures::ALPHA_HASH, s.alpha_hash);
    f.set(MaterialFeatures::ALPHA_TO_COVERAGE, s.alpha_to_coverage);
    f.set(MaterialFeatures::FLAT_SHADING, s.flat_shading);
    f.set(MaterialFeatures::DOUBLE_SIDED, s.side == Side::Double);
    f.set(MaterialFeatures::BACK_SIDED, s.side == Side::Back);
    f.set(MaterialFeatures::FOG, s.fog);
    f.set(MaterialFeatures::DITHERING, s.dithering);
    f.set(MaterialFeatures::PREMULTIPLIED_ALPHA, s.premultiplied_alpha);
    f.set(MaterialFeatures::TONE_MAPPED, s.tone_mapped);
    f.set(MaterialFeatures::OPAQUE, !s.transparent && s.alpha_test == 0.0);
    f.set(MaterialFeatures::CLIP_INTERSECTION, s.clip_intersection);
    match &data.kind {
        MaterialKind::Physical(p) => {
            f.set(MaterialFeatures::CLEARCOAT, p.clearcoat > 0.0);
            f.set(MaterialFeatures::SHEEN, p.sheen > 0.0);
            f.set(MaterialFeatures::IRIDESCENCE, p.iridescence > 0.0);
            f.set(MaterialFeatures::TRANSMISSION, p.transmission > 0.0);
            f.set(MaterialFeatures::ANISOTROPY, p.anisotropy != 0.0);
            f.set(
                MaterialFeatures::SPECULAR_COLOR,
                p.specular_intensity != 1.0 || p.specular_color != glam::Vec3::ONE,
            );
        }
        MaterialKind::Points(p) => f.set(MaterialFeatures::SIZE_ATTENUATION, p.size_attenuation),
        MaterialKind::Sprite(p) => f.set(MaterialFeatures::SIZE_ATTENUATION, p.size_attenuation),
        MaterialKind::LineDashed(_) => f.insert(MaterialFeatures::DASHED),
        MaterialKind::Depth { packing } => match packing {
            DepthPacking::Basic => {}
            DepthPacking::Rgba => f.insert(MaterialFeatures::DEPTH_PACKING_RGBA),
            DepthPacking::Moments => f.insert(MaterialFeatures::DEPTH_PACKING_MOMENTS),
        },
        _ => {}
    }
    f
}

fn signature_of(data: &MaterialData) -> MaterialSignature {
    let family = data.kind.family();
    MaterialSignature {
        family,
        maps: data.maps.present().intersection(family.supported_maps()),
        features: features_of(data),
        clipping_planes: data.settings.clipping_planes.len().min(u8::MAX as usize) as u8,
        custom_key: data
            .settings
            .custom_program_key
            .as_ref()
            .map_or(0, |k| FxBuildHasher.hash_one(k.as_str())),
        shader_hash: match &data.kind {
            MaterialKind::Shader(s) => s.layout_hash(),
            _ => 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Assets;
    use crate::resources::texture::Texture;
    use glam::Vec3;

    #[test]
    fn value_edit_bumps_only_uniforms_version() {
        let mut m = Material::standard();
        let (v, u) = (m.version(), m.uniforms_version());
        if let MaterialKind::Standard(p) = &mut m.edit().kind {
            p.color = Vec3::new(1.0, 0.0, 0.0);
        }
        assert_eq!(m.version(), v);
        assert_eq!(m.uniforms_version(), u + 1);
    }

    #[test]
    fn map_toggle_bumps_version() {
        let mut assets = Assets::new();
        let tex = assets.add_texture(Texture::solid([255; 4]));
        let mut m = Material::standard();
        let v = m.version();
        m.edit().maps.set(MapSlot::Map, Some(tex));
        assert_eq!(m.version(), v + 1);
        assert!(m.capabilities().contains(MaterialCapabilities::SAMPLES_TEXTURES));
    }

    #[test]
    fn unsupported_map_does_not_change_signature() {
        let mut assets = Assets::new();
        let tex = assets.add_texture(Texture::solid([255; 4]));
        let mut m = Material::basic();
        let v = m.version();
        m.edit().maps.set(MapSlot::ClearcoatMap, Some(tex));
        assert_eq!(m.version(), v);
    }

    #[test]
    fn transmission_marks_material_transmissive() {
        let m = Material::physical().with(|d| {
            if let MaterialKind::Physical(p) = &mut d.kind {
                p.transmission = 0.5;
            }
        });
        assert!(m.is_transmissive());
        assert!(m.features().contains(MaterialFeatures::TRANSMISSION));
        assert!(!Material::physical().is_transmissive());
    }
}
