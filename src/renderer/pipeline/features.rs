//! Program key derivation.
//!
//! [`derive_parameters`] folds a material, the frame's lights, the draw
//! context and the renderer settings into [`ProgramParameters`]. Its
//! [`ProgramKey`] identifies one compiled program variant: two draws with
//! equal keys share a program.

use std::fmt;
use std::hash::{BuildHasher, Hash};

use bitflags::bitflags;
use glam::Vec4;
use rustc_hash::FxBuildHasher;

use crate::renderer::lights::LightsHash;
use crate::renderer::settings::{Precision, RendererSettings, ShadowMapKind, ToneMapping};
use crate::resources::buffer::ElementFormat;
use crate::resources::geometry::Geometry;
use crate::resources::material::{
    MapSet, MapSlot, Material, MaterialFamily, MaterialFeatures, MaterialKind, MaterialSettings,
};
use crate::resources::texture::ColorSpace;
use crate::scene::drawable::DrawMode;
use crate::scene::fog::Fog;

/// Morph targets a program blends at most.
pub const MAX_MORPH_TARGETS: usize = 8;
/// Bone matrices a skinned program declares at most.
pub const MAX_BONES: usize = 128;
/// Name of the per-vertex line distance stream read by dashed lines.
pub const LINE_DISTANCE: &str = "line_distance";

bitflags! {
    /// Orthogonal switches of a generated program.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
    pub struct ProgramFeatures: u64 {
        const SKINNING              = 1 << 0;
        const MORPH_TARGETS         = 1 << 1;
        const MORPH_NORMALS         = 1 << 2;
        const MORPH_COLORS          = 1 << 3;
        const MORPH_RELATIVE        = 1 << 4;
        const INSTANCING            = 1 << 5;
        const INSTANCING_COLOR      = 1 << 6;
        const VERTEX_COLORS         = 1 << 7;
        const VERTEX_ALPHAS         = 1 << 8;
        const VERTEX_TANGENTS       = 1 << 9;
        const VERTEX_UVS            = 1 << 10;
        const VERTEX_UV1            = 1 << 11;
        const NORMALS               = 1 << 12;
        const FLAT_SHADING          = 1 << 13;
        const DOUBLE_SIDED          = 1 << 14;
        const FLIP_SIDED            = 1 << 15;
        const ALPHA_TEST            = 1 << 16;
        const ALPHA_HASH            = 1 << 17;
        const ALPHA_TO_COVERAGE     = 1 << 18;
        const FOG                   = 1 << 19;
        const FOG_EXP2              = 1 << 20;
        const SHADOW_MAP            = 1 << 21;
        const RECEIVE_SHADOW        = 1 << 22;
        const PREMULTIPLIED_ALPHA   = 1 << 23;
        const DITHERING             = 1 << 24;
        const REVERSED_DEPTH        = 1 << 25;
        const TONE_MAPPED           = 1 << 26;
        const SIZE_ATTENUATION      = 1 << 27;
        const ENV_MAP               = 1 << 28;
        const CLEARCOAT             = 1 << 29;
        const SHEEN                 = 1 << 30;
        const IRIDESCENCE           = 1 << 31;
        const TRANSMISSION          = 1 << 32;
        const ANISOTROPY            = 1 << 33;
        const SPECULAR_COLOR        = 1 << 34;
        const DASHED                = 1 << 35;
        const DEPTH_PACKING_RGBA    = 1 << 36;
        const DEPTH_PACKING_MOMENTS = 1 << 37;
        const POINTS                = 1 << 38;
        const SPRITE                = 1 << 39;
        const USES_LIGHTS           = 1 << 40;
        const OPAQUE                = 1 << 41;
        const SHADOW_PASS           = 1 << 42;
        const OUTPUT_SRGB           = 1 << 43;
        const LINES                 = 1 << 44;
    }
}

impl ProgramFeatures {
    /// Template-facing names: the flag name in lowercase.
    pub fn names(self) -> impl Iterator<Item = (String, bool)> {
        Self::all()
            .iter_names()
            .map(move |(name, flag)| (name.to_lowercase(), self.contains(flag)))
    }
}

/// Clipping planes in effect for one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Clipping {
    pub planes: u8,
    /// Trailing planes that clip only where all of them agree.
    pub intersecting: u8,
}

impl Clipping {
    /// Collects the planes of a draw into `out`: global planes first, then
    /// the material's local planes. Shadow passes use only local planes,
    /// and only when the material clips its shadows.
    pub fn gather(
        settings: &RendererSettings,
        material: &MaterialSettings,
        rendering_shadows: bool,
        out: &mut Vec<Vec4>,
    ) -> Self {
        out.clear();
        if !rendering_shadows {
            out.extend_from_slice(&settings.clipping_planes);
        }
        let local = settings.local_clipping_enabled
            && !material.clipping_planes.is_empty()
            && (!rendering_shadows || material.clip_shadows);
        let mut intersecting = 0;
        if local {
            out.extend_from_slice(&material.clipping_planes);
            if material.clip_intersection {
                intersecting = material.clipping_planes.len();
            }
        }
        Self {
            planes: out.len().min(u8::MAX as usize) as u8,
            intersecting: intersecting.min(u8::MAX as usize) as u8,
        }
    }
}

/// Per-draw inputs of key derivation beyond the material.
#[derive(Debug, Clone, Copy)]
pub struct DrawContext<'a> {
    pub geometry: &'a Geometry,
    pub mode: DrawMode,
    /// Bone matrices of the drawable's skin; 0 when unskinned.
    pub bones: usize,
    /// Morph influences of the drawable.
    pub morph_targets: usize,
    pub instancing: bool,
    pub instance_colors: bool,
    pub receive_shadow: bool,
    pub fog: Option<&'a Fog>,
    /// A scene environment is available to env-mapped families.
    pub environment: bool,
    /// Drawing into the screen rather than an offscreen target.
    pub to_screen: bool,
    pub rendering_shadows: bool,
    pub reversed_depth: bool,
    pub clipping: Clipping,
    pub max_vertex_attributes: u32,
    pub max_vertex_buffers: u32,
}

/// Identity of one compiled program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramKey {
    pub family: MaterialFamily,
    pub shader_hash: u64,
    pub maps: MapSet,
    pub features: ProgramFeatures,
    pub tone_mapping: ToneMappingKey,
    pub lights: LightsHash,
    pub shadow_kind: ShadowKindKey,
    pub clipping_planes: u8,
    pub clipping_intersection: u8,
    pub morph_targets: u8,
    pub bones: u16,
    pub output_color_space: ColorSpaceKey,
    pub custom_key: u64,
    pub precision: PrecisionKey,
}

/// Orderable wrappers so that [`ProgramKey`] sorts deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToneMappingKey(u8);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowKindKey(u8);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColorSpaceKey(u8);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrecisionKey(u8);

impl ProgramKey {
    #[must_use]
    pub fn tone_mapping(&self) -> ToneMapping {
        match self.tone_mapping.0 {
            1 => ToneMapping::Linear,
            2 => ToneMapping::Reinhard,
            3 => ToneMapping::Cineon,
            4 => ToneMapping::AcesFilmic,
            5 => ToneMapping::AgX,
            6 => ToneMapping::Neutral,
            _ => ToneMapping::None,
        }
    }

    #[must_use]
    pub fn shadow_kind(&self) -> ShadowMapKind {
        match self.shadow_kind.0 {
            0 => ShadowMapKind::Basic,
            2 => ShadowMapKind::PcfSoft,
            3 => ShadowMapKind::Vsm,
            _ => ShadowMapKind::Pcf,
        }
    }

    #[must_use]
    pub fn output_color_space(&self) -> ColorSpace {
        if self.output_color_space.0 == 1 {
            ColorSpace::Srgb
        } else {
            ColorSpace::Linear
        }
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        match self.precision.0 {
            1 => Precision::Medium,
            2 => Precision::Low,
            _ => Precision::High,
        }
    }

    #[inline]
    #[must_use]
    pub fn has(&self, feature: ProgramFeatures) -> bool {
        self.features.contains(feature)
    }

    /// 64-bit digest, used in labels and logs.
    #[must_use]
    pub fn digest(&self) -> u64 {
        FxBuildHasher.hash_one(self)
    }

    /// Template the program is generated from.
    #[must_use]
    pub fn template(&self) -> &'static str {
        if self.has(ProgramFeatures::SPRITE) && self.family == MaterialFamily::Sprite {
            "sprite"
        } else {
            self.family.template()
        }
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:016x}", self.family.name(), self.digest())
    }
}

/// Everything needed to generate and cache a program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramParameters {
    key: ProgramKey,
    pub label: String,
}

impl ProgramParameters {
    #[inline]
    #[must_use]
    pub fn key(&self) -> ProgramKey {
        self.key
    }
}

/// Derives the program variant `material` needs for one draw.
#[must_use]
pub fn derive_parameters(
    material: &Material,
    lights: &LightsHash,
    draw: &DrawContext<'_>,
    settings: &RendererSettings,
) -> ProgramParameters {
    let family = material.family();
    let signature = material.signature();
    let material_features = signature.features;
    let geometry = draw.geometry;
    let shader = match material.kind() {
        MaterialKind::Shader(s) => Some(s),
        _ => None,
    };
    let uses_lights = material.uses_lights();

    let mut maps = signature.maps;
    let mut f = ProgramFeatures::empty();

    // Environment: own cube map first, scene environment for PBR families.
    let env_fallback = draw.environment
        && matches!(family, MaterialFamily::Standard | MaterialFamily::Physical);
    if env_fallback {
        maps.insert(MapSlot::EnvMap);
    }
    f.set(ProgramFeatures::ENV_MAP, maps.contains(MapSlot::EnvMap));

    // Vertex streams.
    let wants_normals = shader.is_some()
        || maps.contains(MapSlot::EnvMap)
        || matches!(
            family,
            MaterialFamily::Lambert
                | MaterialFamily::Phong
                | MaterialFamily::Standard
                | MaterialFamily::Physical
                | MaterialFamily::Toon
                | MaterialFamily::Matcap
                | MaterialFamily::Normal
                | MaterialFamily::Shadow
        )
        || maps.contains(MapSlot::DisplacementMap);
    f.set(
        ProgramFeatures::NORMALS,
        wants_normals && geometry.has_attribute(Geometry::NORMAL),
    );
    let uv_maps = maps.iter().any(|s| !matches!(s, MapSlot::EnvMap | MapSlot::Matcap));
    f.set(
        ProgramFeatures::VERTEX_UVS,
        (uv_maps || shader.is_some() || family == MaterialFamily::Sprite)
            && geometry.has_attribute(Geometry::UV),
    );
    f.set(
        ProgramFeatures::VERTEX_UV1,
        (maps.contains(MapSlot::LightMap) || maps.contains(MapSlot::AoMap) || shader.is_some())
            && geometry.has_attribute(Geometry::UV1),
    );
    let vertex_colors = material_features.contains(MaterialFeatures::VERTEX_COLORS)
        && geometry.has_attribute(Geometry::COLOR);
    f.set(ProgramFeatures::VERTEX_COLORS, vertex_colors);
    f.set(
        ProgramFeatures::VERTEX_ALPHAS,
        vertex_colors
            && geometry
                .attribute(Geometry::COLOR)
                .is_some_and(|a| a.format() == ElementFormat::Vertex(wgpu::VertexFormat::Float32x4)),
    );
    f.set(
        ProgramFeatures::VERTEX_TANGENTS,
        maps.contains(MapSlot::NormalMap)
            && f.contains(ProgramFeatures::NORMALS)
            && geometry.has_attribute(Geometry::TANGENT),
    );
    f.set(
        ProgramFeatures::DASHED,
        material_features.contains(MaterialFeatures::DASHED) && geometry.has_attribute(LINE_DISTANCE),
    );

    // Deformation.
    let bones = if draw.bones > 0
        && geometry.has_attribute(Geometry::SKIN_INDEX)
        && geometry.has_attribute(Geometry::SKIN_WEIGHT)
    {
        draw.bones.min(MAX_BONES)
    } else {
        0
    };
    f.set(ProgramFeatures::SKINNING, bones > 0);
    f.set(ProgramFeatures::INSTANCING, draw.instancing);
    f.set(ProgramFeatures::INSTANCING_COLOR, draw.instancing && draw.instance_colors);

    let position_targets = geometry.morph_attributes(Geometry::POSITION).len();
    let requested = draw.morph_targets.min(position_targets).min(MAX_MORPH_TARGETS);
    let morph_normals = requested > 0
        && f.contains(ProgramFeatures::NORMALS)
        && geometry.morph_attributes(Geometry::NORMAL).len() >= requested;
    let morph_colors = requested > 0
        && vertex_colors
        && geometry.morph_attributes(Geometry::COLOR).len() >= requested;
    let morph_targets = requested.min(morph_budget(f, morph_normals, morph_colors, draw));
    f.set(ProgramFeatures::MORPH_TARGETS, morph_targets > 0);
    f.set(ProgramFeatures::MORPH_NORMALS, morph_targets > 0 && morph_normals);
    f.set(ProgramFeatures::MORPH_COLORS, morph_targets > 0 && morph_colors);
    f.set(
        ProgramFeatures::MORPH_RELATIVE,
        morph_targets > 0 && geometry.morph_targets_relative,
    );

    // Material switches.
    let direct = [
        (MaterialFeatures::FLAT_SHADING, ProgramFeatures::FLAT_SHADING),
        (MaterialFeatures::DOUBLE_SIDED, ProgramFeatures::DOUBLE_SIDED),
        (MaterialFeatures::BACK_SIDED, ProgramFeatures::FLIP_SIDED),
        (MaterialFeatures::ALPHA_TEST, ProgramFeatures::ALPHA_TEST),
        (MaterialFeatures::ALPHA_HASH, ProgramFeatures::ALPHA_HASH),
        (MaterialFeatures::ALPHA_TO_COVERAGE, ProgramFeatures::ALPHA_TO_COVERAGE),
        (MaterialFeatures::PREMULTIPLIED_ALPHA, ProgramFeatures::PREMULTIPLIED_ALPHA),
        (MaterialFeatures::DITHERING, ProgramFeatures::DITHERING),
        (MaterialFeatures::OPAQUE, ProgramFeatures::OPAQUE),
        (MaterialFeatures::SIZE_ATTENUATION, ProgramFeatures::SIZE_ATTENUATION),
        (MaterialFeatures::CLEARCOAT, ProgramFeatures::CLEARCOAT),
        (MaterialFeatures::SHEEN, ProgramFeatures::SHEEN),
        (MaterialFeatures::IRIDESCENCE, ProgramFeatures::IRIDESCENCE),
        (MaterialFeatures::TRANSMISSION, ProgramFeatures::TRANSMISSION),
        (MaterialFeatures::ANISOTROPY, ProgramFeatures::ANISOTROPY),
        (MaterialFeatures::SPECULAR_COLOR, ProgramFeatures::SPECULAR_COLOR),
        (MaterialFeatures::DEPTH_PACKING_RGBA, ProgramFeatures::DEPTH_PACKING_RGBA),
        (MaterialFeatures::DEPTH_PACKING_MOMENTS, ProgramFeatures::DEPTH_PACKING_MOMENTS),
    ];
    for (from, to) in direct {
        f.set(to, material_features.contains(from));
    }

    // Scene inputs.
    let receives_fog = match shader {
        Some(s) => s.fog,
        None => !matches!(
            family,
            MaterialFamily::Depth | MaterialFamily::Distance | MaterialFamily::Normal
        ),
    };
    let fog = draw
        .fog
        .filter(|_| receives_fog && material_features.contains(MaterialFeatures::FOG) && !draw.rendering_shadows);
    f.set(ProgramFeatures::FOG, fog.is_some());
    f.set(ProgramFeatures::FOG_EXP2, fog.is_some_and(Fog::is_exp2));

    let lights = if uses_lights && !draw.rendering_shadows {
        *lights
    } else {
        LightsHash::default()
    };
    let shadow_map = settings.shadow_map.enabled && lights.shadow_count() > 0;
    f.set(ProgramFeatures::USES_LIGHTS, uses_lights && !draw.rendering_shadows);
    f.set(ProgramFeatures::SHADOW_MAP, shadow_map);
    f.set(
        ProgramFeatures::RECEIVE_SHADOW,
        shadow_map && (draw.receive_shadow || family == MaterialFamily::Shadow),
    );
    f.set(ProgramFeatures::REVERSED_DEPTH, draw.reversed_depth);
    f.set(ProgramFeatures::SHADOW_PASS, draw.rendering_shadows);

    let tone_mapped = draw.to_screen
        && settings.tone_mapping != ToneMapping::None
        && material_features.contains(MaterialFeatures::TONE_MAPPED)
        && !draw.rendering_shadows;
    f.set(ProgramFeatures::TONE_MAPPED, tone_mapped);
    let output = if draw.to_screen && !draw.rendering_shadows {
        settings.output_color_space
    } else {
        ColorSpace::Linear
    };
    f.set(ProgramFeatures::OUTPUT_SRGB, output == ColorSpace::Srgb);

    f.set(ProgramFeatures::POINTS, draw.mode == DrawMode::Points);
    f.set(ProgramFeatures::SPRITE, draw.mode == DrawMode::Sprite);
    f.set(
        ProgramFeatures::LINES,
        matches!(draw.mode, DrawMode::Lines | DrawMode::LineStrip),
    );

    let key = ProgramKey {
        family,
        shader_hash: signature.shader_hash,
        maps,
        features: f,
        tone_mapping: ToneMappingKey(if tone_mapped {
            settings.tone_mapping.index() as u8
        } else {
            0
        }),
        lights,
        shadow_kind: ShadowKindKey(if shadow_map {
            settings.shadow_map.kind.index() as u8
        } else {
            ShadowMapKind::Pcf.index() as u8
        }),
        clipping_planes: draw.clipping.planes,
        clipping_intersection: draw.clipping.intersecting,
        morph_targets: morph_targets as u8,
        bones: bones as u16,
        output_color_space: ColorSpaceKey(u8::from(output == ColorSpace::Srgb)),
        custom_key: signature.custom_key,
        precision: PrecisionKey(match settings.precision {
            Precision::High => 0,
            Precision::Medium => 1,
            Precision::Low => 2,
        }),
    };
    let label = if material.name.is_empty() {
        key.to_string()
    } else {
        format!("{} ({key})", material.name)
    };
    ProgramParameters { key, label }
}

/// Vertex buffers and locations of the non-morph streams a program reads.
#[must_use]
pub fn base_vertex_streams(features: ProgramFeatures) -> (u32, u32) {
    let mut buffers = 1;
    let mut locations = 1;
    for (flag, b, l) in [
        (ProgramFeatures::NORMALS, 1, 1),
        (ProgramFeatures::VERTEX_UVS, 1, 1),
        (ProgramFeatures::VERTEX_UV1, 1, 1),
        (ProgramFeatures::VERTEX_COLORS, 1, 1),
        (ProgramFeatures::VERTEX_TANGENTS, 1, 1),
        (ProgramFeatures::SKINNING, 2, 2),
        (ProgramFeatures::INSTANCING, 1, 4),
        (ProgramFeatures::INSTANCING_COLOR, 1, 1),
        (ProgramFeatures::DASHED, 1, 1),
    ] {
        if features.contains(flag) {
            buffers += b;
            locations += l;
        }
    }
    (buffers, locations)
}

/// Morph targets that still fit the device's vertex input limits.
fn morph_budget(features: ProgramFeatures, normals: bool, colors: bool, draw: &DrawContext<'_>) -> usize {
    let (buffers, locations) = base_vertex_streams(features);
    let per_target = 1 + u32::from(normals) + u32::from(colors);
    let free_buffers = draw.max_vertex_buffers.saturating_sub(buffers);
    let free_locations = draw.max_vertex_attributes.saturating_sub(locations);
    (free_buffers.min(free_locations) / per_target) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::capabilities::Capabilities;
    use crate::resources::buffer::BufferAttribute;
    use crate::resources::material::{MaterialKind, Side};

    fn context(geometry: &Geometry) -> DrawContext<'_> {
        let caps = Capabilities::default();
        DrawContext {
            geometry,
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
        }
    }

    #[test]
    fn equal_materials_derive_equal_keys() {
        let geometry = Geometry::new_box(1.0, 1.0, 1.0);
        let settings = RendererSettings::default();
        let lights = LightsHash::default();
        let a = derive_parameters(&Material::standard(), &lights, &context(&geometry), &settings);
        let b = derive_parameters(&Material::standard(), &lights, &context(&geometry), &settings);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().template(), "mesh");
    }

    #[test]
    fn unlit_families_ignore_light_counts() {
        let geometry = Geometry::new_box(1.0, 1.0, 1.0);
        let settings = RendererSettings::default();
        let lights = LightsHash {
            directional: 2,
            ..LightsHash::default()
        };
        let basic = derive_parameters(&Material::basic(), &lights, &context(&geometry), &settings);
        assert!(basic.key().lights.is_empty());
        let lit = derive_parameters(&Material::lambert(), &lights, &context(&geometry), &settings);
        assert_eq!(lit.key().lights.directional, 2);
    }

    #[test]
    fn side_and_tone_mapping_reach_the_key() {
        let geometry = Geometry::new_box(1.0, 1.0, 1.0);
        let mut settings = RendererSettings::default();
        let lights = LightsHash::default();
        let double = Material::basic().with(|d| d.settings.side = Side::Double);
        let key = derive_parameters(&double, &lights, &context(&geometry), &settings).key();
        assert!(key.has(ProgramFeatures::DOUBLE_SIDED));
        assert!(!key.has(ProgramFeatures::TONE_MAPPED));

        settings.tone_mapping = ToneMapping::AcesFilmic;
        let key = derive_parameters(&double, &lights, &context(&geometry), &settings).key();
        assert!(key.has(ProgramFeatures::TONE_MAPPED));
        assert_eq!(key.tone_mapping(), ToneMapping::AcesFilmic);

        let mut offscreen = context(&geometry);
        offscreen.to_screen = false;
        let key = derive_parameters(&double, &lights, &offscreen, &settings).key();
        assert_eq!(key.tone_mapping(), ToneMapping::None);
        assert_eq!(key.output_color_space(), ColorSpace::Linear);
    }

    #[test]
    fn morph_targets_are_capped_by_geometry_and_limits() {
        let mut geometry = Geometry::new();
        geometry.set_attribute(
            Geometry::POSITION,
            BufferAttribute::new(&[[0.0f32; 3]; 3], wgpu::VertexFormat::Float32x3),
        );
        for _ in 0..3 {
            geometry.push_morph_attribute(
                Geometry::POSITION,
                BufferAttribute::new(&[[0.0f32; 3]; 3], wgpu::VertexFormat::Float32x3),
            );
        }
        let settings = RendererSettings::default();
        let lights = LightsHash::default();
        let mut ctx = context(&geometry);
        ctx.morph_targets = 5;
        let key = derive_parameters(&Material::basic(), &lights, &ctx, &settings).key();
        assert_eq!(key.morph_targets, 3);

        ctx.max_vertex_buffers = 3;
        let key = derive_parameters(&Material::basic(), &lights, &ctx, &settings).key();
        assert_eq!(key.morph_targets, 2);
    }

    #[test]
    fn clipping_gathers_global_then_local_planes() {
        let mut settings = RendererSettings::default();
        settings.clipping_planes.push(Vec4::X);
        settings.local_clipping_enabled = true;
        let material = Material::basic().with(|d| {
            d.settings.clipping_planes = vec![Vec4::Y, Vec4::Z];
            d.settings.clip_intersection = true;
        });
        let mut planes = Vec::new();
        let clipping = Clipping::gather(&settings, material.settings(), false, &mut planes);
        assert_eq!(clipping, Clipping { planes: 3, intersecting: 2 });
        assert_eq!(planes, vec![Vec4::X, Vec4::Y, Vec4::Z]);

        let shadow = Clipping::gather(&settings, material.settings(), true, &mut planes);
        assert_eq!(shadow.planes, 0);
    }

    #[test]
    fn custom_shader_hash_is_part_of_the_key() {
        use crate::resources::material::ShaderMaterial;
        let geometry = Geometry::new_box(1.0, 1.0, 1.0);
        let settings = RendererSettings::default();
        let lights = LightsHash::default();
        let a = Material::shader(ShaderMaterial::new("a"));
        let b = Material::shader(ShaderMaterial::new("b"));
        let ka = derive_parameters(&a, &lights, &context(&geometry), &settings).key();
        let kb = derive_parameters(&b, &lights, &context(&geometry), &settings).key();
        assert_ne!(ka, kb);
        assert!(matches!(a.kind(), MaterialKind::Shader(_)));
    }
}
