//! Built-in material families and their parameters.

use glam::Vec3;

use super::maps::{MapSet, MapSlot};
use super::shader::ShaderMaterial;

/// Shading model of a material, independent of its parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialFamily {
    Basic,
    Lambert,
    Phong,
    Standard,
    Physical,
    Toon,
    Matcap,
    Normal,
    Depth,
    Distance,
    Shadow,
    Points,
    Sprite,
    LineBasic,
    LineDashed,
    Shader,
}

impl MaterialFamily {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Lambert => "lambert",
            Self::Phong => "phong",
            Self::Standard => "standard",
            Self::Physical => "physical",
            Self::Toon => "toon",
            Self::Matcap => "matcap",
            Self::Normal => "normal",
            Self::Depth => "depth",
            Self::Distance => "distance",
            Self::Shadow => "shadow",
            Self::Points => "points",
            Self::Sprite => "sprite",
            Self::LineBasic => "line_basic",
            Self::LineDashed => "line_dashed",
            Self::Shader => "shader",
        }
    }

    /// Whether the family evaluates scene lights.
    #[must_use]
    pub fn uses_lights(self) -> bool {
        matches!(
            self,
            Self::Lambert | Self::Phong | Self::Standard | Self::Physical | Self::Toon | Self::Shadow
        )
    }

    /// Template the family's programs are generated from.
    #[must_use]
    pub fn template(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Sprite => "sprite",
            Self::Depth | Self::Distance => "depth",
            _ => "mesh",
        }
    }

    /// Texture slots the family's programs sample.
    #[must_use]
    pub fn supported_maps(self) -> MapSet {
        use MapSlot::{
            AlphaMap, AnisotropyMap, AoMap, BumpMap, ClearcoatMap, ClearcoatRoughnessMap,
            DisplacementMap, EmissiveMap, EnvMap, GradientMap, IridescenceMap, LightMap, Map,
            Matcap, MetalnessMap, NormalMap, RoughnessMap, SheenColorMap, SpecularMap,
            ThicknessMap, TransmissionMap,
        };
        let slots: &[MapSlot] = match self {
            Self::Basic => &[Map, AlphaMap, AoMap, LightMap, SpecularMap, EnvMap],
            Self::Lambert | Self::Phong => &[
                Map, AlphaMap, AoMap, LightMap, EmissiveMap, BumpMap, NormalMap,
                DisplacementMap, SpecularMap, EnvMap,
            ],
            Self::Standard => &[
                Map, AlphaMap, AoMap, LightMap, EmissiveMap, BumpMap, NormalMap,
                DisplacementMap, RoughnessMap, MetalnessMap, EnvMap,
            ],
            Self::Physical => &[
                Map, AlphaMap, AoMap, LightMap, EmissiveMap, BumpMap, NormalMap,
                DisplacementMap, RoughnessMap, MetalnessMap, EnvMap, ClearcoatMap,
                ClearcoatRoughnessMap, SheenColorMap, IridescenceMap, TransmissionMap,
                ThicknessMap, AnisotropyMap,
            ],
            Self::Toon => &[
                Map, AlphaMap, AoMap, LightMap, EmissiveMap, BumpMap, NormalMap,
                DisplacementMap, GradientMap,
            ],
            Self::Matcap => &[Map, AlphaMap, BumpMap, NormalMap, DisplacementMap, Matcap],
            Self::Normal => &[BumpMap, NormalMap, DisplacementMap],
            Self::Depth | Self::Distance => &[Map, AlphaMap, DisplacementMap],
            Self::Points | Self::Sprite => &[Map, AlphaMap],
            Self::LineBasic | Self::LineDashed => &[Map],
            Self::Shadow | Self::Shader => &[],
        };
        slots.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicParams {
    pub color: Vec3,
    pub reflectivity: f32,
}

impl Default for BasicParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            reflectivity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertParams {
    pub color: Vec3,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
}

impl Default for LambertParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhongParams {
    pub color: Vec3,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    pub specular: Vec3,
    pub shininess: f32,
}

impl Default for PhongParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            specular: Vec3::splat(0.067),
            shininess: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardParams {
    pub color: Vec3,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub env_map_intensity: f32,
}

impl Default for StandardParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            roughness: 1.0,
            metalness: 0.0,
            env_map_intensity: 1.0,
        }
    }
}

/// Extended PBR parameters. A zero weight disables the corresponding
/// shading lobe and keeps it out of the generated program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalParams {
    pub standard: StandardParams,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub sheen: f32,
    pub sheen_color: Vec3,
    pub sheen_roughness: f32,
    pub iridescence: f32,
    pub iridescence_ior: f32,
    pub transmission: f32,
    pub thickness: f32,
    pub ior: f32,
    pub attenuation_color: Vec3,
    pub attenuation_distance: f32,
    pub anisotropy: f32,
    pub anisotropy_rotation: f32,
    pub specular_intensity: f32,
    pub specular_color: Vec3,
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self {
            standard: StandardParams::default(),
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            sheen: 0.0,
            sheen_color: Vec3::ZERO,
            sheen_roughness: 1.0,
            iridescence: 0.0,
            iridescence_ior: 1.3,
            transmission: 0.0,
            thickness: 0.0,
            ior: 1.5,
            attenuation_color: Vec3::ONE,
            attenuation_distance: f32::INFINITY,
            anisotropy: 0.0,
            anisotropy_rotation: 0.0,
            specular_intensity: 1.0,
            specular_color: Vec3::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToonParams {
    pub color: Vec3,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
}

impl Default for ToonParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
        }
    }
}

/// Encoding of depth written by depth materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthPacking {
    /// Depth replicated into the color channels.
    #[default]
    Basic,
    /// Depth packed into 32 bits spread over RGBA8.
    Rgba,
    /// First and second depth moments, for variance shadow maps.
    Moments,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceParams {
    pub reference_position: Vec3,
    pub near: f32,
    pub far: f32,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            reference_position: Vec3::ZERO,
            near: 1.0,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointsParams {
    pub color: Vec3,
    pub size: f32,
    pub size_attenuation: bool,
}

impl Default for PointsParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            size: 1.0,
            size_attenuation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteParams {
    pub color: Vec3,
    pub rotation: f32,
    pub size_attenuation: bool,
}

impl Default for SpriteParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            rotation: 0.0,
            size_attenuation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineDashedParams {
    pub color: Vec3,
    pub dash_size: f32,
    pub gap_size: f32,
    pub scale: f32,
}

impl Default for LineDashedParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            dash_size: 3.0,
            gap_size: 1.0,
            scale: 1.0,
        }
    }
}

/// The closed set of material families, with a custom-shader escape hatch.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    Basic(BasicParams),
    Lambert(LambertParams),
    Phong(PhongParams),
    Standard(StandardParams),
    Physical(PhysicalParams),
    Toon(ToonParams),
    Matcap { color: Vec3 },
    Normal,
    Depth { packing: DepthPacking },
    Distance(DistanceParams),
    Shadow { color: Vec3 },
    Points(PointsParams),
    Sprite(SpriteParams),
    LineBasic { color: Vec3 },
    LineDashed(LineDashedParams),
    Shader(ShaderMaterial),
}

impl MaterialKind {
    #[must_use]
    pub fn family(&self) -> MaterialFamily {
        match self {
            Self::Basic(_) => MaterialFamily::Basic,
            Self::Lambert(_) => MaterialFamily::Lambert,
            Self::Phong(_) => MaterialFamily::Phong,
            Self::Standard(_) => MaterialFamily::Standard,
            Self::Physical(_) => MaterialFamily::Physical,
            Self::Toon(_) => MaterialFamily::Toon,
            Self::Matcap { .. } => MaterialFamily::Matcap,
            Self::Normal => MaterialFamily::Normal,
            Self::Depth { .. } => MaterialFamily::Depth,
            Self::Distance(_) => MaterialFamily::Distance,
            Self::Shadow { .. } => MaterialFamily::Shadow,
            Self::Points(_) => MaterialFamily::Points,
            Self::Sprite(_) => MaterialFamily::Sprite,
            Self::LineBasic { .. } => MaterialFamily::LineBasic,
            Self::LineDashed(_) => MaterialFamily::LineDashed,
            Self::Shader(_) => MaterialFamily::Shader,
        }
    }

    /// Base diffuse color, where the family has one.
    #[must_use]
    pub fn color(&self) -> Option<Vec3> {
        match self {
            Self::Basic(p) => Some(p.color),
            Self::Lambert(p) => Some(p.color),
            Self::Phong(p) => Some(p.color),
            Self::Standard(p) => Some(p.color),
            Self::Physical(p) => Some(p.standard.color),
            Self::Toon(p) => Some(p.color),
            Self::Points(p) => Some(p.color),
            Self::Sprite(p) => Some(p.color),
            Self::LineDashed(p) => Some(p.color),
            Self::Matcap { color } | Self::Shadow { color } | Self::LineBasic { color } => {
                Some(*color)
            }
            Self::Normal | Self::Depth { .. } | Self::Distance(_) | Self::Shader(_) => None,
        }
    }

    /// Transmission weight; positive values route drawables into the
    /// transmissive list.
    #[must_use]
    pub fn transmission(&self) -> f32 {
        match self {
            Self::Physical(p) => p.transmission,
            _ => 0.0,
        }
    }
}
