//! Shadow maps.
//!
//! Every shadow-casting light owns one map, keyed by the light's id:
//!
//! - directional: orthographic camera looking at the light target
//! - spot: perspective camera with a field of view of twice the cone angle
//! - point: six 90 degree faces laid out in a 4x2 atlas
//!
//! Directional and spot maps hold RGBA-packed depth, or depth moments for
//! variance shadow maps, which additionally blur through a second target.
//! Point maps always hold packed light distance.
//!
//! Cameras use the wgpu depth range without reversal; the sampling code
//! maps clip space to texture space with a flipped y.

use glam::{Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::core::device::{TextureId, Viewport};
use super::lights::{ShadowCaster, ShadowLightKind};
use super::resources::RenderTargetCache;
use super::settings::ShadowMapKind;
use crate::errors::ConfigurationError;
use crate::resources::buffer::BufferAttribute;
use crate::resources::geometry::Geometry;
use crate::resources::material::{
    DepthPacking, DistanceParams, Material, MaterialKind, ShaderMaterial,
};
use crate::resources::render_target::{DepthBuffer, RenderTarget};
use crate::resources::texture::SamplerDesc;
use crate::resources::uniforms::UniformValue;
use crate::resources::version_tracker::ResourceId;
use crate::scene::camera::{CoordinateSystem, Frustum};
use crate::scene::light::{LightKind, ShadowConfig};
use crate::scene::Scene;

/// One camera of a shadow map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowView {
    pub view: Mat4,
    pub projection: Mat4,
    /// Region of the map this camera renders into.
    pub viewport: Viewport,
    pub position: Vec3,
}

impl ShadowView {
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection(), CoordinateSystem::WebGpu)
    }
}

fn full_viewport(width: u32, height: u32) -> Viewport {
    Viewport {
        x: 0.0,
        y: 0.0,
        width: width as f32,
        height: height as f32,
    }
}

/// Up vector for a camera looking along `direction`.
fn up_for(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

#[must_use]
pub fn directional_view(position: Vec3, target: Vec3, config: &ShadowConfig) -> ShadowView {
    let e = config.ortho_extent;
    let (w, h) = config.map_size;
    ShadowView {
        view: Mat4::look_at_rh(position, target, up_for(target - position)),
        projection: Mat4::orthographic_rh(-e, e, -e, e, config.near, config.far),
        viewport: full_viewport(w, h),
        position,
    }
}

/// Far plane of a light with a cutoff `distance` (0 = unlimited).
fn light_far(distance: f32, config: &ShadowConfig) -> f32 {
    if distance > 0.0 { distance } else { config.far }
}

#[must_use]
pub fn spot_view(
    position: Vec3,
    target: Vec3,
    angle: f32,
    distance: f32,
    config: &ShadowConfig,
) -> ShadowView {
    let (w, h) = config.map_size;
    let fov = (2.0 * angle).clamp(1e-3, std::f32::consts::PI - 1e-3);
    ShadowView {
        view: Mat4::look_at_rh(position, target, up_for(target - position)),
        projection: Mat4::perspective_rh(fov, w as f32 / h as f32, config.near, light_far(distance, config)),
        viewport: full_viewport(w, h),
        position,
    }
}

/// `(forward, up)` of the six atlas faces; face `i` occupies cell
/// `(i % 4, i / 4)`.
pub const POINT_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::Y),
    (Vec3::NEG_Z, Vec3::Y),
];

#[must_use]
pub fn point_views(position: Vec3, distance: f32, config: &ShadowConfig) -> [ShadowView; 6] {
    let (w, h) = config.map_size;
    let projection = Mat4::perspective_rh(
        std::f32::consts::FRAC_PI_2,
        1.0,
        config.near,
        light_far(distance, config),
    );
    std::array::from_fn(|i| {
        let (forward, up) = POINT_FACES[i];
        ShadowView {
            view: Mat4::look_at_rh(position, position + forward, up),
            projection,
            viewport: Viewport {
                x: ((i % 4) as u32 * w) as f32,
                y: ((i / 4) as u32 * h) as f32,
                width: w as f32,
                height: h as f32,
            },
            position,
        }
    })
}

/// The map of one shadow-casting light.
#[derive(Debug)]
pub struct ShadowMap {
    pub kind: ShadowLightKind,
    pub target: RenderTarget,
    /// Intermediate target of the variance blur.
    pub blur_target: Option<RenderTarget>,
    pub views: SmallVec<[ShadowView; 6]>,
    /// World to shadow clip space; unused by point maps.
    pub matrix: Mat4,
    /// `[bias, normal_bias, radius, intensity]`, `[width, height, near, far]`.
    pub params: [Vec4; 2],
    pub blur_radius: f32,
    pub blur_samples: u32,
    pub(crate) rendered: bool,
    used: bool,
}

impl ShadowMap {
    #[must_use]
    pub fn is_variance(&self) -> bool {
        self.blur_target.is_some()
    }
}

fn map_target(size: (u32, u32), format: wgpu::TextureFormat, depth: DepthBuffer) -> RenderTarget {
    let mut target = RenderTarget::new(size.0, size.1)
        .with_format(format)
        .with_sampler(SamplerDesc::nearest())
        .with_depth(depth);
    target.name = "shadow map".to_owned();
    target
}

/// Shadow-map uniforms and textures of the frame, in caster order.
#[derive(Debug, Default, Clone)]
pub struct ShadowUniforms {
    pub directional_matrices: Vec<Mat4>,
    pub directional_params: Vec<Vec4>,
    pub spot_matrices: Vec<Mat4>,
    pub spot_params: Vec<Vec4>,
    pub point_params: Vec<Vec4>,
    directional_maps: Vec<Option<TextureId>>,
    spot_maps: Vec<Option<TextureId>>,
    point_maps: Vec<Option<TextureId>>,
}

impl ShadowUniforms {
    pub fn clear(&mut self) {
        self.directional_matrices.clear();
        self.directional_params.clear();
        self.spot_matrices.clear();
        self.spot_params.clear();
        self.point_params.clear();
        self.directional_maps.clear();
        self.spot_maps.clear();
        self.point_maps.clear();
    }

    #[must_use]
    pub fn maps(&self, kind: ShadowLightKind) -> &[Option<TextureId>] {
        match kind {
            ShadowLightKind::Directional => &self.directional_maps,
            ShadowLightKind::Spot => &self.spot_maps,
            ShadowLightKind::Point => &self.point_maps,
        }
    }
}

/// Owns the shadow maps and the materials that render them.
#[derive(Debug)]
pub struct ShadowMapper {
    maps: FxHashMap<ResourceId, ShadowMap>,
    order: Vec<ResourceId>,
    retired: Vec<ResourceId>,
    pub(crate) depth_rgba: Material,
    pub(crate) depth_moments: Material,
    pub(crate) distance: Material,
    pub(crate) blur: Material,
    pub(crate) fullscreen: Geometry,
}

impl Default for ShadowMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowMapper {
    #[must_use]
    pub fn new() -> Self {
        let mut fullscreen = Geometry::new();
        fullscreen.name = "fullscreen triangle".to_owned();
        let corners: [[f32; 3]; 3] = [[-1.0, -1.0, 0.0], [3.0, -1.0, 0.0], [-1.0, 3.0, 0.0]];
        fullscreen.set_attribute(
            Geometry::POSITION,
            BufferAttribute::new(&corners, wgpu::VertexFormat::Float32x3),
        );

        let blur = ShaderMaterial::new("{$ include \"vsm_blur\" $}")
            .with_uniform("samples", 8.0)
            .with_uniform("radius", 1.0)
            .with_uniform("resolution", Vec2::ONE)
            .with_uniform("direction", Vec2::Y)
            .with_uniform("shadow_pass", UniformValue::Texture(None));

        Self {
            maps: FxHashMap::default(),
            order: Vec::new(),
            retired: Vec::new(),
            depth_rgba: Material::new(MaterialKind::Depth {
                packing: DepthPacking::Rgba,
            }),
            depth_moments: Material::new(MaterialKind::Depth {
                packing: DepthPacking::Moments,
            }),
            distance: Material::new(MaterialKind::Distance(DistanceParams {
                reference_position: Vec3::ZERO,
                near: 1.0,
                far: 1000.0,
            })),
            blur: Material::shader(blur).with(|m| {
                m.settings.depth_test = false;
                m.settings.depth_write = false;
            }),
            fullscreen,
        }
    }

    /// Fits one map per caster. Configurations are validated before any
    /// map changes; maps of lights that stopped casting are retired.
    pub fn prepare(
        &mut self,
        scene: &Scene,
        casters: &[ShadowCaster],
        kind: ShadowMapKind,
    ) -> Result<(), ConfigurationError> {
        for caster in casters {
            if let Some(light) = scene.get(caster.node).and_then(|n| n.as_light()) {
                light.shadow.validate()?;
            }
            if kind == ShadowMapKind::Vsm && caster.kind == ShadowLightKind::Point {
                return Err(ConfigurationError::InvalidShadowConfiguration(
                    "variance shadow maps do not support point lights".to_owned(),
                ));
            }
        }

        for map in self.maps.values_mut() {
            map.used = false;
        }
        self.order.clear();

        for caster in casters {
            let Some(light) = scene.get(caster.node).and_then(|n| n.as_light()) else {
                continue;
            };
            let config = &light.shadow;
            let (w, h) = config.map_size;
            let variance = kind == ShadowMapKind::Vsm;
            let (size, format) = match caster.kind {
                ShadowLightKind::Point => ((4 * w, 2 * h), wgpu::TextureFormat::Rgba8Unorm),
                _ if variance => ((w, h), wgpu::TextureFormat::Rgba16Float),
                _ => ((w, h), wgpu::TextureFormat::Rgba8Unorm),
            };

            let retired = &mut self.retired;
            let map = self.maps.entry(light.id()).or_insert_with(|| ShadowMap {
                kind: caster.kind,
                target: map_target(size, format, DepthBuffer::Depth24),
                blur_target: None,
                views: SmallVec::new(),
                matrix: Mat4::IDENTITY,
                params: [Vec4::ZERO; 2],
                blur_radius: 1.0,
                blur_samples: 8,
                rendered: false,
                used: false,
            });
            if map.target.size() != size || map.target.color_formats.first() != Some(&format) {
                retired.push(map.target.id());
                map.target = map_target(size, format, DepthBuffer::Depth24);
                map.rendered = false;
            }
            match (&map.blur_target, variance) {
                (Some(blur), false) => {
                    retired.push(blur.id());
                    map.blur_target = None;
                }
                (Some(blur), true) if blur.size() != size => {
                    retired.push(blur.id());
                    map.blur_target = Some(map_target(size, format, DepthBuffer::None));
                }
                (None, true) => map.blur_target = Some(map_target(size, format, DepthBuffer::None)),
                _ => {}
            }

            map.kind = caster.kind;
            map.views.clear();
            let far = match light.kind {
                LightKind::Directional { .. } => {
                    map.views.push(directional_view(caster.position, caster.target, config));
                    config.far
                }
                LightKind::Spot { angle, distance, .. } => {
                    map.views
                        .push(spot_view(caster.position, caster.target, angle, distance, config));
                    light_far(distance, config)
                }
                LightKind::Point { distance, .. } => {
                    map.views.extend(point_views(caster.position, distance, config));
                    light_far(distance, config)
                }
                LightKind::Ambient | LightKind::Hemisphere { .. } => continue,
            };
            map.matrix = map.views[0].view_projection();
            map.params = [
                Vec4::new(config.bias, config.normal_bias, config.radius, config.intensity),
                Vec4::new(size.0 as f32, size.1 as f32, config.near, far),
            ];
            map.blur_radius = config.radius;
            map.blur_samples = config.blur_samples;
            map.used = true;
            self.order.push(light.id());
        }

        let retired = &mut self.retired;
        self.maps.retain(|_, map| {
            if !map.used {
                retired.push(map.target.id());
                if let Some(blur) = &map.blur_target {
                    retired.push(blur.id());
                }
            }
            map.used
        });
        Ok(())
    }

    /// Whether any map must be rendered this frame.
    #[must_use]
    pub fn needs_render(&self, auto_update: bool, needs_update: bool) -> bool {
        auto_update || needs_update || self.maps.values().any(|m| !m.rendered)
    }

    /// Maps in caster order.
    pub fn maps(&self) -> impl Iterator<Item = (ResourceId, &ShadowMap)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.maps.get(id).map(|m| (*id, m)))
    }

    #[must_use]
    pub fn map(&self, light: ResourceId) -> Option<&ShadowMap> {
        self.maps.get(&light)
    }

    /// Light ids in caster order.
    #[must_use]
    pub fn order(&self) -> &[ResourceId] {
        &self.order
    }

    pub fn mark_rendered(&mut self, light: ResourceId) {
        if let Some(map) = self.maps.get_mut(&light) {
            map.rendered = true;
        }
    }

    /// Render target ids the renderer should free.
    pub fn take_retired(&mut self) -> Vec<ResourceId> {
        std::mem::take(&mut self.retired)
    }

    /// Forces every map to re-render; their targets died with the device.
    pub fn invalidate(&mut self) {
        for map in self.maps.values_mut() {
            map.rendered = false;
        }
        self.retired.clear();
    }

    /// Caster material for a map of `kind`.
    #[must_use]
    pub fn caster_material(&self, kind: ShadowLightKind, variance: bool) -> &Material {
        match kind {
            ShadowLightKind::Point => &self.distance,
            _ if variance => &self.depth_moments,
            _ => &self.depth_rgba,
        }
    }

    /// Points the distance material at one point light.
    pub fn set_distance_reference(&mut self, position: Vec3, near: f32, far: f32) {
        let mut edit = self.distance.edit();
        edit.kind = MaterialKind::Distance(DistanceParams {
            reference_position: position,
            near,
            far,
        });
    }

    /// Configures the blur for one direction and returns the fullscreen
    /// geometry with the blur material.
    pub fn blur_pass(
        &mut self,
        direction: Vec2,
        resolution: Vec2,
        radius: f32,
        samples: u32,
    ) -> (&mut Geometry, &Material) {
        {
            let mut edit = self.blur.edit();
            if let MaterialKind::Shader(shader) = &mut edit.kind {
                shader.set_uniform("direction", direction);
                shader.set_uniform("resolution", resolution);
                shader.set_uniform("radius", radius);
                shader.set_uniform("samples", samples as f32);
            }
        }
        (&mut self.fullscreen, &self.blur)
    }

    /// Collects the uniforms and map textures of the current casters.
    pub fn fill_uniforms(&self, targets: &RenderTargetCache, out: &mut ShadowUniforms) {
        out.clear();
        for (_, map) in self.maps() {
            let texture = targets
                .get(map.target.id())
                .and_then(|t| t.color_texture(0));
            match map.kind {
                ShadowLightKind::Directional => {
                    out.directional_matrices.push(map.matrix);
                    out.directional_params.extend(map.params);
                    out.directional_maps.push(texture);
                }
                ShadowLightKind::Spot => {
                    out.spot_matrices.push(map.matrix);
                    out.spot_params.extend(map.params);
                    out.spot_maps.push(texture);
                }
                ShadowLightKind::Point => {
                    out.point_params.extend(map.params);
                    out.point_maps.push(texture);
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(view: &ShadowView, point: Vec3) -> Vec3 {
        view.view_projection().project_point3(point)
    }

    #[test]
    fn directional_view_centers_the_target() {
        let config = ShadowConfig::default();
        let view = directional_view(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, &config);
        let ndc = project(&view, Vec3::ZERO);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn point_faces_cover_their_axes() {
        let config = ShadowConfig::default();
        let views = point_views(Vec3::ZERO, 0.0, &config);
        for (view, (forward, _)) in views.iter().zip(POINT_FACES) {
            let ndc = project(view, forward * 3.0);
            assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5, "{forward:?} -> {ndc:?}");
        }
        assert_eq!(views[5].viewport.x, 512.0);
        assert_eq!(views[5].viewport.y, 512.0);
    }

    #[test]
    fn spot_far_plane_follows_cutoff_distance() {
        let config = ShadowConfig::default();
        let view = spot_view(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, 0.5, 20.0, &config);
        let inside = project(&view, Vec3::new(0.0, -14.0, 0.0));
        let beyond = project(&view, Vec3::new(0.0, -16.0, 0.0));
        assert!(inside.z < 1.0);
        assert!(beyond.z > 1.0);
    }
}
